//! Lay out a grid graph fed through the event stream.
//!
//! Run with: cargo run --example grid_layout -- [side] [quality]

use std::time::Instant;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use vibe_graph_layout::{LayoutConfig, LayoutListener, SpringBox, QUALITY_ATTRIBUTE};
use vibe_graph_stream::{GraphEvent, GraphSink, StreamEvent};

/// Prints progress every few steps.
struct Progress {
    every: u64,
    step: u64,
    moved: usize,
}

impl LayoutListener for Progress {
    fn node_moved(&mut self, _node_id: &str, _x: f32, _y: f32, _z: f32) {
        self.moved += 1;
    }

    fn step_completion(&mut self, stabilization: f64) {
        if self.step % self.every == 0 {
            println!(
                "  step {:4}: stabilization {:.4}, {} moves",
                self.step, stabilization, self.moved
            );
        }
        self.step += 1;
        self.moved = 0;
    }
}

fn grid_events(side: usize) -> Vec<GraphEvent> {
    let id = |x: usize, y: usize| format!("{}-{}", x, y);
    let mut events = Vec::with_capacity(side * side * 3);

    for y in 0..side {
        for x in 0..side {
            events.push(GraphEvent::node_added(id(x, y)));
        }
    }
    for y in 0..side {
        for x in 0..side {
            if x + 1 < side {
                let (a, b) = (id(x, y), id(x + 1, y));
                events.push(GraphEvent::edge_added(format!("{}_{}", a, b), a, b, false));
            }
            if y + 1 < side {
                let (a, b) = (id(x, y), id(x, y + 1));
                events.push(GraphEvent::edge_added(format!("{}_{}", a, b), a, b, false));
            }
        }
    }
    events
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let side: usize = args
        .next()
        .map(|s| s.parse::<usize>())
        .transpose()
        .context("side must be a positive integer")?
        .unwrap_or(10)
        .max(1);
    let quality: i64 = args
        .next()
        .map(|s| s.parse::<i64>())
        .transpose()
        .context("quality must be an integer")?
        .unwrap_or(1);

    let mut layout = SpringBox::with_config(LayoutConfig::default().with_seed(42));
    layout.add_listener(Box::new(Progress {
        every: 50,
        step: 0,
        moved: 0,
    }));

    let mut time_id = 0;
    let mut send = |layout: &mut SpringBox, event: GraphEvent| {
        layout.handle_event(&StreamEvent::new("grid", time_id, event));
        time_id += 1;
    };

    send(&mut layout, GraphEvent::graph_attribute(QUALITY_ATTRIBUTE, quality));
    for event in grid_events(side) {
        send(&mut layout, event);
    }

    println!(
        "Laying out a {}x{} grid ({} nodes, {} edges) at quality {}...",
        side,
        side,
        layout.node_count(),
        layout.edge_count(),
        layout.quality().level()
    );

    let start = Instant::now();
    let max_steps = 2_000;
    while layout.steps() < max_steps && layout.stabilization() > 1e-3 {
        layout.compute();
    }
    let elapsed = start.elapsed();

    println!(
        "Done after {} steps in {:.2?} ({:.2?} per step)",
        layout.steps(),
        elapsed,
        elapsed / layout.steps().max(1) as u32
    );
    println!(
        "Bounds: {:?} .. {:?}",
        layout.low_point(),
        layout.hi_point()
    );

    let far = format!("{}-{}", side - 1, side - 1);
    for corner in ["0-0", far.as_str()] {
        if let Some(position) = layout.node_position(corner) {
            println!("  {} at ({:.3}, {:.3})", corner, position.x, position.y);
        }
    }

    Ok(())
}
