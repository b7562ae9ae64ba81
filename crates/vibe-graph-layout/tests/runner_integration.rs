//! Integration tests for the threaded layout runner.

use std::time::Duration;

use vibe_graph_layout::{Layout, LayoutConfig, LayoutRunner, RunnerConfig, SpringBox};
use vibe_graph_stream::{EventLog, EventSource, GraphEvent, StreamEvent};

fn quick() -> RunnerConfig {
    RunnerConfig {
        idle_wait: Duration::from_millis(5),
        max_steps: Some(25),
        ..Default::default()
    }
}

#[test]
fn test_events_are_applied_before_stop() {
    let layout = SpringBox::with_config(LayoutConfig::default().with_seed(3));
    let handle = LayoutRunner::spawn(layout, quick());

    for (time_id, event) in [
        GraphEvent::node_added("a"),
        GraphEvent::node_added("b"),
        GraphEvent::node_added("c"),
        GraphEvent::edge_added("ab", "a", "b", false),
        GraphEvent::edge_added("bc", "b", "c", false),
    ]
    .into_iter()
    .enumerate()
    {
        handle
            .send(StreamEvent::new("graph", time_id as u64, event))
            .unwrap();
    }

    let layout = handle.stop().unwrap();
    assert_eq!(layout.node_count(), 3);
    assert_eq!(layout.edge_count(), 2);
    assert!(Layout::steps(&layout) <= 25);
}

#[test]
fn test_step_budget_is_honoured() {
    let mut layout = SpringBox::with_config(LayoutConfig::default().with_seed(4));
    layout.add_node("a").unwrap();
    layout.add_node("b").unwrap();
    layout.add_edge("ab", "a", "b", false).unwrap();

    let handle = LayoutRunner::spawn(layout, quick());
    std::thread::sleep(Duration::from_millis(100));
    assert!(handle.is_running());
    let layout = handle.stop().unwrap();

    assert!(layout.steps() <= 25);
}

#[test]
fn test_handle_subscribes_to_an_event_source() {
    let layout = SpringBox::with_config(LayoutConfig::default().with_seed(5));
    let handle = LayoutRunner::spawn(layout, quick());

    // The handle is a sink; keep a second one to check the relay order.
    let log = EventLog::new();
    let mut source = EventSource::new("graph");
    source.add_sink(Box::new(log.clone()));
    let sink = source.add_sink(Box::new(handle));

    source.emit(GraphEvent::node_added("a"));
    source.emit(GraphEvent::node_added("b"));
    assert_eq!(log.len(), 2);

    // Dropping the subscription drops the handle, which stops the thread.
    assert!(source.remove_sink(sink));
}

#[test]
fn test_runner_sinks_see_positions() {
    let mut layout = SpringBox::with_config(LayoutConfig::default().with_seed(6));
    let log = EventLog::new();
    layout.add_sink(Box::new(log.clone()));

    let handle = LayoutRunner::spawn(layout, quick());
    handle
        .send(StreamEvent::new("graph", 0, GraphEvent::node_added("a")))
        .unwrap();
    handle
        .send(StreamEvent::new("graph", 1, GraphEvent::node_added("b")))
        .unwrap();
    let layout = handle.stop().unwrap();

    let forwarded = log
        .events()
        .into_iter()
        .filter(|e| e.source_id == "graph")
        .count();
    assert_eq!(forwarded, 2);
    assert_eq!(layout.node_count(), 2);
}
