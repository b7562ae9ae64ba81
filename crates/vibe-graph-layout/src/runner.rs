//! A dedicated layout thread.
//!
//! The runner owns the layout. Graph events reach it through a channel and
//! are applied between steps, never during one, so the stream and
//! [`Layout::compute`] stay serialized without locking.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};
use vibe_graph_stream::{GraphSink, StreamEvent};

use crate::error::{LayoutError, LayoutResult};
use crate::layout::Layout;

/// When the runner stops stepping and waits for events instead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunnerConfig {
    /// Idle once stabilization falls below this.
    pub idle_below: f64,
    /// How long an idle runner blocks waiting for events.
    pub idle_wait: Duration,
    /// Step budget, unbounded when `None`.
    pub max_steps: Option<u64>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            idle_below: 1e-3,
            idle_wait: Duration::from_millis(50),
            max_steps: None,
        }
    }
}

enum Command {
    Event(StreamEvent),
    Stop,
}

pub struct LayoutRunner;

impl LayoutRunner {
    /// Move `layout` onto a new thread and start stepping it.
    pub fn spawn<L>(layout: L, config: RunnerConfig) -> LayoutHandle<L>
    where
        L: Layout + 'static,
    {
        let (commands, queue) = mpsc::channel();
        let thread = thread::spawn(move || run(layout, queue, config));

        LayoutHandle {
            commands,
            thread: Some(thread),
        }
    }
}

fn run<L: Layout>(mut layout: L, queue: Receiver<Command>, config: RunnerConfig) -> L {
    debug!(algorithm = layout.algorithm_name(), "layout runner started");
    let mut steps = 0u64;

    loop {
        loop {
            match queue.try_recv() {
                Ok(Command::Event(event)) => layout.handle_event(&event),
                Ok(Command::Stop) | Err(TryRecvError::Disconnected) => {
                    debug!(steps, "layout runner stopped");
                    return layout;
                }
                Err(TryRecvError::Empty) => break,
            }
        }

        let exhausted = config.max_steps.is_some_and(|max| steps >= max);
        if exhausted || layout.stabilization() < config.idle_below {
            match queue.recv_timeout(config.idle_wait) {
                Ok(Command::Event(event)) => {
                    layout.handle_event(&event);
                    // New input invalidates the convergence reached so far.
                    layout.shake();
                }
                Ok(Command::Stop) | Err(RecvTimeoutError::Disconnected) => {
                    debug!(steps, "layout runner stopped");
                    return layout;
                }
                Err(RecvTimeoutError::Timeout) => {}
            }
            continue;
        }

        layout.compute();
        steps += 1;
    }
}

/// Owner side of a running layout.
///
/// Dropping the handle stops the thread without waiting for it.
pub struct LayoutHandle<L> {
    commands: Sender<Command>,
    thread: Option<JoinHandle<L>>,
}

impl<L> LayoutHandle<L> {
    /// Queue an event for the layout.
    pub fn send(&self, event: StreamEvent) -> LayoutResult<()> {
        self.commands
            .send(Command::Event(event))
            .map_err(|_| LayoutError::RunnerStopped)
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the thread after the step in progress and take the layout back.
    pub fn stop(mut self) -> LayoutResult<L> {
        let _ = self.commands.send(Command::Stop);
        let thread = self.thread.take().ok_or(LayoutError::RunnerStopped)?;
        thread.join().map_err(|_| LayoutError::RunnerStopped)
    }
}

impl<L> Drop for LayoutHandle<L> {
    fn drop(&mut self) {
        if self.thread.is_some() {
            let _ = self.commands.send(Command::Stop);
        }
    }
}

impl<L: Send> GraphSink for LayoutHandle<L> {
    fn handle_event(&mut self, event: &StreamEvent) {
        if let Err(err) = self.send(event.clone()) {
            warn!(error = %err, "layout runner is gone, dropping event");
        }
    }
}

impl<L> std::fmt::Debug for LayoutHandle<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutHandle")
            .field("running", &self.is_running())
            .finish()
    }
}
