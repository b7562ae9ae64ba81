//! Publish/subscribe plumbing for graph events.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::trace;

use crate::event::{GraphEvent, StreamEvent};

/// A subscriber to a graph event stream.
///
/// Sinks are called synchronously by the source that owns them and must not
/// re-enter that source from inside `handle_event`.
pub trait GraphSink: Send {
    /// Receive one event.
    fn handle_event(&mut self, event: &StreamEvent);
}

impl<F> GraphSink for F
where
    F: FnMut(&StreamEvent) + Send,
{
    fn handle_event(&mut self, event: &StreamEvent) {
        self(event)
    }
}

/// Handle returned when registering a sink, used to unregister it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkId(u64);

/// Fans events out to every registered sink.
///
/// A source has its own id and logical clock. Events it originates with
/// [`EventSource::emit`] are stamped with both; events merely relayed with
/// [`EventSource::forward`] keep their original stamp.
pub struct EventSource {
    source_id: String,
    next_time_id: u64,
    next_sink_id: u64,
    sinks: Vec<(SinkId, Box<dyn GraphSink>)>,
}

impl EventSource {
    /// Create a source with the given id and no sinks.
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            next_time_id: 0,
            next_sink_id: 0,
            sinks: Vec::new(),
        }
    }

    /// The id stamped on originated events.
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Register a sink. Sinks receive events in registration order.
    pub fn add_sink(&mut self, sink: Box<dyn GraphSink>) -> SinkId {
        let id = SinkId(self.next_sink_id);
        self.next_sink_id += 1;
        self.sinks.push((id, sink));
        id
    }

    /// Unregister a sink. Returns `false` if it was not registered.
    pub fn remove_sink(&mut self, id: SinkId) -> bool {
        let before = self.sinks.len();
        self.sinks.retain(|(sink_id, _)| *sink_id != id);
        self.sinks.len() != before
    }

    /// Number of registered sinks.
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Whether anyone is listening.
    pub fn has_sinks(&self) -> bool {
        !self.sinks.is_empty()
    }

    /// Originate an event: stamp it with this source's id and clock, then deliver it.
    pub fn emit(&mut self, event: GraphEvent) {
        let time_id = self.next_time_id;
        self.next_time_id += 1;

        if self.sinks.is_empty() {
            return;
        }

        let stamped = StreamEvent::new(self.source_id.clone(), time_id, event);
        self.deliver(&stamped);
    }

    /// Relay an event from upstream without restamping it.
    pub fn forward(&mut self, event: &StreamEvent) {
        self.deliver(event);
    }

    fn deliver(&mut self, event: &StreamEvent) {
        trace!(
            source = %event.source_id,
            time_id = event.time_id,
            sinks = self.sinks.len(),
            "delivering graph event"
        );
        for (_, sink) in &mut self.sinks {
            sink.handle_event(event);
        }
    }
}

impl std::fmt::Debug for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSource")
            .field("source_id", &self.source_id)
            .field("next_time_id", &self.next_time_id)
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

/// A sink that records everything it receives.
///
/// Clones share the same buffer, so one clone can be handed to a source while
/// another is kept for inspection.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<StreamEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events.
    pub fn events(&self) -> Vec<StreamEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything recorded so far.
    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl GraphSink for EventLog {
    fn handle_event(&mut self, event: &StreamEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_emit_stamps_source_and_clock() {
        let log = EventLog::new();
        let mut source = EventSource::new("layout");
        source.add_sink(Box::new(log.clone()));

        source.emit(GraphEvent::node_added("a"));
        source.emit(GraphEvent::node_added("b"));

        let events = log.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].source_id, "layout");
        assert_eq!(events[0].time_id, 0);
        assert_eq!(events[1].time_id, 1);
    }

    #[test]
    fn test_forward_keeps_original_stamp() {
        let log = EventLog::new();
        let mut source = EventSource::new("layout");
        source.add_sink(Box::new(log.clone()));

        let upstream = StreamEvent::new("graph", 42, GraphEvent::GraphCleared);
        source.forward(&upstream);

        assert_eq!(log.events(), vec![upstream]);
    }

    #[test]
    fn test_fan_out_and_removal() {
        let first = EventLog::new();
        let second = EventLog::new();
        let mut source = EventSource::new("s");
        let first_id = source.add_sink(Box::new(first.clone()));
        source.add_sink(Box::new(second.clone()));

        source.emit(GraphEvent::node_added("a"));
        assert!(source.remove_sink(first_id));
        assert!(!source.remove_sink(first_id));
        source.emit(GraphEvent::node_added("b"));

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 2);
        assert_eq!(source.sink_count(), 1);
    }

    #[test]
    fn test_closure_sink() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&counter);
        let mut source = EventSource::new("s");
        source.add_sink(Box::new(move |_: &StreamEvent| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        source.emit(GraphEvent::GraphCleared);
        source.emit(GraphEvent::StepBegins { step: 1.0 });

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
