//! Graph event streams for the Vibe-Graph workspace.
//!
//! A graph container describes every mutation it undergoes as a
//! [`GraphEvent`]. Consumers (layouts, renderers, mirrors) subscribe to a
//! source as [`GraphSink`]s and receive each event synchronously, in order.
//!
//! ```text
//! ┌──────────────┐   StreamEvent   ┌──────────────┐   StreamEvent   ┌──────────────┐
//! │ graph source │────────────────▶│    layout    │────────────────▶│   renderer   │
//! │ (EventSource)│                 │ (GraphSink + │   + "xyz" attr  │  (GraphSink) │
//! └──────────────┘                 │  EventSource)│                 └──────────────┘
//!                                  └──────────────┘
//! ```
//!
//! No sink gets special treatment: a layout is just one more subscriber and
//! never reaches back into the graph that feeds it.

mod event;
mod sink;

pub use event::{AttributeChange, AttributeValue, ElementRef, GraphEvent, StreamEvent};
pub use sink::{EventLog, EventSource, GraphSink, SinkId};
