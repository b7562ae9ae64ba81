//! Graph event vocabulary.
//!
//! Every topology or attribute mutation of an upstream graph is described by
//! a [`GraphEvent`]. Events travel wrapped in a [`StreamEvent`] that carries
//! the id of the source that produced them and a logical timestamp.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Attribute values are free-form JSON, like node metadata elsewhere in the workspace.
pub type AttributeValue = Value;

/// The graph element an attribute belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "id", rename_all = "snake_case")]
pub enum ElementRef {
    /// The graph itself.
    Graph,
    /// A node, by id.
    Node(String),
    /// An edge, by id.
    Edge(String),
}

/// What happened to an attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttributeChange {
    /// The attribute did not exist before.
    Added { value: AttributeValue },
    /// The attribute existed and changed value.
    Changed {
        old: AttributeValue,
        new: AttributeValue,
    },
    /// The attribute was removed.
    Removed,
}

impl AttributeChange {
    /// The value the attribute holds after this change, if any.
    pub fn new_value(&self) -> Option<&AttributeValue> {
        match self {
            AttributeChange::Added { value } => Some(value),
            AttributeChange::Changed { new, .. } => Some(new),
            AttributeChange::Removed => None,
        }
    }
}

/// A single graph mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphEvent {
    NodeAdded {
        node_id: String,
    },
    NodeRemoved {
        node_id: String,
    },
    EdgeAdded {
        edge_id: String,
        from: String,
        to: String,
        directed: bool,
    },
    EdgeRemoved {
        edge_id: String,
    },
    GraphCleared,
    StepBegins {
        step: f64,
    },
    Attribute {
        element: ElementRef,
        attribute: String,
        change: AttributeChange,
    },
}

impl GraphEvent {
    pub fn node_added(node_id: impl Into<String>) -> Self {
        GraphEvent::NodeAdded {
            node_id: node_id.into(),
        }
    }

    pub fn node_removed(node_id: impl Into<String>) -> Self {
        GraphEvent::NodeRemoved {
            node_id: node_id.into(),
        }
    }

    pub fn edge_added(
        edge_id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        directed: bool,
    ) -> Self {
        GraphEvent::EdgeAdded {
            edge_id: edge_id.into(),
            from: from.into(),
            to: to.into(),
            directed,
        }
    }

    pub fn edge_removed(edge_id: impl Into<String>) -> Self {
        GraphEvent::EdgeRemoved {
            edge_id: edge_id.into(),
        }
    }

    /// An attribute change on any element.
    pub fn attribute(
        element: ElementRef,
        attribute: impl Into<String>,
        change: AttributeChange,
    ) -> Self {
        GraphEvent::Attribute {
            element,
            attribute: attribute.into(),
            change,
        }
    }

    /// Shorthand for a graph attribute being set (added).
    pub fn graph_attribute(attribute: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self::attribute(
            ElementRef::Graph,
            attribute,
            AttributeChange::Added {
                value: value.into(),
            },
        )
    }

    /// Shorthand for a node attribute being set (added).
    pub fn node_attribute(
        node_id: impl Into<String>,
        attribute: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        Self::attribute(
            ElementRef::Node(node_id.into()),
            attribute,
            AttributeChange::Added {
                value: value.into(),
            },
        )
    }

    /// Shorthand for an edge attribute being set (added).
    pub fn edge_attribute(
        edge_id: impl Into<String>,
        attribute: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        Self::attribute(
            ElementRef::Edge(edge_id.into()),
            attribute,
            AttributeChange::Added {
                value: value.into(),
            },
        )
    }
}

/// A graph event stamped with its origin.
///
/// `source_id` and `time_id` let downstream collaborators filter replays of
/// events they already saw; sinks in this workspace only pass them along.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Id of the source that produced the event.
    pub source_id: String,
    /// Logical timestamp, monotonic per source.
    pub time_id: u64,
    /// The mutation itself.
    pub event: GraphEvent,
}

impl StreamEvent {
    pub fn new(source_id: impl Into<String>, time_id: u64, event: GraphEvent) -> Self {
        Self {
            source_id: source_id.into(),
            time_id,
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_value_per_change_kind() {
        let added = AttributeChange::Added { value: json!(1.5) };
        let changed = AttributeChange::Changed {
            old: json!(1.5),
            new: json!(2),
        };

        assert_eq!(added.new_value(), Some(&json!(1.5)));
        assert_eq!(changed.new_value(), Some(&json!(2)));
        assert_eq!(AttributeChange::Removed.new_value(), None);
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = StreamEvent::new("g", 3, GraphEvent::edge_added("e1", "a", "b", false));
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["source_id"], "g");
        assert_eq!(value["time_id"], 3);
        assert_eq!(value["event"]["type"], "edge_added");
        assert_eq!(value["event"]["from"], "a");

        let back: StreamEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_attribute_shorthands() {
        let event = GraphEvent::node_attribute("n1", "layout.weight", 2.0);
        match event {
            GraphEvent::Attribute {
                element,
                attribute,
                change,
            } => {
                assert_eq!(element, ElementRef::Node("n1".into()));
                assert_eq!(attribute, "layout.weight");
                assert_eq!(change.new_value(), Some(&json!(2.0)));
            }
            other => panic!("Expected attribute event, got {:?}", other),
        }
    }
}
