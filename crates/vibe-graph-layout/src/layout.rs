//! The layout contract shared by every layout algorithm.

use std::time::Duration;

use glam::Vec3;
use vibe_graph_stream::{GraphSink, SinkId};

use crate::config::Quality;
use crate::error::LayoutResult;

/// Callbacks fired synchronously from inside [`Layout::compute`].
///
/// Implementations must not call back into the layout.
pub trait LayoutListener: Send {
    /// A node moved during the step in progress.
    fn node_moved(&mut self, _node_id: &str, _x: f32, _y: f32, _z: f32) {}

    /// A step finished; `stabilization` is in `[0, 1]`, lower is calmer.
    fn step_completion(&mut self, _stabilization: f64) {}
}

/// Handle returned by [`Layout::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

/// An incremental layout fed by a graph event stream.
///
/// The layout mirrors the topology it receives as a [`GraphSink`], advances
/// one step per [`compute`](Layout::compute), and re-publishes the stream
/// to its own sinks together with the node positions it produces.
pub trait Layout: GraphSink {
    /// Human readable algorithm name.
    fn algorithm_name(&self) -> &'static str;

    /// Run one simulation step.
    fn compute(&mut self);

    /// Convergence score of the last steps, `1.0` while unknown.
    fn stabilization(&self) -> f64;

    /// Completed steps since creation or the last clear.
    fn steps(&self) -> u64;

    /// Nodes that moved during the last step.
    fn node_moved_count(&self) -> usize;

    /// Wall time of the last step.
    fn last_step_time(&self) -> Duration;

    /// Lowest corner of the space currently occupied.
    fn low_point(&self) -> Vec3;

    /// Highest corner of the space currently occupied.
    fn hi_point(&self) -> Vec3;

    fn quality(&self) -> Quality;
    fn set_quality(&mut self, quality: Quality);

    fn force(&self) -> f32;
    fn set_force(&mut self, force: f32);

    fn add_listener(&mut self, listener: Box<dyn LayoutListener>) -> ListenerId;
    fn remove_listener(&mut self, id: ListenerId) -> bool;

    /// Subscribe a sink to the re-published stream.
    fn add_sink(&mut self, sink: Box<dyn GraphSink>) -> SinkId;
    fn remove_sink(&mut self, id: SinkId) -> bool;

    /// Move a node by `delta`, restarting the convergence measurement.
    fn move_node(&mut self, node_id: &str, delta: Vec3) -> LayoutResult<()>;

    /// Pin a node in place, or release it.
    fn freeze_node(&mut self, node_id: &str, frozen: bool) -> LayoutResult<()>;

    /// Restart the convergence measurement.
    fn shake(&mut self);

    /// Forget every node, edge and measurement.
    fn clear(&mut self);
}
