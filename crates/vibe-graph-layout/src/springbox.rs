//! SpringBox: the force-directed layout controller.
//!
//! Mirrors an upstream graph event stream into particles and springs, runs
//! one simulation step per [`SpringBox::compute`], and re-publishes the
//! stream with a synthetic `xyz` node attribute for every node that moved.

use std::time::Instant;

use glam::Vec3;
use serde_json::{json, Value};
use tracing::{debug, info, trace, warn};
use vibe_graph_stream::{
    AttributeChange, AttributeValue, ElementRef, EventSource, GraphEvent, GraphSink, SinkId,
    StreamEvent,
};

use crate::config::{LayoutConfig, Quality};
use crate::energy::Energies;
use crate::error::LayoutResult;
use crate::layout::{Layout, LayoutListener, ListenerId};
use crate::ntree::{NTree, Opening};
use crate::particle::{ForceParams, NodeParticle};
use crate::particle_box::{ParticleBox, ParticleObserver};
use crate::spring::{EdgeSpring, SpringTable};
use crate::stats::{StatsWriter, StepStats, ENERGY_DIFF_RANGE};

/// Name of the algorithm, also the source id of the events it originates.
pub const ALGORITHM_NAME: &str = "SpringBox";

/// Node attribute carrying the position as `[x, y, z]`.
pub const XYZ_ATTRIBUTE: &str = "xyz";

pub const FORCE_ATTRIBUTE: &str = "layout.force";
pub const QUALITY_ATTRIBUTE: &str = "layout.quality";
pub const EXACT_ZONE_ATTRIBUTE: &str = "layout.exact-zone";
pub const OUTPUT_STATS_ATTRIBUTE: &str = "layout.output-stats";
pub const WEIGHT_ATTRIBUTE: &str = "layout.weight";
pub const FROZEN_ATTRIBUTE: &str = "layout.frozen";
pub const IGNORED_ATTRIBUTE: &str = "layout.ignored";

/// Force-directed layout over a Barnes-Hut n-tree.
pub struct SpringBox {
    config: LayoutConfig,
    particles: ParticleBox,
    springs: SpringTable,
    energies: Energies,
    /// Radius inside which cells are always expanded; `None` is exhaustive.
    view_zone: Option<f32>,
    listeners: Vec<(ListenerId, Box<dyn LayoutListener>)>,
    next_listener_id: u64,
    output: EventSource,
    stats_writer: Option<StatsWriter>,
    stats: StepStats,
    time: u64,
}

impl SpringBox {
    /// A 2D layout with default settings.
    pub fn new() -> Self {
        Self::with_config(LayoutConfig::default())
    }

    /// A 3D layout with default settings.
    pub fn new_3d() -> Self {
        Self::with_config(LayoutConfig::three_d())
    }

    pub fn with_config(config: LayoutConfig) -> Self {
        let mut config = config;
        if !(config.k.is_finite() && config.k > 0.0) {
            warn!(k = config.k, "invalid optimal distance, using 1.0");
            config.k = 1.0;
        }

        let particles = ParticleBox::new(
            config.dimensions,
            config.nodes_per_cell,
            config.max_tree_depth,
            config.k,
            config.seed,
        );

        info!(
            dimensions = ?config.dimensions,
            quality = config.quality.level(),
            force = config.force,
            "SpringBox layout created"
        );

        Self {
            view_zone: config.quality.view_zone(config.k),
            energies: Energies::new(config.energy_history),
            stats_writer: config.stats_path.clone().map(StatsWriter::new),
            particles,
            springs: SpringTable::new(),
            listeners: Vec::new(),
            next_listener_id: 0,
            output: EventSource::new(ALGORITHM_NAME),
            stats: StepStats::default(),
            time: 0,
            config,
        }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Topology
    // ------------------------------------------------------------------

    pub fn node_count(&self) -> usize {
        self.particles.len()
    }

    pub fn edge_count(&self) -> usize {
        self.springs.len()
    }

    pub fn contains_node(&self, node_id: &str) -> bool {
        self.particles.get(node_id).is_some()
    }

    pub fn contains_edge(&self, edge_id: &str) -> bool {
        self.springs.contains(edge_id)
    }

    pub fn node(&self, node_id: &str) -> Option<&NodeParticle> {
        self.particles.get(node_id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&str, &NodeParticle)> {
        self.particles.iter()
    }

    pub fn edge(&self, edge_id: &str) -> Option<&EdgeSpring> {
        self.springs.get(edge_id)
    }

    pub fn edges(&self) -> impl Iterator<Item = (&str, &EdgeSpring)> {
        self.springs.iter()
    }

    pub fn add_node(&mut self, node_id: &str) -> LayoutResult<()> {
        self.particles.add_particle(node_id)?;
        debug!(node_id, "particle added");
        Ok(())
    }

    /// Remove a node and every edge attached to it.
    pub fn remove_node(&mut self, node_id: &str) -> LayoutResult<()> {
        let detached = self.particles.remove_particle(&mut self.springs, node_id)?;
        debug!(node_id, springs = detached.len(), "particle removed");
        Ok(())
    }

    /// Add a spring between two existing nodes.
    ///
    /// A duplicate id keeps the existing spring; a missing endpoint drops
    /// the edge.
    pub fn add_edge(&mut self, edge_id: &str, from: &str, to: &str, directed: bool) -> LayoutResult<()> {
        self.particles
            .attach_spring(&mut self.springs, edge_id, from, to, directed)?;
        debug!(edge_id, from, to, "spring added");
        Ok(())
    }

    pub fn remove_edge(&mut self, edge_id: &str) -> LayoutResult<()> {
        self.particles.detach_spring(&mut self.springs, edge_id)?;
        debug!(edge_id, "spring removed");
        Ok(())
    }

    /// Repulsion strength of a node. Negative and non-finite weights are
    /// replaced.
    pub fn set_node_weight(&mut self, node_id: &str, weight: f32) -> LayoutResult<()> {
        let weight = sanitize_weight(weight, "node");
        self.particles.get_mut(node_id)?.weight = weight;
        self.energies.clear();
        Ok(())
    }

    /// Rest length multiplier of a spring.
    pub fn set_edge_weight(&mut self, edge_id: &str, weight: f32) -> LayoutResult<()> {
        let weight = sanitize_weight(weight, "edge");
        self.springs.get_mut(edge_id)?.weight = weight;
        self.energies.clear();
        Ok(())
    }

    pub fn set_edge_ignored(&mut self, edge_id: &str, ignored: bool) -> LayoutResult<()> {
        self.springs.get_mut(edge_id)?.ignored = ignored;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Node manipulation
    // ------------------------------------------------------------------

    pub fn node_position(&self, node_id: &str) -> Option<Vec3> {
        self.particles.get(node_id).map(NodeParticle::position)
    }

    /// Net force the node received at the last step.
    pub fn node_force(&self, node_id: &str) -> Option<Vec3> {
        self.particles.get(node_id).map(NodeParticle::force)
    }

    /// Place a node at an absolute position.
    pub fn set_node_position(&mut self, node_id: &str, position: Vec3) -> LayoutResult<()> {
        let position = self.planar(position);
        let particle = self.particles.get_mut(node_id)?;
        if !position.is_finite() {
            warn!(node_id, ?position, "ignoring non-finite position");
            return Ok(());
        }
        particle.position = position;
        self.energies.clear();
        Ok(())
    }

    pub fn move_node(&mut self, node_id: &str, delta: Vec3) -> LayoutResult<()> {
        let position = self.particles.get_mut(node_id)?.position + delta;
        self.set_node_position(node_id, position)
    }

    pub fn freeze_node(&mut self, node_id: &str, frozen: bool) -> LayoutResult<()> {
        self.particles.get_mut(node_id)?.frozen = frozen;
        Ok(())
    }

    fn planar(&self, mut position: Vec3) -> Vec3 {
        if !self.config.dimensions.is_3d() {
            position.z = 0.0;
        }
        position
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    pub fn force(&self) -> f32 {
        self.config.force
    }

    pub fn set_force(&mut self, force: f32) {
        if !force.is_finite() {
            warn!(force, "ignoring non-finite layout force");
            return;
        }
        if force < 0.0 {
            warn!(force, "negative layout force clamped to 0");
        }
        self.config.force = force.max(0.0);
        info!(force = self.config.force, "layout force changed");
    }

    pub fn quality(&self) -> Quality {
        self.config.quality
    }

    /// Select a quality level. Also replaces any exact zone in effect.
    pub fn set_quality(&mut self, quality: Quality) {
        self.config.quality = quality;
        self.view_zone = quality.view_zone(self.config.k);
        info!(
            quality = quality.level(),
            view_zone = ?self.view_zone,
            "layout quality changed"
        );
    }

    /// Current view-zone radius, `None` when traversal is exhaustive.
    pub fn view_zone(&self) -> Option<f32> {
        self.view_zone
    }

    /// Set the view zone directly, as a fraction in `[0, 1]` of `k`.
    pub fn set_exact_zone(&mut self, zone: f32) {
        if !zone.is_finite() {
            warn!(zone, "ignoring non-finite exact zone");
            return;
        }
        let clamped = zone.clamp(0.0, 1.0);
        if clamped != zone {
            warn!(zone, clamped, "exact zone clamped");
        }
        self.view_zone = Some(clamped * self.config.k);
        info!(view_zone = ?self.view_zone, "layout exact zone changed");
    }

    pub fn output_stats(&self) -> bool {
        self.config.output_stats
    }

    pub fn set_output_stats(&mut self, on: bool) {
        self.config.output_stats = on;
        info!(output_stats = on, "layout statistics output changed");
    }

    // ------------------------------------------------------------------
    // Measurements
    // ------------------------------------------------------------------

    pub fn energies(&self) -> &Energies {
        &self.energies
    }

    pub fn stabilization(&self) -> f64 {
        self.energies.stabilization()
    }

    /// Statistics of the last step.
    pub fn step_stats(&self) -> StepStats {
        self.stats
    }

    pub fn steps(&self) -> u64 {
        self.time
    }

    pub fn tree(&self) -> &NTree {
        self.particles.tree()
    }

    pub fn low_point(&self) -> Vec3 {
        self.particles.tree().lowest_point()
    }

    pub fn hi_point(&self) -> Vec3 {
        self.particles.tree().highest_point()
    }

    // ------------------------------------------------------------------
    // Subscribers
    // ------------------------------------------------------------------

    pub fn add_listener(&mut self, listener: Box<dyn LayoutListener>) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners.push((id, listener));
        id
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    pub fn add_sink(&mut self, sink: Box<dyn GraphSink>) -> SinkId {
        self.output.add_sink(sink)
    }

    pub fn remove_sink(&mut self, id: SinkId) -> bool {
        self.output.remove_sink(id)
    }

    // ------------------------------------------------------------------
    // Simulation
    // ------------------------------------------------------------------

    /// Run one step: rebuild the n-tree, move every particle, record the
    /// energy and notify listeners.
    pub fn compute(&mut self) {
        let started = Instant::now();
        let area = self.particles.tree().region().diagonal();
        let params = self.force_params();
        let move_threshold = self.config.move_threshold;
        let notify = self.time % self.config.move_events_every.max(1) == 0;

        let Self {
            particles,
            springs,
            listeners,
            output,
            ..
        } = &mut *self;
        let mut relay = MoveRelay {
            notify,
            listeners,
            output,
        };
        let outcome = particles.step(springs, &params, move_threshold, &mut relay);

        self.energies.accumulate(outcome.energy);
        self.energies.store();

        self.stats = StepStats {
            step: self.time,
            moved: outcome.moved,
            max_move: outcome.max_move,
            avg_move: outcome.avg_move,
            energy: outcome.energy,
            area,
            duration: started.elapsed(),
        };
        self.report_stats();
        self.time += 1;

        let stabilization = self.energies.stabilization();
        for (_, listener) in &mut self.listeners {
            listener.step_completion(stabilization);
        }
    }

    /// Restart the convergence measurement.
    pub fn shake(&mut self) {
        self.energies.clear();
    }

    /// Forget every node, edge and measurement. Settings and subscribers stay.
    pub fn clear(&mut self) {
        self.particles.clear();
        self.springs.clear();
        self.energies.clear();
        self.stats = StepStats::default();
        self.time = 0;
        debug!("layout cleared");
    }

    fn force_params(&self) -> ForceParams {
        let config = &self.config;
        ForceParams {
            k: config.k,
            k1: config.k1,
            k2: config.k2,
            force: config.force,
            opening: Opening {
                theta: config.theta,
                view_zone: self.view_zone,
            },
            max_displacement: config.max_displacement * config.k,
            min_distance: config.min_repulsion_distance * config.k,
            dimensions: config.dimensions,
        }
    }

    fn report_stats(&mut self) {
        if !self.config.output_stats {
            return;
        }

        let stabilization = self.energies.stabilization();
        let energy_diff = self
            .energies
            .previous(ENERGY_DIFF_RANGE)
            .map_or(0.0, |before| self.stats.energy - before);

        info!(
            step = self.stats.step,
            stabilization,
            moved = self.stats.moved,
            energy = self.stats.energy,
            energy_diff,
            max_move = self.stats.max_move,
            avg_move = self.stats.avg_move,
            area = self.stats.area,
            "layout step"
        );

        let failure = self.stats_writer.as_mut().and_then(|writer| {
            writer
                .write(&self.stats, stabilization, energy_diff)
                .err()
                .map(|err| (writer.path().to_path_buf(), err))
        });
        if let Some((path, err)) = failure {
            warn!(path = %path.display(), error = %err, "disabling layout statistics file");
            self.stats_writer = None;
        }
    }

    // ------------------------------------------------------------------
    // Event stream
    // ------------------------------------------------------------------

    /// Mirror one upstream event. Failures are logged and the event dropped.
    fn apply(&mut self, event: &GraphEvent) {
        let result = match event {
            GraphEvent::NodeAdded { node_id } => self.add_node(node_id),
            GraphEvent::NodeRemoved { node_id } => self.remove_node(node_id),
            GraphEvent::EdgeAdded {
                edge_id,
                from,
                to,
                directed,
            } => self.add_edge(edge_id, from, to, *directed),
            GraphEvent::EdgeRemoved { edge_id } => self.remove_edge(edge_id),
            GraphEvent::GraphCleared => {
                self.clear();
                Ok(())
            }
            GraphEvent::StepBegins { step } => {
                trace!(step, "upstream step");
                Ok(())
            }
            GraphEvent::Attribute {
                element,
                attribute,
                change,
            } => self.apply_attribute(element, attribute, change.new_value()),
        };

        if let Err(err) = result {
            warn!(error = %err, "dropping graph event");
        }
    }

    fn apply_attribute(
        &mut self,
        element: &ElementRef,
        attribute: &str,
        value: Option<&AttributeValue>,
    ) -> LayoutResult<()> {
        match element {
            ElementRef::Graph => {
                self.apply_graph_attribute(attribute, value);
                Ok(())
            }
            ElementRef::Node(node_id) => match attribute {
                WEIGHT_ATTRIBUTE => self.set_node_weight(node_id, number_or(value, attribute, 1.0)),
                FROZEN_ATTRIBUTE => self.freeze_node(node_id, flag(value)),
                _ => Ok(()),
            },
            ElementRef::Edge(edge_id) => match attribute {
                WEIGHT_ATTRIBUTE => self.set_edge_weight(edge_id, number_or(value, attribute, 1.0)),
                IGNORED_ATTRIBUTE => self.set_edge_ignored(edge_id, flag(value)),
                _ => Ok(()),
            },
        }
    }

    fn apply_graph_attribute(&mut self, attribute: &str, value: Option<&AttributeValue>) {
        let defaults = LayoutConfig::default();
        match attribute {
            FORCE_ATTRIBUTE => self.set_force(number_or(value, attribute, defaults.force)),
            QUALITY_ATTRIBUTE => {
                let requested = value
                    .and_then(number)
                    .map_or(defaults.quality.level() as i64, |q| q.round() as i64);
                let quality = Quality::clamped(requested);
                if quality.level() as i64 != requested {
                    warn!(requested, clamped = quality.level(), "layout quality clamped");
                }
                self.set_quality(quality);
            }
            EXACT_ZONE_ATTRIBUTE => match value.and_then(number) {
                Some(zone) => self.set_exact_zone(zone as f32),
                None => self.set_quality(self.config.quality),
            },
            OUTPUT_STATS_ATTRIBUTE => self.set_output_stats(flag(value)),
            _ => {}
        }
    }
}

impl Default for SpringBox {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SpringBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpringBox")
            .field("config", &self.config)
            .field("nodes", &self.particles.len())
            .field("edges", &self.springs.len())
            .field("view_zone", &self.view_zone)
            .field("steps", &self.time)
            .field("listeners", &self.listeners.len())
            .field("output", &self.output)
            .finish()
    }
}

impl GraphSink for SpringBox {
    fn handle_event(&mut self, event: &StreamEvent) {
        self.apply(&event.event);
        self.output.forward(event);
    }
}

impl Layout for SpringBox {
    fn algorithm_name(&self) -> &'static str {
        ALGORITHM_NAME
    }

    fn compute(&mut self) {
        SpringBox::compute(self)
    }

    fn stabilization(&self) -> f64 {
        SpringBox::stabilization(self)
    }

    fn steps(&self) -> u64 {
        self.time
    }

    fn node_moved_count(&self) -> usize {
        self.stats.moved
    }

    fn last_step_time(&self) -> std::time::Duration {
        self.stats.duration
    }

    fn low_point(&self) -> Vec3 {
        SpringBox::low_point(self)
    }

    fn hi_point(&self) -> Vec3 {
        SpringBox::hi_point(self)
    }

    fn quality(&self) -> Quality {
        self.config.quality
    }

    fn set_quality(&mut self, quality: Quality) {
        SpringBox::set_quality(self, quality)
    }

    fn force(&self) -> f32 {
        self.config.force
    }

    fn set_force(&mut self, force: f32) {
        SpringBox::set_force(self, force)
    }

    fn add_listener(&mut self, listener: Box<dyn LayoutListener>) -> ListenerId {
        SpringBox::add_listener(self, listener)
    }

    fn remove_listener(&mut self, id: ListenerId) -> bool {
        SpringBox::remove_listener(self, id)
    }

    fn add_sink(&mut self, sink: Box<dyn GraphSink>) -> SinkId {
        SpringBox::add_sink(self, sink)
    }

    fn remove_sink(&mut self, id: SinkId) -> bool {
        SpringBox::remove_sink(self, id)
    }

    fn move_node(&mut self, node_id: &str, delta: Vec3) -> LayoutResult<()> {
        SpringBox::move_node(self, node_id, delta)
    }

    fn freeze_node(&mut self, node_id: &str, frozen: bool) -> LayoutResult<()> {
        SpringBox::freeze_node(self, node_id, frozen)
    }

    fn shake(&mut self) {
        SpringBox::shake(self)
    }

    fn clear(&mut self) {
        SpringBox::clear(self)
    }
}

/// Turns particle moves into listener calls and `xyz` events.
struct MoveRelay<'a> {
    notify: bool,
    listeners: &'a mut Vec<(ListenerId, Box<dyn LayoutListener>)>,
    output: &'a mut EventSource,
}

impl ParticleObserver for MoveRelay<'_> {
    fn particle_moved(&mut self, node_id: &str, from: Vec3, to: Vec3) {
        if !self.notify {
            return;
        }

        for (_, listener) in self.listeners.iter_mut() {
            listener.node_moved(node_id, to.x, to.y, to.z);
        }

        if self.output.has_sinks() {
            self.output.emit(GraphEvent::attribute(
                ElementRef::Node(node_id.to_owned()),
                XYZ_ATTRIBUTE,
                AttributeChange::Changed {
                    old: json!([from.x, from.y, from.z]),
                    new: json!([to.x, to.y, to.z]),
                },
            ));
        }
    }
}

fn sanitize_weight(weight: f32, element: &str) -> f32 {
    if !weight.is_finite() {
        warn!(weight, element, "non-finite weight replaced by 1.0");
        return 1.0;
    }
    if weight < 0.0 {
        warn!(weight, element, "negative weight clamped to 0");
        return 0.0;
    }
    weight
}

fn number(value: &AttributeValue) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Numeric attribute value, `default` when removed or null.
fn number_or(value: Option<&AttributeValue>, attribute: &str, default: f32) -> f32 {
    match value {
        None | Some(Value::Null) => default,
        Some(v) => number(v).map_or_else(
            || {
                warn!(attribute, value = %v, "not a number, using default");
                default
            },
            |n| n as f32,
        ),
    }
}

/// Boolean attribute value. Present attributes count as set unless they
/// explicitly say otherwise.
fn flag(value: Option<&AttributeValue>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(on)) => *on,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => !s.eq_ignore_ascii_case("false") && s != "0",
        Some(_) => true,
    }
}
