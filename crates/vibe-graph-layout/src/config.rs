//! Layout configuration.
//!
//! [`LayoutConfig`] is the construction-time surface. At runtime the same
//! knobs are adjusted through graph attributes (`layout.force`,
//! `layout.quality`, ...), which the controller applies on change.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Number of spatial dimensions simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimensions {
    /// Quad-tree, `z` stays at zero.
    #[default]
    Two,
    /// Octree.
    Three,
}

impl Dimensions {
    /// Number of children of a subdivided n-tree cell.
    pub fn fanout(self) -> usize {
        match self {
            Dimensions::Two => 4,
            Dimensions::Three => 8,
        }
    }

    pub fn is_3d(self) -> bool {
        matches!(self, Dimensions::Three)
    }
}

/// Accuracy/speed dial, from 0 (fastest) to 4 (exact, O(n²)).
///
/// Each level selects the view zone: the radius, in multiples of `k`, inside
/// which n-tree cells are always expanded instead of approximated by their
/// barycenter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quality(u8);

impl Quality {
    pub const MIN: Quality = Quality(0);
    pub const MAX: Quality = Quality(4);

    /// Build a quality level, rejecting anything outside `0..=4`.
    pub fn new(level: u8) -> Option<Self> {
        (level <= Self::MAX.0).then_some(Quality(level))
    }

    /// Build a quality level, clamping out-of-range values to the nearest valid one.
    pub fn clamped(level: i64) -> Self {
        Quality(level.clamp(Self::MIN.0 as i64, Self::MAX.0 as i64) as u8)
    }

    pub fn level(self) -> u8 {
        self.0
    }

    /// View-zone radius for this level, or `None` when the view zone is
    /// unbounded and every cell is explored exhaustively.
    pub fn view_zone(self, k: f32) -> Option<f32> {
        match self.0 {
            0 => Some(k),
            1 => Some(2.0 * k),
            2 => Some(5.0 * k),
            3 => Some(10.0 * k),
            _ => None,
        }
    }
}

impl Default for Quality {
    fn default() -> Self {
        Quality(1)
    }
}

/// Configuration for [`SpringBox`](crate::SpringBox).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// 2D or 3D simulation.
    pub dimensions: Dimensions,
    /// Optimal distance between nodes (rest length of a weight-1 spring).
    pub k: f32,
    /// Attraction constant.
    pub k1: f32,
    /// Repulsion constant.
    pub k2: f32,
    /// Global displacement scale applied every step.
    pub force: f32,
    /// Accuracy/speed level.
    pub quality: Quality,
    /// Barnes-Hut opening threshold.
    pub theta: f32,
    /// Particles a cell holds before it subdivides.
    pub nodes_per_cell: usize,
    /// Depth bound for the n-tree, protects against coincident particles.
    pub max_tree_depth: usize,
    /// Capacity of the energy history.
    pub energy_history: usize,
    /// Moves shorter than this are applied but not reported.
    pub move_threshold: f32,
    /// Largest displacement per step, as a multiple of `k`.
    pub max_displacement: f32,
    /// Distance floor for the repulsion term, as a multiple of `k`.
    pub min_repulsion_distance: f32,
    /// Report moves only every N steps.
    pub move_events_every: u64,
    /// Log per-step statistics.
    pub output_stats: bool,
    /// File that per-step statistics are appended to while `output_stats` is on.
    pub stats_path: Option<PathBuf>,
    /// Seed for initial placement and jitter. Random when unset.
    pub seed: Option<u64>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            dimensions: Dimensions::Two,
            k: 1.0,
            k1: 0.06,
            k2: 0.024,
            force: 1.0,
            quality: Quality::default(),
            theta: 0.7,
            nodes_per_cell: 10,
            max_tree_depth: 20,
            energy_history: 256,
            move_threshold: 1e-4,
            max_displacement: 10.0,
            min_repulsion_distance: 0.1,
            move_events_every: 1,
            output_stats: false,
            stats_path: None,
            seed: None,
        }
    }
}

impl LayoutConfig {
    /// Coarse and quick: smallest view zone, bigger cells.
    pub fn fast() -> Self {
        Self {
            quality: Quality::MIN,
            nodes_per_cell: 20,
            ..Default::default()
        }
    }

    /// Exhaustive repulsion, no approximation.
    pub fn exact() -> Self {
        Self {
            quality: Quality::MAX,
            ..Default::default()
        }
    }

    /// Default settings in three dimensions.
    pub fn three_d() -> Self {
        Self {
            dimensions: Dimensions::Three,
            ..Default::default()
        }
    }

    /// Builder-style seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}
