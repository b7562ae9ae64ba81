//! Incremental force-directed graph layout.
//!
//! This crate provides SpringBox, a spring-electrical layout that positions
//! graph nodes in 2D or 3D. Edges are springs with a rest length, nodes are
//! mutually repulsive particles, and repulsion is approximated with a
//! Barnes-Hut quad-tree (octree in 3D) rebuilt on every step.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Graph event stream                     │
//! │  node/edge added/removed, attributes, graph cleared         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     SpringBox (controller)                  │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ ParticleBox │───▶│   N-tree    │───▶│   Forces    │      │
//! │  │ (particles, │    │ (Barnes-Hut │    │ (repulsion, │      │
//! │  │   springs)  │    │  rebuild)   │    │   springs)  │      │
//! │  └─────────────┘    └─────────────┘    └─────────────┘      │
//! │                                               │             │
//! │                     ┌─────────────┐    ┌─────────────┐      │
//! │                     │  Energies   │◀───│  Integrate  │      │
//! │                     │ (stability) │    │   (moves)   │      │
//! │                     └─────────────┘    └─────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Outputs                             │
//! │  forwarded stream + "xyz" node attributes, listeners        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quality
//!
//! - Exhaustive repulsion: O(n²) per step (quality 4)
//! - Barnes-Hut approximation: O(n log n) per step (quality 0 to 3)
//!
//! Lower quality levels shrink the view zone, the radius inside which
//! n-tree cells are always expanded, trading accuracy for speed.
//!
//! ## Example
//!
//! ```
//! use vibe_graph_layout::{LayoutConfig, SpringBox};
//!
//! let mut layout = SpringBox::with_config(LayoutConfig::default().with_seed(7));
//! layout.add_node("a").unwrap();
//! layout.add_node("b").unwrap();
//! layout.add_edge("ab", "a", "b", false).unwrap();
//!
//! for _ in 0..100 {
//!     layout.compute();
//! }
//! assert_eq!(layout.steps(), 100);
//! ```

mod config;
mod energy;
mod error;
mod layout;
mod ntree;
mod particle;
mod particle_box;
mod runner;
mod spring;
mod springbox;
mod stats;

pub use config::{Dimensions, LayoutConfig, Quality};
pub use energy::Energies;
pub use error::{LayoutError, LayoutResult};
pub use layout::{Layout, LayoutListener, ListenerId};
pub use ntree::{Barycenter, Cell, CellKind, Entry, NTree, Opening, Query, Region, Visit};
pub use particle::{NodeParticle, ParticleKey};
pub use runner::{LayoutHandle, LayoutRunner, RunnerConfig};
pub use spring::{EdgeSpring, SpringKey, SpringTable};
pub use springbox::{
    SpringBox, ALGORITHM_NAME, EXACT_ZONE_ATTRIBUTE, FORCE_ATTRIBUTE, FROZEN_ATTRIBUTE,
    IGNORED_ATTRIBUTE, OUTPUT_STATS_ATTRIBUTE, QUALITY_ATTRIBUTE, WEIGHT_ATTRIBUTE, XYZ_ATTRIBUTE,
};
pub use stats::StepStats;

pub use glam::Vec3;
