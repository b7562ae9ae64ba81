//! Node particles and the force kernel.
//!
//! Each graph node is a particle that is pushed away from every other
//! particle (Coulomb-like, `K2 * w / d²`) and pulled or pushed along its
//! springs toward their rest length (Hooke, `K1 * (d - k * w)`).

use std::f32::consts::TAU;

use glam::Vec3;
use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::Rng;

use crate::config::Dimensions;
use crate::ntree::{NTree, Opening, Visit};
use crate::spring::{SpringKey, SpringTable};

/// Distances below this are treated as coincident.
const COINCIDENT_EPSILON: f32 = 1e-5;

/// Handle to a particle in the particle box.
///
/// Like [`SpringKey`], a position in an index map: it is re-pointed
/// whenever a removal moves the particle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParticleKey(pub(crate) usize);

/// Per-step constants of the force model, resolved from the configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ForceParams {
    pub k: f32,
    pub k1: f32,
    pub k2: f32,
    pub force: f32,
    pub opening: Opening,
    /// Absolute displacement bound.
    pub max_displacement: f32,
    /// Absolute distance floor of the repulsion term.
    pub min_distance: f32,
    pub dimensions: Dimensions,
}

/// A simulated graph node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeParticle {
    pub(crate) position: Vec3,
    pub(crate) displacement: Vec3,
    pub(crate) force: Vec3,
    pub(crate) weight: f32,
    pub(crate) frozen: bool,
    pub(crate) springs: Vec<SpringKey>,
}

impl NodeParticle {
    pub(crate) fn new(position: Vec3) -> Self {
        Self {
            position,
            displacement: Vec3::ZERO,
            force: Vec3::ZERO,
            weight: 1.0,
            frozen: false,
            springs: Vec::new(),
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Displacement applied at the last step.
    pub fn displacement(&self) -> Vec3 {
        self.displacement
    }

    /// Net force of the last step, before scaling and clamping.
    pub fn force(&self) -> Vec3 {
        self.force
    }

    /// Repulsion strength multiplier.
    pub fn weight(&self) -> f32 {
        self.weight
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Number of springs attached to this particle.
    pub fn degree(&self) -> usize {
        self.springs.len()
    }

    pub(crate) fn register_spring(&mut self, key: SpringKey) {
        if !self.springs.contains(&key) {
            self.springs.push(key);
        }
    }

    pub(crate) fn unregister_spring(&mut self, key: SpringKey) {
        self.springs.retain(|&s| s != key);
    }

    pub(crate) fn retarget_spring(&mut self, from: SpringKey, to: SpringKey) {
        for spring in &mut self.springs {
            if *spring == from {
                *spring = to;
            }
        }
    }

    /// Repulsion from everything the n-tree shows this particle.
    ///
    /// `index` is this particle's entry in the tree, skipped during the
    /// traversal. `stack` is the traversal scratch.
    pub(crate) fn repulsion(
        &self,
        index: usize,
        tree: &NTree,
        params: &ForceParams,
        rng: &mut StdRng,
        stack: &mut Vec<usize>,
    ) -> Vec3 {
        let mut total = Vec3::ZERO;

        for visit in tree.query(self.position, params.opening, stack) {
            let (source, weight) = match visit {
                Visit::Particle { index: other, .. } if other == index => continue,
                Visit::Particle {
                    position, weight, ..
                } => (position, weight),
                Visit::Aggregate(barycenter) => (barycenter.center, barycenter.weight),
            };

            let delta = self.position - source;
            let distance = delta.length();
            let direction = if distance < COINCIDENT_EPSILON {
                jitter(rng, params.dimensions)
            } else {
                delta / distance
            };
            let distance = distance.max(params.min_distance);

            total += direction * (params.k2 * weight / (distance * distance));
        }

        total
    }

    /// Spring forces along every non-ignored incident edge.
    pub(crate) fn attraction(
        &self,
        key: ParticleKey,
        particles: &IndexMap<String, NodeParticle>,
        springs: &SpringTable,
        params: &ForceParams,
    ) -> Vec3 {
        self.springs
            .iter()
            .map(|&s| &springs[s])
            .filter(|spring| !spring.ignored)
            .fold(Vec3::ZERO, |total, spring| {
                let other = &particles[spring.opposite(key).0];
                let delta = other.position - self.position;
                let length = delta.length();
                if length < COINCIDENT_EPSILON {
                    return total;
                }

                let target = params.k * spring.weight;
                total + delta / length * (params.k1 * (length - target))
            })
    }
}

impl ForceParams {
    /// Scale a net force into this step's displacement.
    ///
    /// The result is finite and at most `max_displacement` long.
    pub(crate) fn displacement(&self, force: Vec3) -> Vec3 {
        let mut displacement = force * self.force;
        if !self.dimensions.is_3d() {
            displacement.z = 0.0;
        }
        if !displacement.is_finite() {
            return Vec3::ZERO;
        }
        displacement.clamp_length_max(self.max_displacement)
    }
}

/// Random unit vector, in the plane for 2D.
pub(crate) fn jitter(rng: &mut StdRng, dimensions: Dimensions) -> Vec3 {
    let angle = rng.random_range(0.0..TAU);
    match dimensions {
        Dimensions::Two => Vec3::new(angle.cos(), angle.sin(), 0.0),
        Dimensions::Three => {
            let z: f32 = rng.random_range(-1.0..=1.0);
            let r = (1.0 - z * z).max(0.0).sqrt();
            Vec3::new(r * angle.cos(), r * angle.sin(), z)
        }
    }
}

/// Random starting point in the `[-spread, spread]` box.
pub(crate) fn initial_position(rng: &mut StdRng, dimensions: Dimensions, spread: f32) -> Vec3 {
    let spread = spread.abs().max(f32::EPSILON);
    let x = rng.random_range(-spread..spread);
    let y = rng.random_range(-spread..spread);
    let z = match dimensions {
        Dimensions::Two => 0.0,
        Dimensions::Three => rng.random_range(-spread..spread),
    };
    Vec3::new(x, y, z)
}
