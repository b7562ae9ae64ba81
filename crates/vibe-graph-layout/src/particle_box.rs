//! The particle store.
//!
//! Owns one [`NodeParticle`] per graph node and the n-tree indexing them,
//! keeps particle/spring back-references consistent through removals, and
//! runs the per-step cycle: rebuild the index, compute every force from that
//! snapshot, then integrate.

use glam::Vec3;
use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::Dimensions;
use crate::error::{LayoutError, LayoutResult};
use crate::ntree::{Entry, NTree};
use crate::particle::{initial_position, ForceParams, NodeParticle, ParticleKey};
use crate::spring::{EdgeSpring, SpringKey, SpringTable};

/// Receives every particle whose move exceeded the threshold during a step.
pub(crate) trait ParticleObserver {
    fn particle_moved(&mut self, node_id: &str, from: Vec3, to: Vec3);
}

impl<F> ParticleObserver for F
where
    F: FnMut(&str, Vec3, Vec3),
{
    fn particle_moved(&mut self, node_id: &str, from: Vec3, to: Vec3) {
        self(node_id, from, to)
    }
}

/// What one step did.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct StepOutcome {
    pub moved: usize,
    pub max_move: f32,
    pub avg_move: f32,
    pub energy: f32,
}

#[derive(Debug)]
pub(crate) struct ParticleBox {
    dimensions: Dimensions,
    particles: IndexMap<String, NodeParticle>,
    tree: NTree,
    rng: StdRng,
    /// Half-width of the box new particles are dropped into.
    spread: f32,
    /// Per-step force scratch, parallel to `particles`.
    forces: Vec<Vec3>,
    /// Traversal stack shared by every tree query of a step.
    stack: Vec<usize>,
}

impl ParticleBox {
    pub fn new(
        dimensions: Dimensions,
        nodes_per_cell: usize,
        max_depth: usize,
        spread: f32,
        seed: Option<u64>,
    ) -> Self {
        Self {
            dimensions,
            particles: IndexMap::new(),
            tree: NTree::new(dimensions, nodes_per_cell, max_depth),
            rng: seed.map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64),
            spread,
            forces: Vec::new(),
            stack: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn get(&self, node_id: &str) -> Option<&NodeParticle> {
        self.particles.get(node_id)
    }

    pub fn get_mut(&mut self, node_id: &str) -> LayoutResult<&mut NodeParticle> {
        self.particles
            .get_mut(node_id)
            .ok_or_else(|| LayoutError::NodeNotFound {
                node_id: node_id.to_owned(),
            })
    }

    pub fn key_of(&self, node_id: &str) -> Option<ParticleKey> {
        self.particles.get_index_of(node_id).map(ParticleKey)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NodeParticle)> {
        self.particles.iter().map(|(id, p)| (id.as_str(), p))
    }

    pub fn tree(&self) -> &NTree {
        &self.tree
    }

    /// Create a particle at a random spot of the seeding box.
    pub fn add_particle(&mut self, node_id: &str) -> LayoutResult<ParticleKey> {
        if self.particles.contains_key(node_id) {
            return Err(LayoutError::DuplicateNode {
                node_id: node_id.to_owned(),
            });
        }

        let position = initial_position(&mut self.rng, self.dimensions, self.spread);
        let (index, _) = self
            .particles
            .insert_full(node_id.to_owned(), NodeParticle::new(position));
        Ok(ParticleKey(index))
    }

    /// Remove a particle together with every spring attached to it.
    ///
    /// Returns the ids of the edges that went with it.
    pub fn remove_particle(
        &mut self,
        springs: &mut SpringTable,
        node_id: &str,
    ) -> LayoutResult<Vec<String>> {
        let key = self.key_of(node_id).ok_or_else(|| LayoutError::NodeNotFound {
            node_id: node_id.to_owned(),
        })?;

        let mut detached = Vec::new();
        while let Some(spring) = self.particles[key.0].springs.pop() {
            if let Some((edge_id, _)) = self.detach_key(springs, spring) {
                detached.push(edge_id);
            }
        }

        let last = self.particles.len() - 1;
        self.particles.swap_remove_index(key.0);
        if key.0 != last {
            let moved = ParticleKey(last);
            for &spring in &self.particles[key.0].springs {
                springs[spring].retarget(moved, key);
            }
        }

        Ok(detached)
    }

    /// Register a spring between two existing particles.
    pub fn attach_spring(
        &mut self,
        springs: &mut SpringTable,
        edge_id: &str,
        from: &str,
        to: &str,
        directed: bool,
    ) -> LayoutResult<SpringKey> {
        if springs.contains(edge_id) {
            return Err(LayoutError::DuplicateEdge {
                edge_id: edge_id.to_owned(),
            });
        }

        let endpoint = |node_id: &str| {
            self.key_of(node_id).ok_or_else(|| LayoutError::MissingEndpoint {
                edge_id: edge_id.to_owned(),
                node_id: node_id.to_owned(),
            })
        };
        let node0 = endpoint(from)?;
        let node1 = endpoint(to)?;

        let key = springs.insert(edge_id, EdgeSpring::new(node0, node1, directed))?;
        self.particles[node0.0].register_spring(key);
        self.particles[node1.0].register_spring(key);
        Ok(key)
    }

    /// Unregister a spring from both of its endpoints and drop it.
    pub fn detach_spring(&mut self, springs: &mut SpringTable, edge_id: &str) -> LayoutResult<EdgeSpring> {
        let key = springs.key_of(edge_id).ok_or_else(|| LayoutError::EdgeNotFound {
            edge_id: edge_id.to_owned(),
        })?;

        self.detach_key(springs, key)
            .map(|(_, spring)| spring)
            .ok_or_else(|| LayoutError::EdgeNotFound {
                edge_id: edge_id.to_owned(),
            })
    }

    fn detach_key(&mut self, springs: &mut SpringTable, key: SpringKey) -> Option<(String, EdgeSpring)> {
        let (edge_id, spring, moved) = springs.swap_remove(key)?;

        let (node0, node1) = spring.endpoints();
        self.particles[node0.0].unregister_spring(key);
        self.particles[node1.0].unregister_spring(key);

        // The former last spring now lives at `key`.
        if let Some(old) = moved {
            let (node0, node1) = springs[key].endpoints();
            self.particles[node0.0].retarget_spring(old, key);
            self.particles[node1.0].retarget_spring(old, key);
        }

        Some((edge_id, spring))
    }

    /// Drop every particle and forget the index bounds.
    pub fn clear(&mut self) {
        self.particles.clear();
        self.forces.clear();
        self.tree.clear();
    }

    /// One simulation step.
    ///
    /// Every force is computed against the positions held at the start of
    /// the step; moves are applied afterwards. Frozen particles exert force
    /// but get none and never move.
    pub fn step(
        &mut self,
        springs: &SpringTable,
        params: &ForceParams,
        move_threshold: f32,
        observer: &mut impl ParticleObserver,
    ) -> StepOutcome {
        self.tree.rebuild(self.particles.values().map(|p| Entry {
            position: p.position,
            weight: p.weight,
        }));

        let mut outcome = StepOutcome::default();

        self.forces.clear();
        for (index, particle) in self.particles.values().enumerate() {
            let force = if particle.frozen {
                Vec3::ZERO
            } else {
                particle.repulsion(index, &self.tree, params, &mut self.rng, &mut self.stack)
                    + particle.attraction(ParticleKey(index), &self.particles, springs, params)
            };
            outcome.energy += force.length();
            self.forces.push(force);
        }

        let mut total_move = 0.0;
        for ((node_id, particle), &force) in self.particles.iter_mut().zip(&self.forces) {
            particle.force = force;
            if particle.frozen {
                particle.displacement = Vec3::ZERO;
                continue;
            }

            let displacement = params.displacement(force);
            particle.displacement = displacement;

            let from = particle.position;
            particle.position += displacement;

            let distance = displacement.length();
            if distance > move_threshold {
                outcome.moved += 1;
                outcome.max_move = outcome.max_move.max(distance);
                total_move += distance;
                observer.particle_moved(node_id, from, particle.position);
            }
        }

        if outcome.moved > 0 {
            outcome.avg_move = total_move / outcome.moved as f32;
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ntree::Opening;

    fn store() -> (ParticleBox, SpringTable) {
        (
            ParticleBox::new(Dimensions::Two, 10, 20, 1.0, Some(42)),
            SpringTable::new(),
        )
    }

    fn params() -> ForceParams {
        ForceParams {
            k: 1.0,
            k1: 0.06,
            k2: 0.024,
            force: 1.0,
            opening: Opening::exhaustive(),
            max_displacement: 10.0,
            min_distance: 0.1,
            dimensions: Dimensions::Two,
        }
    }

    /// Every spring is referenced by exactly its two endpoints, and every
    /// handle a particle holds points back at it.
    fn assert_consistent(particles: &ParticleBox, springs: &SpringTable) {
        for (index, (_, particle)) in particles.iter().enumerate() {
            for &key in &particle.springs {
                let (a, b) = springs[key].endpoints();
                assert!(a.0 == index || b.0 == index);
            }
        }
        for (edge_id, spring) in springs.iter() {
            let key = springs.key_of(edge_id).unwrap();
            let (a, b) = spring.endpoints();
            assert!(a.0 < particles.len() && b.0 < particles.len());
            assert!(particles.particles[a.0].springs.contains(&key));
            assert!(particles.particles[b.0].springs.contains(&key));
        }
    }

    #[test]
    fn test_new_particles_are_planar_in_2d() {
        let (mut particles, _) = store();
        for id in ["a", "b", "c"] {
            particles.add_particle(id).unwrap();
        }
        for (_, particle) in particles.iter() {
            assert_eq!(particle.position().z, 0.0);
            assert!(particle.position().abs().max_element() <= 1.0);
        }
    }

    #[test]
    fn test_duplicate_particle_is_rejected() {
        let (mut particles, _) = store();
        particles.add_particle("a").unwrap();
        let err = particles.add_particle("a").unwrap_err();
        assert!(matches!(err, LayoutError::DuplicateNode { .. }));
        assert_eq!(particles.len(), 1);
    }

    #[test]
    fn test_removing_middle_node_removes_its_springs() {
        let (mut particles, mut springs) = store();
        for id in ["a", "b", "c"] {
            particles.add_particle(id).unwrap();
        }
        particles.attach_spring(&mut springs, "ab", "a", "b", false).unwrap();
        particles.attach_spring(&mut springs, "bc", "b", "c", false).unwrap();

        let mut detached = particles.remove_particle(&mut springs, "b").unwrap();
        detached.sort();

        assert_eq!(detached, vec!["ab".to_string(), "bc".to_string()]);
        assert_eq!(particles.len(), 2);
        assert!(springs.is_empty());
        assert_eq!(particles.get("a").unwrap().degree(), 0);
        assert_eq!(particles.get("c").unwrap().degree(), 0);
    }

    #[test]
    fn test_handles_follow_swap_removals() {
        let (mut particles, mut springs) = store();
        for id in ["a", "b", "c", "d", "e"] {
            particles.add_particle(id).unwrap();
        }
        for (edge, from, to) in [
            ("ab", "a", "b"),
            ("bc", "b", "c"),
            ("cd", "c", "d"),
            ("de", "d", "e"),
            ("ea", "e", "a"),
            ("ee", "e", "e"),
        ] {
            particles.attach_spring(&mut springs, edge, from, to, false).unwrap();
        }
        assert_consistent(&particles, &springs);

        particles.detach_spring(&mut springs, "ab").unwrap();
        assert_consistent(&particles, &springs);

        particles.remove_particle(&mut springs, "a").unwrap();
        assert_consistent(&particles, &springs);
        assert!(!springs.contains("ea"));

        particles.remove_particle(&mut springs, "c").unwrap();
        assert_consistent(&particles, &springs);

        let remaining: Vec<&str> = springs.iter().map(|(id, _)| id).collect();
        assert_eq!(remaining.len(), 2);
        assert!(springs.contains("de"));
        assert!(springs.contains("ee"));

        let (d, e) = springs.get("de").unwrap().endpoints();
        assert_eq!(d, particles.key_of("d").unwrap());
        assert_eq!(e, particles.key_of("e").unwrap());
    }

    #[test]
    fn test_attach_errors() {
        let (mut particles, mut springs) = store();
        particles.add_particle("a").unwrap();
        particles.add_particle("b").unwrap();

        let err = particles
            .attach_spring(&mut springs, "ax", "a", "x", false)
            .unwrap_err();
        assert!(matches!(err, LayoutError::MissingEndpoint { ref node_id, .. } if node_id == "x"));

        particles.attach_spring(&mut springs, "ab", "a", "b", false).unwrap();
        let err = particles
            .attach_spring(&mut springs, "ab", "b", "a", true)
            .unwrap_err();
        assert!(matches!(err, LayoutError::DuplicateEdge { .. }));
        assert_eq!(springs.len(), 1);
        assert!(!springs.get("ab").unwrap().is_directed());
        assert_eq!(particles.get("a").unwrap().degree(), 1);
    }

    #[test]
    fn test_step_moves_and_reports() {
        let (mut particles, mut springs) = store();
        particles.add_particle("a").unwrap();
        particles.add_particle("b").unwrap();
        particles.get_mut("a").unwrap().position = Vec3::ZERO;
        particles.get_mut("b").unwrap().position = Vec3::new(3.0, 0.0, 0.0);
        particles.attach_spring(&mut springs, "ab", "a", "b", false).unwrap();

        let mut reported = Vec::new();
        let outcome = particles.step(&springs, &params(), 1e-4, &mut |id: &str, from: Vec3, to: Vec3| {
            reported.push((id.to_string(), from, to));
        });

        assert_eq!(outcome.moved, 2);
        assert_eq!(reported.len(), 2);
        assert!(outcome.energy > 0.0);
        assert!(outcome.max_move >= outcome.avg_move);

        let a = particles.get("a").unwrap().position();
        let b = particles.get("b").unwrap().position();
        assert!(a.x > 0.0);
        assert!(b.x < 3.0);
        assert!((a.x + (b.x - 3.0)).abs() < 1e-5);
    }

    #[test]
    fn test_frozen_particle_stays_put() {
        let (mut particles, mut springs) = store();
        particles.add_particle("a").unwrap();
        particles.add_particle("b").unwrap();
        {
            let a = particles.get_mut("a").unwrap();
            a.position = Vec3::ZERO;
            a.frozen = true;
        }
        particles.get_mut("b").unwrap().position = Vec3::new(3.0, 0.0, 0.0);
        particles.attach_spring(&mut springs, "ab", "a", "b", false).unwrap();

        for _ in 0..10 {
            particles.step(&springs, &params(), 1e-4, &mut |_: &str, _: Vec3, _: Vec3| {});
        }

        assert_eq!(particles.get("a").unwrap().position(), Vec3::ZERO);
        assert_eq!(particles.get("a").unwrap().force(), Vec3::ZERO);
        assert!(particles.get("b").unwrap().position().x < 3.0);
    }

    #[test]
    fn test_moves_under_threshold_are_applied_silently() {
        let (mut particles, mut springs) = store();
        particles.add_particle("a").unwrap();
        particles.add_particle("b").unwrap();
        particles.get_mut("a").unwrap().position = Vec3::ZERO;
        particles.get_mut("b").unwrap().position = Vec3::new(3.0, 0.0, 0.0);
        particles.attach_spring(&mut springs, "ab", "a", "b", false).unwrap();
        let params = ForceParams {
            force: 0.001,
            ..params()
        };

        let mut reported = 0;
        let outcome = particles.step(&springs, &params, 1.0, &mut |_: &str, _: Vec3, _: Vec3| {
            reported += 1
        });

        assert_eq!(reported, 0);
        assert_eq!(outcome.moved, 0);
        assert_eq!(outcome.max_move, 0.0);
        assert!(outcome.energy > 0.2);

        let b = particles.get("b").unwrap();
        assert!(b.position().x < 3.0);
        assert!((b.position().x - (3.0 + b.displacement().x)).abs() < 1e-6);
        assert!(particles.get("a").unwrap().position().x > 0.0);
    }

    #[test]
    fn test_clear_drops_everything() {
        let (mut particles, mut springs) = store();
        particles.add_particle("a").unwrap();
        particles.add_particle("b").unwrap();
        particles.attach_spring(&mut springs, "ab", "a", "b", false).unwrap();
        particles.step(&springs, &params(), 1e-4, &mut |_: &str, _: Vec3, _: Vec3| {});

        particles.clear();
        springs.clear();

        assert!(particles.is_empty());
        assert!(particles.tree().is_empty());
        particles.add_particle("a").unwrap();
        assert_eq!(particles.key_of("a"), Some(ParticleKey(0)));
    }
}
