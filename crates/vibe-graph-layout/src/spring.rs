//! Edge springs and the table that owns them.

use std::ops::{Index, IndexMut};

use indexmap::IndexMap;

use crate::error::{LayoutError, LayoutResult};
use crate::particle::ParticleKey;

/// Handle to a spring in a [`SpringTable`].
///
/// Handles are positions in the table. Removing a spring moves the last one
/// into the freed slot, so whoever removes a spring must re-point the
/// handles that referenced the moved one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpringKey(pub(crate) usize);

/// Attraction between the two endpoints of an edge.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeSpring {
    pub(crate) node0: ParticleKey,
    pub(crate) node1: ParticleKey,
    pub(crate) weight: f32,
    pub(crate) ignored: bool,
    pub(crate) directed: bool,
}

impl EdgeSpring {
    pub(crate) fn new(node0: ParticleKey, node1: ParticleKey, directed: bool) -> Self {
        Self {
            node0,
            node1,
            weight: 1.0,
            ignored: false,
            directed,
        }
    }

    /// Multiplier of the optimal distance giving this spring's rest length.
    pub fn weight(&self) -> f32 {
        self.weight
    }

    /// Ignored springs stay registered but exert no force.
    pub fn is_ignored(&self) -> bool {
        self.ignored
    }

    pub fn is_directed(&self) -> bool {
        self.directed
    }

    pub fn endpoints(&self) -> (ParticleKey, ParticleKey) {
        (self.node0, self.node1)
    }

    /// The endpoint that is not `key`.
    pub fn opposite(&self, key: ParticleKey) -> ParticleKey {
        if self.node0 == key {
            self.node1
        } else {
            self.node0
        }
    }

    pub(crate) fn retarget(&mut self, from: ParticleKey, to: ParticleKey) {
        if self.node0 == from {
            self.node0 = to;
        }
        if self.node1 == from {
            self.node1 = to;
        }
    }
}

/// Springs registered under their edge id.
#[derive(Debug, Clone, Default)]
pub struct SpringTable {
    springs: IndexMap<String, EdgeSpring>,
}

impl SpringTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.springs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.springs.is_empty()
    }

    pub fn contains(&self, edge_id: &str) -> bool {
        self.springs.contains_key(edge_id)
    }

    pub fn get(&self, edge_id: &str) -> Option<&EdgeSpring> {
        self.springs.get(edge_id)
    }

    pub fn key_of(&self, edge_id: &str) -> Option<SpringKey> {
        self.springs.get_index_of(edge_id).map(SpringKey)
    }

    /// Edge id of the spring behind `key`.
    pub fn id_of(&self, key: SpringKey) -> Option<&str> {
        self.springs.get_index(key.0).map(|(id, _)| id.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EdgeSpring)> {
        self.springs.iter().map(|(id, spring)| (id.as_str(), spring))
    }

    pub(crate) fn get_mut(&mut self, edge_id: &str) -> LayoutResult<&mut EdgeSpring> {
        self.springs
            .get_mut(edge_id)
            .ok_or_else(|| LayoutError::EdgeNotFound {
                edge_id: edge_id.to_owned(),
            })
    }

    pub(crate) fn insert(&mut self, edge_id: &str, spring: EdgeSpring) -> LayoutResult<SpringKey> {
        if self.springs.contains_key(edge_id) {
            return Err(LayoutError::DuplicateEdge {
                edge_id: edge_id.to_owned(),
            });
        }
        let (index, _) = self.springs.insert_full(edge_id.to_owned(), spring);
        Ok(SpringKey(index))
    }

    /// Remove the spring at `key`.
    ///
    /// Returns the removed spring and, when another spring was moved into
    /// the freed slot, the key it used to have.
    pub(crate) fn swap_remove(&mut self, key: SpringKey) -> Option<(String, EdgeSpring, Option<SpringKey>)> {
        let last = self.springs.len().checked_sub(1)?;
        let (id, spring) = self.springs.swap_remove_index(key.0)?;
        let moved = (key.0 != last).then_some(SpringKey(last));
        Some((id, spring, moved))
    }

    pub(crate) fn clear(&mut self) {
        self.springs.clear();
    }
}

impl Index<SpringKey> for SpringTable {
    type Output = EdgeSpring;

    fn index(&self, key: SpringKey) -> &EdgeSpring {
        &self.springs[key.0]
    }
}

impl IndexMut<SpringKey> for SpringTable {
    fn index_mut(&mut self, key: SpringKey) -> &mut EdgeSpring {
        &mut self.springs[key.0]
    }
}
