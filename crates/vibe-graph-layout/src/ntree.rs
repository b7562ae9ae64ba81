//! Barnes-Hut n-tree: a quad-tree in 2D, an octree in 3D.
//!
//! The tree recursively subdivides a square (cubic) region and caches the
//! barycenter of every cell. Cells far enough from a query point stand in
//! for all the particles they contain, which turns the O(n²) pairwise
//! repulsion into something close to O(n log n).
//!
//! The tree is rebuilt from scratch every step. Its arena, entry table and
//! ordering buffer are kept between rebuilds, and queries run on a caller
//! supplied stack, so a steady-state step does not allocate.

use glam::Vec3;

use crate::config::Dimensions;

/// Half-thickness of the region along `z` in 2D.
const FLAT_Z: f32 = 0.01;

/// Minimum padding around the particles when fitting the root region.
const MIN_PADDING: f32 = 1.0;

/// Weights whose sum is below this are treated as zero.
const WEIGHT_EPSILON: f32 = 1e-9;

/// Center of mass and total weight of the particles under a cell.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Barycenter {
    /// Weighted centroid.
    pub center: Vec3,
    /// Sum of particle weights.
    pub weight: f32,
    /// Number of particles.
    pub count: usize,
}

/// An axis-aligned box.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Region {
    pub lo: Vec3,
    pub hi: Vec3,
}

impl Region {
    pub fn new(lo: Vec3, hi: Vec3) -> Self {
        Self { lo, hi }
    }

    /// The default region before any particle was seen.
    fn unit(dimensions: Dimensions) -> Self {
        match dimensions {
            Dimensions::Two => Self::new(Vec3::new(-1.0, -1.0, -FLAT_Z), Vec3::new(1.0, 1.0, FLAT_Z)),
            Dimensions::Three => Self::new(Vec3::splat(-1.0), Vec3::splat(1.0)),
        }
    }

    /// Side length. Regions built by the tree are square in x/y (cubic in 3D).
    pub fn size(&self) -> f32 {
        self.hi.x - self.lo.x
    }

    pub fn center(&self) -> Vec3 {
        (self.lo + self.hi) * 0.5
    }

    /// Length of the diagonal between the lowest and the highest corner.
    pub fn diagonal(&self) -> f32 {
        self.lo.distance(self.hi)
    }

    /// Inclusive containment test.
    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.lo).all() && point.cmple(self.hi).all()
    }

    /// Euclidean distance from `point` to the closest point of the box (0 inside).
    pub fn distance_to(&self, point: Vec3) -> f32 {
        let outside = (self.lo - point).max(point - self.hi).max(Vec3::ZERO);
        outside.length()
    }

    /// Which child a point falls in: bit 0 is x, bit 1 is y, bit 2 is z (3D only).
    fn child_index(&self, point: Vec3, dimensions: Dimensions) -> usize {
        let mid = self.center();
        let mut index = 0;
        if point.x >= mid.x {
            index |= 1;
        }
        if point.y >= mid.y {
            index |= 2;
        }
        if dimensions.is_3d() && point.z >= mid.z {
            index |= 4;
        }
        index
    }

    fn child(&self, index: usize, dimensions: Dimensions) -> Region {
        let mid = self.center();
        let pick = |bit: usize, lo: f32, mid: f32, hi: f32| {
            if index & bit != 0 {
                (mid, hi)
            } else {
                (lo, mid)
            }
        };

        let (lx, hx) = pick(1, self.lo.x, mid.x, self.hi.x);
        let (ly, hy) = pick(2, self.lo.y, mid.y, self.hi.y);
        let (lz, hz) = if dimensions.is_3d() {
            pick(4, self.lo.z, mid.z, self.hi.z)
        } else {
            (self.lo.z, self.hi.z)
        };

        Region::new(Vec3::new(lx, ly, lz), Vec3::new(hx, hy, hz))
    }

    /// Smallest square (cubic) region around `points`, padded.
    fn fit(points: impl Iterator<Item = Vec3>, dimensions: Dimensions) -> Option<Self> {
        let (min, max) = points.fold(None, |acc: Option<(Vec3, Vec3)>, p| match acc {
            None => Some((p, p)),
            Some((min, max)) => Some((min.min(p), max.max(p))),
        })?;

        let extent = match dimensions {
            Dimensions::Two => (max.x - min.x).max(max.y - min.y),
            Dimensions::Three => (max - min).max_element(),
        };
        let half = extent * 0.5 + (extent * 0.1).max(MIN_PADDING);
        let center = (min + max) * 0.5;

        Some(match dimensions {
            Dimensions::Two => Region::new(
                Vec3::new(center.x - half, center.y - half, -FLAT_Z),
                Vec3::new(center.x + half, center.y + half, FLAT_Z),
            ),
            Dimensions::Three => Region::new(center - Vec3::splat(half), center + Vec3::splat(half)),
        })
    }
}

/// Leaf or branch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CellKind {
    /// Particles `order[start..end]` live in this cell.
    Leaf { start: usize, end: usize },
    /// Children occupy `cells[first_child..first_child + fanout]`.
    Branch { first_child: usize },
}

/// One cell of the tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    pub region: Region,
    pub depth: usize,
    pub barycenter: Barycenter,
    pub kind: CellKind,
}

impl Cell {
    const EMPTY: Cell = Cell {
        region: Region {
            lo: Vec3::ZERO,
            hi: Vec3::ZERO,
        },
        depth: 0,
        barycenter: Barycenter {
            center: Vec3::ZERO,
            weight: 0.0,
            count: 0,
        },
        kind: CellKind::Leaf { start: 0, end: 0 },
    };

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, CellKind::Leaf { .. })
    }

    pub fn is_empty(&self) -> bool {
        self.barycenter.count == 0
    }
}

/// A weighted point indexed by the tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entry {
    pub position: Vec3,
    pub weight: f32,
}

/// Barnes-Hut opening criterion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Opening {
    /// Ratio `cell size / distance` below which a cell may be approximated.
    pub theta: f32,
    /// Cells closer than this are always expanded. `None` expands everything.
    pub view_zone: Option<f32>,
}

impl Opening {
    /// Never approximate: every particle is visited individually.
    pub fn exhaustive() -> Self {
        Self {
            theta: 0.0,
            view_zone: None,
        }
    }

    /// Whether `cell` may stand in for its particles as seen from `point`.
    ///
    /// A cell containing the point is always expanded, so a particle never
    /// meets its own contribution folded into an aggregate.
    pub fn can_approximate(&self, cell: &Cell, point: Vec3) -> bool {
        let Some(view_zone) = self.view_zone else {
            return false;
        };
        if cell.region.contains(point) || cell.region.distance_to(point) <= view_zone {
            return false;
        }

        let distance = point.distance(cell.barycenter.center);
        distance > 0.0 && cell.region.size() / distance < self.theta
    }
}

/// What a query yields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Visit {
    /// One indexed particle, by its rebuild index.
    Particle {
        index: usize,
        position: Vec3,
        weight: f32,
    },
    /// A whole cell collapsed onto its barycenter.
    Aggregate(Barycenter),
}

/// The n-tree.
#[derive(Debug)]
pub struct NTree {
    dimensions: Dimensions,
    nodes_per_cell: usize,
    max_depth: usize,
    region: Region,
    cells: Vec<Cell>,
    entries: Vec<Entry>,
    order: Vec<usize>,
}

impl NTree {
    /// Create an empty tree.
    ///
    /// # Arguments
    /// * `nodes_per_cell` - particles a cell holds before subdividing
    /// * `max_depth` - subdivision bound (coincident particles share a leaf past it)
    pub fn new(dimensions: Dimensions, nodes_per_cell: usize, max_depth: usize) -> Self {
        let region = Region::unit(dimensions);
        let mut root = Cell::EMPTY;
        root.region = region;
        root.barycenter.center = region.center();

        Self {
            dimensions,
            nodes_per_cell: nodes_per_cell.max(1),
            max_depth,
            region,
            cells: vec![root],
            entries: Vec::new(),
            order: Vec::new(),
        }
    }

    /// Rebuild the whole tree from `entries`.
    ///
    /// Entry `i` of the iterator is reported back as `Visit::Particle { index: i, .. }`.
    /// The root region is refitted around the new positions first.
    pub fn rebuild(&mut self, entries: impl IntoIterator<Item = Entry>) {
        self.entries.clear();
        self.entries.extend(entries);
        self.order.clear();
        self.order.extend(0..self.entries.len());
        self.cells.clear();

        if let Some(region) = Region::fit(self.entries.iter().map(|e| e.position), self.dimensions)
        {
            self.region = region;
        }

        self.cells.push(Cell::EMPTY);
        let count = self.entries.len();
        self.build_cell(0, self.region, 0, count, 0);
    }

    fn build_cell(&mut self, slot: usize, region: Region, start: usize, end: usize, depth: usize) {
        let barycenter = self.barycenter_of(start, end, region);
        let subdivide = end - start > self.nodes_per_cell && depth < self.max_depth;

        if !subdivide {
            self.cells[slot] = Cell {
                region,
                depth,
                barycenter,
                kind: CellKind::Leaf { start, end },
            };
            return;
        }

        let dimensions = self.dimensions;
        let entries = &self.entries;
        self.order[start..end]
            .sort_unstable_by_key(|&i| region.child_index(entries[i].position, dimensions));

        let first_child = self.cells.len();
        self.cells
            .extend(std::iter::repeat(Cell::EMPTY).take(dimensions.fanout()));
        self.cells[slot] = Cell {
            region,
            depth,
            barycenter,
            kind: CellKind::Branch { first_child },
        };

        let mut cursor = start;
        for child in 0..dimensions.fanout() {
            let child_end = {
                let entries = &self.entries;
                cursor
                    + self.order[cursor..end]
                        .iter()
                        .take_while(|&&i| region.child_index(entries[i].position, dimensions) == child)
                        .count()
            };
            self.build_cell(
                first_child + child,
                region.child(child, dimensions),
                cursor,
                child_end,
                depth + 1,
            );
            cursor = child_end;
        }
    }

    fn barycenter_of(&self, start: usize, end: usize, region: Region) -> Barycenter {
        let members = &self.order[start..end];
        if members.is_empty() {
            return Barycenter {
                center: region.center(),
                weight: 0.0,
                count: 0,
            };
        }

        let (weight, weighted, sum) = members.iter().fold(
            (0.0f32, Vec3::ZERO, Vec3::ZERO),
            |(weight, weighted, sum), &i| {
                let entry = &self.entries[i];
                (
                    weight + entry.weight,
                    weighted + entry.position * entry.weight,
                    sum + entry.position,
                )
            },
        );

        let center = if weight.abs() > WEIGHT_EPSILON {
            weighted / weight
        } else {
            sum / members.len() as f32
        };

        Barycenter {
            center,
            weight,
            count: members.len(),
        }
    }

    /// Drop every entry and shrink back to the initial region.
    pub fn clear(&mut self) {
        *self = Self::new(self.dimensions, self.nodes_per_cell, self.max_depth);
    }

    /// Depth-first traversal from the root as seen from `point`.
    ///
    /// `stack` is scratch space for the traversal; its contents are replaced.
    pub fn query<'a>(
        &'a self,
        point: Vec3,
        opening: Opening,
        stack: &'a mut Vec<usize>,
    ) -> Query<'a> {
        stack.clear();
        stack.push(0);
        Query {
            tree: self,
            point,
            opening,
            stack,
            leaf: Default::default(),
        }
    }

    /// The root cell.
    pub fn root(&self) -> &Cell {
        &self.cells[0]
    }

    /// All cells, root first.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Region covered by the root.
    pub fn region(&self) -> Region {
        self.region
    }

    pub fn lowest_point(&self) -> Vec3 {
        self.region.lo
    }

    pub fn highest_point(&self) -> Vec3 {
        self.region.hi
    }

    /// Number of indexed particles.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deepest cell level present.
    pub fn depth(&self) -> usize {
        self.cells.iter().map(|c| c.depth).max().unwrap_or(0)
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }
}

/// Iterator returned by [`NTree::query`].
pub struct Query<'a> {
    tree: &'a NTree,
    point: Vec3,
    opening: Opening,
    stack: &'a mut Vec<usize>,
    leaf: std::slice::Iter<'a, usize>,
}

impl Iterator for Query<'_> {
    type Item = Visit;

    fn next(&mut self) -> Option<Visit> {
        loop {
            if let Some(&index) = self.leaf.next() {
                let entry = self.tree.entries[index];
                return Some(Visit::Particle {
                    index,
                    position: entry.position,
                    weight: entry.weight,
                });
            }

            let cell = &self.tree.cells[self.stack.pop()?];
            if cell.is_empty() {
                continue;
            }
            if self.opening.can_approximate(cell, self.point) {
                return Some(Visit::Aggregate(cell.barycenter));
            }

            match cell.kind {
                CellKind::Leaf { start, end } => {
                    self.leaf = self.tree.order[start..end].iter();
                }
                CellKind::Branch { first_child } => {
                    let fanout = self.tree.dimensions.fanout();
                    self.stack.extend((first_child..first_child + fanout).rev());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(x: f32, y: f32) -> Entry {
        Entry {
            position: Vec3::new(x, y, 0.0),
            weight: 1.0,
        }
    }

    fn grid(side: usize, spacing: f32) -> Vec<Entry> {
        (0..side * side)
            .map(|i| entry((i % side) as f32 * spacing, (i / side) as f32 * spacing))
            .collect()
    }

    fn visited_weight(tree: &NTree, point: Vec3, opening: Opening) -> f32 {
        let mut stack = Vec::new();
        tree.query(point, opening, &mut stack)
            .map(|visit| match visit {
                Visit::Particle { weight, .. } => weight,
                Visit::Aggregate(bary) => bary.weight,
            })
            .sum()
    }

    #[test]
    fn test_empty_tree() {
        let mut tree = NTree::new(Dimensions::Two, 10, 20);
        tree.rebuild(Vec::<Entry>::new());

        assert_eq!(tree.cells().len(), 1);
        assert!(tree.root().is_empty());
        assert_eq!(tree.query(Vec3::ZERO, Opening::exhaustive(), &mut Vec::new()).count(), 0);
    }

    #[test]
    fn test_single_particle() {
        let mut tree = NTree::new(Dimensions::Two, 10, 20);
        tree.rebuild(vec![entry(3.0, 4.0)]);

        assert!(tree.root().is_leaf());
        assert_eq!(tree.root().barycenter.weight, 1.0);
        assert_eq!(tree.root().barycenter.center, Vec3::new(3.0, 4.0, 0.0));
        assert!(tree.region().contains(Vec3::new(3.0, 4.0, 0.0)));
    }

    #[test]
    fn test_subdivides_past_threshold() {
        let mut tree = NTree::new(Dimensions::Two, 4, 20);
        tree.rebuild(grid(4, 1.0));

        assert!(!tree.root().is_leaf());
        assert_eq!(tree.root().barycenter.count, 16);
        for cell in tree.cells().iter().filter(|c| c.is_leaf()) {
            assert!(cell.barycenter.count <= 4);
        }
    }

    #[test]
    fn test_octree_fanout() {
        let mut tree = NTree::new(Dimensions::Three, 1, 20);
        let corners: Vec<Entry> = (0..8)
            .map(|i| Entry {
                position: Vec3::new((i & 1) as f32, ((i >> 1) & 1) as f32, ((i >> 2) & 1) as f32),
                weight: 1.0,
            })
            .collect();
        tree.rebuild(corners);

        assert_eq!(tree.cells().len(), 9);
        assert!(tree.cells()[1..].iter().all(|c| c.barycenter.count == 1));
    }

    #[test]
    fn test_barycenter_is_weighted() {
        let mut tree = NTree::new(Dimensions::Two, 10, 20);
        tree.rebuild(vec![
            Entry {
                position: Vec3::new(0.0, 0.0, 0.0),
                weight: 3.0,
            },
            Entry {
                position: Vec3::new(4.0, 0.0, 0.0),
                weight: 1.0,
            },
        ]);

        let bary = tree.root().barycenter;
        assert_eq!(bary.weight, 4.0);
        assert!((bary.center.x - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_coincident_particles_respect_depth_bound() {
        let mut tree = NTree::new(Dimensions::Two, 1, 8);
        tree.rebuild(vec![entry(1.0, 1.0); 50]);

        assert!(tree.depth() <= 8);
        assert_eq!(tree.root().barycenter.count, 50);
        assert_eq!(
            tree.query(Vec3::new(1.0, 1.0, 0.0), Opening::exhaustive(), &mut Vec::new())
                .count(),
            50
        );
    }

    #[test]
    fn test_exhaustive_query_visits_every_particle() {
        let mut tree = NTree::new(Dimensions::Two, 2, 20);
        tree.rebuild(grid(5, 1.0));

        let mut seen: Vec<usize> = tree
            .query(Vec3::ZERO, Opening::exhaustive(), &mut Vec::new())
            .map(|visit| match visit {
                Visit::Particle { index, .. } => index,
                Visit::Aggregate(_) => panic!("exhaustive query must not aggregate"),
            })
            .collect();
        seen.sort_unstable();

        assert_eq!(seen, (0..25).collect::<Vec<_>>());
    }

    #[test]
    fn test_far_cells_are_aggregated() {
        let mut tree = NTree::new(Dimensions::Two, 2, 20);
        let mut entries = grid(4, 0.1);
        entries.push(entry(100.0, 100.0));
        tree.rebuild(entries);

        let opening = Opening {
            theta: 0.7,
            view_zone: Some(1.0),
        };
        let mut stack = Vec::new();
        let visits: Vec<Visit> = tree
            .query(Vec3::new(100.0, 100.0, 0.0), opening, &mut stack)
            .collect();

        assert!(visits.iter().any(|v| matches!(v, Visit::Aggregate(_))));
        assert!(visits.len() < 17);
    }

    #[test]
    fn test_query_stack_is_reusable() {
        let mut tree = NTree::new(Dimensions::Two, 2, 20);
        tree.rebuild(grid(5, 1.0));

        // Leftovers from an abandoned traversal.
        let mut stack = vec![7, 7, 7];
        for point in [Vec3::ZERO, Vec3::new(4.0, 4.0, 0.0), Vec3::new(2.0, 1.0, 0.0)] {
            let count = tree.query(point, Opening::exhaustive(), &mut stack).count();
            assert_eq!(count, 25);
        }

        let mut partial = tree.query(Vec3::ZERO, Opening::exhaustive(), &mut stack);
        partial.next();
        drop(partial);
        assert_eq!(
            tree.query(Vec3::ZERO, Opening::exhaustive(), &mut stack).count(),
            25
        );
    }

    #[test]
    fn test_query_accounts_for_all_weight_once() {
        let mut tree = NTree::new(Dimensions::Two, 3, 20);
        tree.rebuild(grid(8, 1.5));

        let opening = Opening {
            theta: 0.9,
            view_zone: Some(1.0),
        };
        for point in [Vec3::ZERO, Vec3::new(5.0, 7.5, 0.0), Vec3::new(30.0, -4.0, 0.0)] {
            assert!((visited_weight(&tree, point, opening) - 64.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_containing_cell_is_never_approximated() {
        let mut tree = NTree::new(Dimensions::Two, 10, 20);
        tree.rebuild(grid(3, 1.0));

        let opening = Opening {
            theta: 100.0,
            view_zone: Some(0.0),
        };
        assert!(!opening.can_approximate(tree.root(), Vec3::new(1.0, 1.0, 0.0)));
    }

    #[test]
    fn test_region_refits_to_moving_particles() {
        let mut tree = NTree::new(Dimensions::Two, 10, 20);
        tree.rebuild(vec![entry(0.0, 0.0)]);
        tree.rebuild(vec![entry(0.0, 0.0), entry(50.0, -20.0)]);

        assert!(tree.region().contains(Vec3::new(50.0, -20.0, 0.0)));
        assert!(tree.region().diagonal() > 50.0);
    }

    #[test]
    fn test_clear_restores_initial_region() {
        let mut tree = NTree::new(Dimensions::Two, 10, 20);
        let initial = tree.region();
        tree.rebuild(grid(4, 10.0));
        assert_ne!(tree.region(), initial);

        tree.clear();
        assert!(tree.is_empty());
        assert_eq!(tree.region(), initial);
        assert_eq!(tree.cells().len(), 1);
    }
}
