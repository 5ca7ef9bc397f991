//! Uniform spatial grid for neighbour queries.
//!
//! The grid is laid over the bounding box of the simulation volume and
//! rebuilt from scratch every step as a counting sort:
//!
//! 1. reset every cell counter,
//! 2. assign each active particle to a cell and atomically bump that cell's
//!    counter (parallel, one lane per particle),
//! 3. exclusive prefix sum of the counters into bucket offsets (single lane),
//! 4. scatter particle indices into a cell-sorted array at their bucket
//!    offset.
//!
//! After step 4 every cell's members are contiguous, so
//! [`SpatialGrid::cell_members`] is a plain slice.

use crate::particle::Particle;
use glam::{UVec3, Vec3};
use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};

/// Grid entry for particles that are not in any cell.
const NO_CELL: u32 = u32::MAX;

/// Geometry of a uniform grid: cell size and per-axis cell counts.
///
/// Also used by the LOD aggregator for its coarse per-level grids.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridLayout {
    /// Size of each cell in world units
    pub cell_size: f32,
    /// Half size of the covered volume (grid spans `-half_bounds..half_bounds`)
    pub half_bounds: Vec3,
    /// Number of cells along each axis, each at least 1
    pub dims: UVec3,
}

impl GridLayout {
    pub fn new(half_bounds: Vec3, cell_size: f32) -> Self {
        let cells = (half_bounds * 2.0 / cell_size).ceil();
        let dims = UVec3::new(
            (cells.x as u32).max(1),
            (cells.y as u32).max(1),
            (cells.z as u32).max(1),
        );
        Self {
            cell_size,
            half_bounds,
            dims,
        }
    }

    /// Total number of cells in the grid
    #[inline]
    pub fn total_cells(&self) -> usize {
        self.dims.x as usize * self.dims.y as usize * self.dims.z as usize
    }

    /// Convert a world position to cell coordinates, clamped into the grid.
    #[inline]
    pub fn cell_coords(&self, position: Vec3) -> UVec3 {
        let cell = ((position + self.half_bounds) / self.cell_size).floor();
        let max = self.dims - UVec3::ONE;
        UVec3::new(
            (cell.x.max(0.0) as u32).min(max.x),
            (cell.y.max(0.0) as u32).min(max.y),
            (cell.z.max(0.0) as u32).min(max.z),
        )
    }

    /// Linear cell index: `x + y * sx + z * sx * sy`.
    #[inline]
    pub fn linear_index(&self, coords: UVec3) -> usize {
        let sx = self.dims.x as usize;
        let sy = self.dims.y as usize;
        coords.x as usize + coords.y as usize * sx + coords.z as usize * sx * sy
    }

    /// Inverse of [`linear_index`](Self::linear_index).
    #[inline]
    pub fn coords_of(&self, index: usize) -> UVec3 {
        let sx = self.dims.x as usize;
        let sy = self.dims.y as usize;
        UVec3::new(
            (index % sx) as u32,
            ((index / sx) % sy) as u32,
            (index / (sx * sy)) as u32,
        )
    }

    #[inline]
    pub fn cell_index(&self, position: Vec3) -> usize {
        self.linear_index(self.cell_coords(position))
    }

    /// World-space centre of a cell.
    #[inline]
    pub fn cell_center(&self, coords: UVec3) -> Vec3 {
        (coords.as_vec3() + Vec3::splat(0.5)) * self.cell_size - self.half_bounds
    }

    /// Linear indices of every cell within `radius` cells of `center` on each
    /// axis, clipped to the grid. With `radius = 1` this is the cell and its
    /// 26 neighbours.
    pub fn neighbor_cells(&self, center: UVec3, radius: u32) -> impl Iterator<Item = usize> {
        let layout = *self;
        let lo = UVec3::new(
            center.x.saturating_sub(radius),
            center.y.saturating_sub(radius),
            center.z.saturating_sub(radius),
        );
        let hi = (center + UVec3::splat(radius)).min(self.dims - UVec3::ONE);
        (lo.z..=hi.z).flat_map(move |z| {
            (lo.y..=hi.y).flat_map(move |y| {
                (lo.x..=hi.x).map(move |x| layout.linear_index(UVec3::new(x, y, z)))
            })
        })
    }
}

/// Spatial grid rebuilt each step from particle positions.
#[derive(Debug)]
pub struct SpatialGrid {
    layout: GridLayout,
    /// Live member count per cell.
    counts: Vec<AtomicU32>,
    /// Exclusive prefix sum of `counts`.
    offsets: Vec<u32>,
    /// Per-particle cell index, keyed by particle index.
    entries: Vec<u32>,
    /// Particle indices in bucket order.
    sorted: Vec<u32>,
    /// Scatter write cursors.
    cursors: Vec<u32>,
}

impl SpatialGrid {
    pub fn new(half_bounds: Vec3, cell_size: f32) -> Self {
        let layout = GridLayout::new(half_bounds, cell_size);
        let cells = layout.total_cells();
        log::debug!(
            "Spatial grid {}x{}x{} ({} cells, cell size {})",
            layout.dims.x,
            layout.dims.y,
            layout.dims.z,
            cells,
            cell_size
        );
        Self {
            layout,
            counts: (0..cells).map(|_| AtomicU32::new(0)).collect(),
            offsets: vec![0; cells],
            entries: Vec::new(),
            sorted: Vec::new(),
            cursors: vec![0; cells],
        }
    }

    #[inline]
    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    /// Cells per axis.
    #[inline]
    pub fn dims(&self) -> UVec3 {
        self.layout.dims
    }

    /// Total number of cells.
    #[inline]
    pub fn cell_count(&self) -> usize {
        self.layout.total_cells()
    }

    /// Rebuild the grid from the current particle positions.
    pub fn rebuild(&mut self, particles: &[Particle]) {
        let layout = self.layout;
        let counts = &self.counts;

        // Phase 1: reset counters
        counts.par_iter().for_each(|c| c.store(0, Ordering::Relaxed));

        // Phase 2: assign particles to cells
        self.entries.resize(particles.len(), NO_CELL);
        self.entries
            .par_iter_mut()
            .zip(particles.par_iter())
            .for_each(|(entry, particle)| {
                if !particle.is_active() {
                    *entry = NO_CELL;
                    return;
                }
                let cell = layout.cell_index(particle.position);
                *entry = cell as u32;
                counts[cell].fetch_add(1, Ordering::Relaxed);
            });

        // Phase 3: exclusive prefix sum into bucket offsets
        let mut running = 0u32;
        for (offset, count) in self.offsets.iter_mut().zip(counts.iter()) {
            *offset = running;
            running += count.load(Ordering::Relaxed);
        }

        // Phase 4: scatter into bucket order. Particle-index order keeps bucket
        // contents deterministic.
        self.sorted.clear();
        self.sorted.resize(running as usize, 0);
        self.cursors.copy_from_slice(&self.offsets);
        for (index, &cell) in self.entries.iter().enumerate() {
            if cell == NO_CELL {
                continue;
            }
            let cursor = &mut self.cursors[cell as usize];
            self.sorted[*cursor as usize] = index as u32;
            *cursor += 1;
        }

        log::trace!("Grid rebuilt: {} particles bucketed", running);
    }

    /// Number of particles in a cell after the last rebuild.
    #[inline]
    pub fn count(&self, cell: usize) -> u32 {
        self.counts[cell].load(Ordering::Relaxed)
    }

    /// Start of a cell's bucket in the sorted index array.
    #[inline]
    pub fn offset(&self, cell: usize) -> u32 {
        self.offsets[cell]
    }

    /// Cell a particle was assigned to in the last rebuild.
    #[inline]
    pub fn entry(&self, particle: usize) -> Option<usize> {
        match self.entries.get(particle) {
            Some(&cell) if cell != NO_CELL => Some(cell as usize),
            _ => None,
        }
    }

    /// Indices of the particles in a cell.
    #[inline]
    pub fn cell_members(&self, cell: usize) -> &[u32] {
        let start = self.offsets[cell] as usize;
        let end = start + self.count(cell) as usize;
        &self.sorted[start..end]
    }

    /// Every particle index in bucket order.
    #[inline]
    pub fn sorted_indices(&self) -> &[u32] {
        &self.sorted
    }

    /// Candidate neighbours of `position`: members of every cell within
    /// `radius` cells.
    pub fn query(&self, position: Vec3, radius: u32) -> impl Iterator<Item = u32> + '_ {
        self.layout
            .neighbor_cells(self.layout.cell_coords(position), radius)
            .flat_map(move |cell| self.cell_members(cell).iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_particles(count: usize, half: f32, seed: u64) -> Vec<Particle> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|i| {
                let pos = Vec3::new(
                    rng.gen_range(-half..half),
                    rng.gen_range(-half..half),
                    rng.gen_range(-half..half),
                );
                Particle::new(pos, (i % 3) as u32, 1.0, 0.05)
            })
            .collect()
    }

    #[test]
    fn test_layout_dims() {
        let layout = GridLayout::new(Vec3::new(1.0, 2.0, 0.1), 0.5);
        assert_eq!(layout.dims, UVec3::new(4, 8, 1));
        assert_eq!(layout.total_cells(), 32);
    }

    #[test]
    fn test_cell_center_round_trip() {
        let layout = GridLayout::new(Vec3::splat(5.0), 0.7);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let p = Vec3::new(
                rng.gen_range(-5.0..=5.0),
                rng.gen_range(-5.0..=5.0),
                rng.gen_range(-5.0..=5.0),
            );
            let center = layout.cell_center(layout.cell_coords(p));
            let diff = (center - p).abs();
            assert!(diff.max_element() <= 0.35 + 1e-4, "{:?} -> {:?}", p, center);
        }
        // Exactly on the upper faces
        let corner = Vec3::splat(5.0);
        let center = layout.cell_center(layout.cell_coords(corner));
        assert!((center - corner).abs().max_element() <= 0.35 + 1e-4);
    }

    #[test]
    fn test_linear_index_round_trip() {
        let layout = GridLayout::new(Vec3::new(3.0, 2.0, 1.0), 1.0);
        for index in 0..layout.total_cells() {
            assert_eq!(layout.linear_index(layout.coords_of(index)), index);
        }
    }

    #[test]
    fn test_positions_outside_clamp_into_grid() {
        let layout = GridLayout::new(Vec3::ONE, 0.5);
        assert_eq!(layout.cell_coords(Vec3::splat(-100.0)), UVec3::ZERO);
        assert_eq!(layout.cell_coords(Vec3::splat(100.0)), UVec3::splat(3));
        assert_eq!(layout.cell_coords(Vec3::splat(f32::NAN)), UVec3::ZERO);
    }

    #[test]
    fn test_neighbor_cells_clipped_at_corner() {
        let layout = GridLayout::new(Vec3::splat(2.0), 1.0);
        assert_eq!(layout.neighbor_cells(UVec3::ZERO, 1).count(), 8);
        assert_eq!(layout.neighbor_cells(UVec3::splat(1), 1).count(), 27);
        assert_eq!(layout.neighbor_cells(UVec3::splat(1), 8).count(), 64);
    }

    /// Buckets are built by a full counting sort (count, exclusive scan,
    /// scatter), not by writing entries at the particle's own index. Every
    /// bucket must therefore contain exactly the particles mapped to its cell.
    #[test]
    fn test_buckets_are_counting_sorted() {
        let mut particles = random_particles(2000, 4.0, 11);
        particles[5].type_index = crate::particle::INACTIVE;
        let mut grid = SpatialGrid::new(Vec3::splat(4.0), 0.5);
        grid.rebuild(&particles);

        let mut seen = 0usize;
        let mut expected_offset = 0u32;
        for cell in 0..grid.cell_count() {
            assert_eq!(grid.offset(cell), expected_offset);
            expected_offset += grid.count(cell);
            let members = grid.cell_members(cell);
            assert!(members.windows(2).all(|w| w[0] < w[1]));
            for &i in members {
                assert_eq!(grid.layout().cell_index(particles[i as usize].position), cell);
                assert_eq!(grid.entry(i as usize), Some(cell));
            }
            seen += members.len();
        }
        assert_eq!(seen, 1999);
        assert_eq!(grid.sorted_indices().len(), 1999);
        assert_eq!(grid.entry(5), None);
    }

    #[test]
    fn test_query_finds_all_within_radius() {
        let particles = random_particles(500, 3.0, 3);
        let mut grid = SpatialGrid::new(Vec3::splat(3.0), 0.5);
        grid.rebuild(&particles);

        let probe = particles[0].position;
        let found: Vec<u32> = grid.query(probe, 2).collect();
        for (i, p) in particles.iter().enumerate() {
            if p.position.distance(probe) <= 1.0 {
                assert!(found.contains(&(i as u32)), "missing neighbour {}", i);
            }
        }
    }

    #[test]
    fn test_rebuild_resets_previous_counts() {
        let mut particles = random_particles(100, 1.0, 5);
        let mut grid = SpatialGrid::new(Vec3::ONE, 0.5);
        grid.rebuild(&particles);
        for p in particles.iter_mut().skip(10) {
            p.type_index = crate::particle::INACTIVE;
        }
        grid.rebuild(&particles);
        let total: u32 = (0..grid.cell_count()).map(|c| grid.count(c)).sum();
        assert_eq!(total, 10);
    }
}
