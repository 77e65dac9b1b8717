//! Nested regular grids over the reconstruction cube.
//!
//! Level 0 is dense. Finer levels only hold nodes around cells containing samples; every other
//! node value is interpolated from the next coarser level.

use std::collections::{HashMap, HashSet};

use glam::DVec3;

/// Integer coordinates of a grid node at some level.
pub(crate) type NodeKey = [u32; 3];

/// Integer coordinates of a grid cell; the cell spans nodes `key .. key + 1`.
pub(crate) type CellKey = [u32; 3];

/// An oriented sample of the surface.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Sample {
    pub position: DVec3,
    pub normal: DVec3,
}

/// Axis aligned cube enclosing the samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Cube {
    pub origin: DVec3,
    pub size: f64,
}

impl Cube {
    /// Cube centred on the box `lo .. hi` with side `scale` times its largest extent.
    pub fn enclosing(lo: DVec3, hi: DVec3, scale: f64) -> Self {
        let center = 0.5 * (lo + hi);
        let size = (hi - lo).max_element() * scale;
        Self {
            origin: center - DVec3::splat(0.5 * size),
            size,
        }
    }

    /// Side of a cell at `depth`.
    pub fn cell_size(&self, depth: u32) -> f64 {
        self.size / (1u64 << depth) as f64
    }
}

/// One level of the grid hierarchy.
#[derive(Debug, Clone)]
pub(crate) struct Level {
    pub depth: u32,
    /// Cells per axis.
    pub res: u32,
    pub h: f64,
    /// Cells carrying unknowns, `None` when the level is dense.
    pub band: Option<HashSet<CellKey>>,
    /// Solved node values.
    pub values: HashMap<NodeKey, f64>,
}

impl Level {
    /// A level whose interior nodes are all unknowns.
    pub fn dense(cube: &Cube, depth: u32) -> Self {
        Self {
            depth,
            res: 1 << depth,
            h: cube.cell_size(depth),
            band: None,
            values: HashMap::new(),
        }
    }

    /// A level restricted to cells within `width` cells of a sample.
    pub fn banded(cube: &Cube, depth: u32, samples: &[Sample], width: u32) -> Self {
        let mut level = Self::dense(cube, depth);
        let res = level.res as i64;
        let w = width as i64;

        let mut band = HashSet::new();
        let mut seeds: Vec<CellKey> = samples
            .iter()
            .map(|s| level.cell_of(cube, s.position))
            .collect();
        seeds.sort_unstable();
        seeds.dedup();

        for c in seeds {
            let lo = c.map(|v| (v as i64 - w).max(0));
            let hi = c.map(|v| (v as i64 + w).min(res - 1));
            for z in lo[2]..=hi[2] {
                for y in lo[1]..=hi[1] {
                    for x in lo[0]..=hi[0] {
                        band.insert([x as u32, y as u32, z as u32]);
                    }
                }
            }
        }

        level.band = Some(band);
        level
    }

    /// Continuous node coordinates of a point.
    pub fn to_grid(&self, cube: &Cube, p: DVec3) -> DVec3 {
        (p - cube.origin) / self.h
    }

    /// Cell containing a point, clamped to the grid.
    pub fn cell_of(&self, cube: &Cube, p: DVec3) -> CellKey {
        let g = self.to_grid(cube, p);
        let max = (self.res - 1) as f64;
        [g.x, g.y, g.z].map(|v| v.floor().clamp(0.0, max) as u32)
    }

    /// World position of a node.
    pub fn node_position(&self, cube: &Cube, key: NodeKey) -> DVec3 {
        cube.origin + DVec3::new(key[0] as f64, key[1] as f64, key[2] as f64) * self.h
    }

    /// Whether a node lies on the cube faces.
    pub fn is_boundary(&self, key: NodeKey) -> bool {
        key.iter().any(|&c| c == 0 || c >= self.res)
    }

    /// Whether the level carries unknowns in `cell`.
    pub fn has_cell(&self, cell: CellKey) -> bool {
        match &self.band {
            Some(band) => band.contains(&cell),
            None => cell.iter().all(|&c| c < self.res),
        }
    }

    /// Interior nodes solved at this level, sorted.
    pub fn active_nodes(&self) -> Vec<NodeKey> {
        let mut nodes = Vec::new();
        match &self.band {
            None => {
                for z in 1..self.res {
                    for y in 1..self.res {
                        for x in 1..self.res {
                            nodes.push([x, y, z]);
                        }
                    }
                }
            }
            Some(band) => {
                for cell in band {
                    for corner in 0..8u32 {
                        let key = corner_key(*cell, corner);
                        if !self.is_boundary(key) {
                            nodes.push(key);
                        }
                    }
                }
                nodes.sort_unstable();
                nodes.dedup();
            }
        }
        nodes
    }
}

/// Node at corner `bits` of a cell, with bit 0 along x, bit 1 along y and bit 2 along z.
#[inline]
pub(crate) fn corner_key(cell: CellKey, bits: u32) -> NodeKey {
    [
        cell[0] + (bits & 1),
        cell[1] + ((bits >> 1) & 1),
        cell[2] + ((bits >> 2) & 1),
    ]
}

/// Quadratic B-spline weights of the nodes at offsets -1, 0 and +1 for a fractional offset `d`
/// in `[-0.5, 0.5]` from the nearest node.
#[inline]
pub(crate) fn bspline_weights(d: f64) -> [f64; 3] {
    [
        0.5 * (0.5 - d) * (0.5 - d),
        0.75 - d * d,
        0.5 * (0.5 + d) * (0.5 + d),
    ]
}

/// Splat the inward normals of the samples onto the nodes of a level as a vector density.
pub(crate) fn splat_normals(
    cube: &Cube,
    level: &Level,
    samples: &[Sample],
) -> HashMap<NodeKey, DVec3> {
    let mut field: HashMap<NodeKey, DVec3> = HashMap::new();
    let inv_volume = 1.0 / (level.h * level.h * level.h);
    let res = level.res as i64;

    for s in samples {
        let g = level.to_grid(cube, s.position);
        let nearest = [g.x.round(), g.y.round(), g.z.round()];
        let w = [
            bspline_weights(g.x - nearest[0]),
            bspline_weights(g.y - nearest[1]),
            bspline_weights(g.z - nearest[2]),
        ];
        let v = -s.normal * inv_volume;

        for (dz, wz) in w[2].iter().enumerate() {
            for (dy, wy) in w[1].iter().enumerate() {
                for (dx, wx) in w[0].iter().enumerate() {
                    let key = [
                        nearest[0] as i64 + dx as i64 - 1,
                        nearest[1] as i64 + dy as i64 - 1,
                        nearest[2] as i64 + dz as i64 - 1,
                    ];
                    if key.iter().any(|&c| c < 0 || c > res) {
                        continue;
                    }
                    let key = key.map(|c| c as u32);
                    *field.entry(key).or_insert(DVec3::ZERO) += v * (wx * wy * wz);
                }
            }
        }
    }
    field
}

/// The grid levels, coarsest first.
#[derive(Debug, Clone)]
pub(crate) struct Hierarchy {
    pub cube: Cube,
    pub levels: Vec<Level>,
}

impl Hierarchy {
    /// Value of node `key` at level `li`: the solved value when present, otherwise the
    /// trilinear interpolation of the coarser level. Boundary nodes are zero.
    pub fn value(&self, li: usize, key: NodeKey) -> f64 {
        let level = &self.levels[li];
        if let Some(v) = level.values.get(&key) {
            return *v;
        }
        if li == 0 || level.is_boundary(key) {
            return 0.0;
        }

        // odd coordinates sit halfway between two coarse nodes
        let parents = key.map(|c| {
            if c % 2 == 0 {
                [(c / 2, 1.0), (c / 2, 0.0)]
            } else {
                [(c / 2, 0.5), (c / 2 + 1, 0.5)]
            }
        });

        let mut acc = 0.0;
        for (z, wz) in parents[2] {
            if wz == 0.0 {
                continue;
            }
            for (y, wy) in parents[1] {
                if wy == 0.0 {
                    continue;
                }
                for (x, wx) in parents[0] {
                    if wx == 0.0 {
                        continue;
                    }
                    acc += wx * wy * wz * self.value(li - 1, [x, y, z]);
                }
            }
        }
        acc
    }

    /// Trilinear interpolation of the finest level at a point.
    pub fn value_at(&self, p: DVec3) -> f64 {
        let li = self.levels.len() - 1;
        let level = &self.levels[li];
        let cell = level.cell_of(&self.cube, p);
        let g = level.to_grid(&self.cube, p);
        let f = DVec3::new(
            (g.x - cell[0] as f64).clamp(0.0, 1.0),
            (g.y - cell[1] as f64).clamp(0.0, 1.0),
            (g.z - cell[2] as f64).clamp(0.0, 1.0),
        );

        let mut acc = 0.0;
        for bits in 0..8u32 {
            let wx = if bits & 1 == 1 { f.x } else { 1.0 - f.x };
            let wy = if (bits >> 1) & 1 == 1 { f.y } else { 1.0 - f.y };
            let wz = if (bits >> 2) & 1 == 1 { f.z } else { 1.0 - f.z };
            let w = wx * wy * wz;
            if w > 0.0 {
                acc += w * self.value(li, corner_key(cell, bits));
            }
        }
        acc
    }

    /// Depth of the finest level.
    pub fn max_depth(&self) -> u32 {
        self.levels.last().map_or(0, |l| l.depth)
    }
}
