use std::collections::HashMap;

use glam::DVec3;

use super::grid::{splat_normals, Hierarchy, NodeKey, Sample};
use super::SurfaceError;
use crate::deadline::Deadline;

/// Conjugate gradient stopping rule.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CgSettings {
    /// Relative residual `|r| / |b|` at which the solve stops.
    pub tolerance: f64,
    pub max_iterations: usize,
}

/// Seven point Laplacian restricted to the unknowns of one level.
struct LaplaceSystem {
    nodes: Vec<NodeKey>,
    neighbors: Vec<[Option<usize>; 6]>,
    rhs: Vec<f64>,
}

impl LaplaceSystem {
    fn apply(&self, x: &[f64], out: &mut [f64]) {
        for (i, nb) in self.neighbors.iter().enumerate() {
            let mut acc = 6.0 * x[i];
            for j in nb.iter().flatten() {
                acc -= x[*j];
            }
            out[i] = acc;
        }
    }
}

const OFFSETS: [[i64; 3]; 6] = [
    [-1, 0, 0],
    [1, 0, 0],
    [0, -1, 0],
    [0, 1, 0],
    [0, 0, -1],
    [0, 0, 1],
];

fn offset(key: NodeKey, d: [i64; 3]) -> NodeKey {
    [
        (key[0] as i64 + d[0]) as u32,
        (key[1] as i64 + d[1]) as u32,
        (key[2] as i64 + d[2]) as u32,
    ]
}

/// Assemble `6 x - sum(neighbours) = -(h / 2) div V` over the unknowns of level `li`.
///
/// Neighbours that are not unknowns contribute their value from the coarser level.
fn assemble(hierarchy: &Hierarchy, li: usize, samples: &[Sample]) -> LaplaceSystem {
    let level = &hierarchy.levels[li];
    let nodes = level.active_nodes();
    let index: HashMap<NodeKey, usize> = nodes.iter().enumerate().map(|(i, k)| (*k, i)).collect();
    let field = splat_normals(&hierarchy.cube, level, samples);
    let v = |key: &NodeKey| field.get(key).copied().unwrap_or(DVec3::ZERO);

    let mut neighbors = Vec::with_capacity(nodes.len());
    let mut rhs = Vec::with_capacity(nodes.len());

    for key in &nodes {
        // central differences of the vector field, one pair of offsets per axis
        let div = (v(&offset(*key, OFFSETS[1])).x - v(&offset(*key, OFFSETS[0])).x)
            + (v(&offset(*key, OFFSETS[3])).y - v(&offset(*key, OFFSETS[2])).y)
            + (v(&offset(*key, OFFSETS[5])).z - v(&offset(*key, OFFSETS[4])).z);
        let mut b = -0.5 * level.h * div;

        let mut nb = [None; 6];
        for (slot, d) in nb.iter_mut().zip(OFFSETS.iter()) {
            let n = offset(*key, *d);
            match index.get(&n) {
                Some(j) => *slot = Some(*j),
                None => b += hierarchy.value(li, n),
            }
        }

        neighbors.push(nb);
        rhs.push(b);
    }

    LaplaceSystem {
        nodes,
        neighbors,
        rhs,
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Conjugate gradients on a symmetric positive definite system, starting from `x`.
///
/// Returns the number of iterations run.
fn conjugate_gradient(
    system: &LaplaceSystem,
    x: &mut [f64],
    settings: &CgSettings,
    deadline: &Deadline,
    depth: u32,
) -> Result<usize, SurfaceError> {
    let n = x.len();
    let b_norm = dot(&system.rhs, &system.rhs).sqrt().max(f64::MIN_POSITIVE);

    let mut ax = vec![0.0; n];
    system.apply(x, &mut ax);
    let mut r: Vec<f64> = system.rhs.iter().zip(ax.iter()).map(|(b, a)| b - a).collect();
    let mut p = r.clone();
    let mut ap = vec![0.0; n];
    let mut rs = dot(&r, &r);

    for it in 0..settings.max_iterations {
        if !rs.is_finite() {
            return Err(SurfaceError::NonFiniteResidual { depth });
        }
        if rs.sqrt() <= settings.tolerance * b_norm {
            return Ok(it);
        }
        if deadline.expired() {
            return Err(SurfaceError::Timeout);
        }

        system.apply(&p, &mut ap);
        let p_ap = dot(&p, &ap);
        if p_ap <= 0.0 || !p_ap.is_finite() {
            return Err(SurfaceError::NonFiniteResidual { depth });
        }
        let alpha = rs / p_ap;
        for i in 0..n {
            x[i] += alpha * p[i];
            r[i] -= alpha * ap[i];
        }

        let rs_next = dot(&r, &r);
        let beta = rs_next / rs;
        for i in 0..n {
            p[i] = r[i] + beta * p[i];
        }
        rs = rs_next;
    }

    let residual = rs.sqrt() / b_norm;
    if residual.is_finite() && residual <= settings.tolerance {
        return Ok(settings.max_iterations);
    }
    Err(SurfaceError::NotConverged {
        depth,
        iterations: settings.max_iterations,
        residual,
    })
}

/// Solve the indicator function on level `li` and store it in the hierarchy.
///
/// The coarser level must already be solved; it provides the warm start and the values of
/// nodes outside the band.
pub(crate) fn solve_level(
    hierarchy: &mut Hierarchy,
    li: usize,
    samples: &[Sample],
    settings: &CgSettings,
    deadline: &Deadline,
) -> Result<usize, SurfaceError> {
    let system = assemble(hierarchy, li, samples);
    let depth = hierarchy.levels[li].depth;
    if system.nodes.is_empty() {
        return Ok(0);
    }

    let mut x: Vec<f64> = system
        .nodes
        .iter()
        .map(|k| hierarchy.value(li, *k))
        .collect();
    let iterations = conjugate_gradient(&system, &mut x, settings, deadline, depth)?;

    log::debug!(
        "poisson depth {}: {} unknowns, {} cg iterations",
        depth,
        system.nodes.len(),
        iterations
    );

    let level = &mut hierarchy.levels[li];
    level.values = system.nodes.into_iter().zip(x).collect();
    Ok(iterations)
}
