use kiddo::immutable::float::kdtree::ImmutableKdTree;

use crate::mesh::TriangleMesh;

pub(crate) type SampleTree = ImmutableKdTree<f64, u32, 3, 32>;

/// Gaussian weighted count of samples around each vertex, truncated at three kernel widths.
pub(crate) fn vertex_densities(vertices: &[[f64; 3]], tree: &SampleTree, sigma: f64) -> Vec<f64> {
    let cutoff = 3.0 * sigma;
    let inv = 1.0 / (2.0 * sigma * sigma);
    vertices
        .iter()
        .map(|v| {
            tree.within_unsorted::<kiddo::SquaredEuclidean>(v, cutoff * cutoff)
                .iter()
                .map(|nn| (-nn.distance * inv).exp())
                .sum()
        })
        .collect()
}

/// Colour of the nearest sample for each vertex.
pub(crate) fn vertex_colors(
    vertices: &[[f64; 3]],
    tree: &SampleTree,
    colors: &[[u8; 3]],
) -> Vec<[u8; 3]> {
    vertices
        .iter()
        .map(|v| {
            let nn = tree.nearest_one::<kiddo::SquaredEuclidean>(v);
            colors.get(nn.item as usize).copied().unwrap_or([0, 0, 0])
        })
        .collect()
}

/// Quantile with linear interpolation between the closest ranks.
pub(crate) fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Remove vertices whose density lies below the `q` quantile, with their faces.
///
/// Returns the number of removed vertices.
pub(crate) fn prune_low_density(mesh: &mut TriangleMesh, q: f64) -> usize {
    let Some(densities) = mesh.densities.as_ref() else {
        return 0;
    };
    let Some(threshold) = quantile(densities, q) else {
        return 0;
    };
    let remove: Vec<bool> = densities.iter().map(|d| *d < threshold).collect();
    let removed = remove.iter().filter(|r| **r).count();
    if removed > 0 {
        mesh.remove_vertices(&remove);
    }
    removed
}
