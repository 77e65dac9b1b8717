use std::collections::HashMap;

use super::{Correspondence, FeatureError};

/// Minimum number of correspondences required by the relative pose solver.
pub const MIN_CORRESPONDENCES: usize = 5;

/// Capability to find the nearest neighbours of query descriptors among train descriptors.
pub trait DescriptorMatcher<D> {
    /// For every query descriptor, return up to `k` nearest train descriptors sorted by
    /// increasing distance (ties broken by lower train index).
    fn knn_match(&self, query: &[D], train: &[D], k: usize) -> Vec<Vec<Correspondence>>;
}

/// Configuration of the ratio-test filter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RatioTestConfig {
    /// A match is kept when `best < ratio * second_best`.
    pub ratio: f32,
    /// Minimum number of accepted correspondences.
    pub min_matches: usize,
}

impl Default for RatioTestConfig {
    fn default() -> Self {
        Self {
            ratio: 0.7,
            min_matches: MIN_CORRESPONDENCES,
        }
    }
}

/// Match two descriptor sets with the nearest-neighbour ratio test.
///
/// For each query descriptor the two nearest train descriptors are found. The best one is
/// accepted when its distance is strictly below `ratio` times the distance of the second best.
/// Queries with fewer than two candidates are rejected. When several queries accept the same
/// train descriptor, only the one with the lowest distance survives (ties keep the lowest query
/// index), so every train index appears at most once.
///
/// The result is sorted by query index.
///
/// # Errors
///
/// Returns [`FeatureError::InsufficientCorrespondence`] when fewer than `config.min_matches`
/// correspondences survive.
pub fn match_ratio_test<D, M>(
    matcher: &M,
    query: &[D],
    train: &[D],
    config: &RatioTestConfig,
) -> Result<Vec<Correspondence>, FeatureError>
where
    M: DescriptorMatcher<D> + ?Sized,
{
    let candidates = matcher.knn_match(query, train, 2);

    let mut best_for_train: HashMap<usize, Correspondence> = HashMap::new();
    for knn in candidates {
        let [best, second] = match knn.as_slice() {
            [best, second, ..] => [*best, *second],
            _ => continue,
        };

        if (best.distance as f32) >= config.ratio * second.distance as f32 {
            continue;
        }

        best_for_train
            .entry(best.train)
            .and_modify(|kept| {
                if (best.distance, best.query) < (kept.distance, kept.query) {
                    *kept = best;
                }
            })
            .or_insert(best);
    }

    let mut matches: Vec<Correspondence> = best_for_train.into_values().collect();
    matches.sort_by_key(|m| m.query);

    log::debug!(
        "ratio test kept {} of {} query descriptors",
        matches.len(),
        query.len()
    );

    if matches.len() < config.min_matches {
        return Err(FeatureError::InsufficientCorrespondence {
            found: matches.len(),
            required: config.min_matches,
        });
    }

    Ok(matches)
}
