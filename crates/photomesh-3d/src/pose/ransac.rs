use glam::{DMat3, DVec2, DVec3};
use rand::prelude::*;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::{
    check_essential_rank, decompose_essential, essential_5point, essential_8point,
    sampson_distance, PoseError, PoseEstimate, RelativePose, RobustPoseSolver, FIVE_POINT_SAMPLE,
};
use crate::camera::CameraIntrinsics;
use crate::triangulation::{projection_matrix, triangulate_dlt};

/// Parameters for RANSAC model estimation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacParams {
    /// Maximum number of RANSAC iterations.
    pub max_iterations: usize,
    /// Inlier threshold in pixels.
    pub threshold: f64,
    /// Probability of drawing at least one outlier free sample, drives early termination.
    pub confidence: f64,
    /// Minimum number of inliers required for acceptance.
    pub min_inliers: usize,
    /// Optional RNG seed for deterministic runs.
    pub random_seed: Option<u64>,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            threshold: 1.0,
            confidence: 0.999,
            min_inliers: FIVE_POINT_SAMPLE,
            random_seed: Some(0),
        }
    }
}

/// Result of a RANSAC model fit.
#[derive(Clone, Debug)]
pub struct RansacResult<M> {
    /// Estimated model.
    pub model: M,
    /// Per-point inlier mask.
    pub inliers: Vec<bool>,
    /// Total inlier count.
    pub inlier_count: usize,
    /// Sum of inlier errors (lower is better).
    pub score: f64,
    /// Number of iterations run.
    pub iterations: usize,
}

/// Number of iterations needed to draw an all-inlier sample with the given confidence.
fn adaptive_iterations(inlier_ratio: f64, confidence: f64, sample: usize, cap: usize) -> usize {
    if inlier_ratio <= 0.0 {
        return cap;
    }
    let good = inlier_ratio.powi(sample as i32);
    if good >= 1.0 - f64::EPSILON {
        return 1;
    }
    let needed = (1.0 - confidence).ln() / (1.0 - good).ln();
    if !needed.is_finite() {
        return cap;
    }
    (needed.ceil().max(1.0) as usize).min(cap)
}

fn score_model(
    e: &DMat3,
    x1: &[DVec2],
    x2: &[DVec2],
    threshold_sq: f64,
) -> (Vec<bool>, usize, f64) {
    let mut inliers = vec![false; x1.len()];
    let mut count = 0usize;
    let mut score = 0.0f64;
    for (i, (a, b)) in x1.iter().zip(x2.iter()).enumerate() {
        let d = sampson_distance(e, *a, *b);
        if d <= threshold_sq {
            inliers[i] = true;
            count += 1;
            score += d;
        }
    }
    (inliers, count, score)
}

/// Estimate an essential matrix with RANSAC using the five-point solver.
///
/// Points are normalized image coordinates; `threshold_sq` is the squared Sampson distance
/// threshold expressed in the same coordinates.
pub fn ransac_essential(
    x1: &[DVec2],
    x2: &[DVec2],
    threshold_sq: f64,
    params: &RansacParams,
) -> Result<RansacResult<DMat3>, PoseError> {
    if x1.len() != x2.len() || x1.len() < FIVE_POINT_SAMPLE {
        return Err(PoseError::InvalidInput {
            required: FIVE_POINT_SAMPLE,
            found: x1.len().min(x2.len()),
        });
    }

    let mut rng = match params.random_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => {
            let mut tr = rand::rng();
            StdRng::from_rng(&mut tr)
        }
    };

    let n = x1.len();
    let mut best_model = None;
    let mut best_inliers = Vec::new();
    let mut best_count = 0usize;
    let mut best_score = f64::INFINITY;

    let mut max_iterations = params.max_iterations;
    let mut iterations = 0usize;
    let mut s1 = Vec::with_capacity(FIVE_POINT_SAMPLE);
    let mut s2 = Vec::with_capacity(FIVE_POINT_SAMPLE);

    while iterations < max_iterations {
        iterations += 1;

        let sample = rand::seq::index::sample(&mut rng, n, FIVE_POINT_SAMPLE);
        s1.clear();
        s2.clear();
        for idx in sample.iter() {
            s1.push(x1[idx]);
            s2.push(x2[idx]);
        }

        let candidates = match essential_5point(&s1, &s2) {
            Ok(c) => c,
            Err(_) => continue,
        };

        let mut improved = false;
        for e in candidates {
            let (inliers, count, score) = score_model(&e, x1, x2, threshold_sq);
            if count > best_count || (count == best_count && count > 0 && score < best_score) {
                best_model = Some(e);
                best_inliers = inliers;
                best_count = count;
                best_score = score;
                improved = true;
            }
        }

        if improved {
            max_iterations = adaptive_iterations(
                best_count as f64 / n as f64,
                params.confidence,
                FIVE_POINT_SAMPLE,
                params.max_iterations,
            );
        }
    }

    log::debug!(
        "essential ransac: {} inliers of {} after {} iterations",
        best_count,
        n,
        iterations
    );

    let model = match best_model {
        Some(m) if best_count >= params.min_inliers.max(FIVE_POINT_SAMPLE) => m,
        _ => return Err(PoseError::RansacFailure),
    };

    Ok(RansacResult {
        model,
        inliers: best_inliers,
        inlier_count: best_count,
        score: best_score,
        iterations,
    })
}

/// Linear re-fit of an essential matrix on all inliers, kept only when it does not lose any.
fn refine_essential(
    x1: &[DVec2],
    x2: &[DVec2],
    threshold_sq: f64,
    result: RansacResult<DMat3>,
) -> RansacResult<DMat3> {
    if result.inlier_count < 8 {
        return result;
    }

    let (s1, s2): (Vec<DVec2>, Vec<DVec2>) = x1
        .iter()
        .zip(x2.iter())
        .zip(result.inliers.iter())
        .filter(|(_, keep)| **keep)
        .map(|((a, b), _)| (*a, *b))
        .unzip();

    let Some(e) = essential_8point(&s1, &s2) else {
        return result;
    };

    let (inliers, count, score) = score_model(&e, x1, x2, threshold_sq);
    if count >= result.inlier_count {
        log::debug!(
            "linear refit kept: {} -> {} inliers",
            result.inlier_count,
            count
        );
        RansacResult {
            model: e,
            inliers,
            inlier_count: count,
            score,
            iterations: result.iterations,
        }
    } else {
        result
    }
}

/// Select the decomposition of `e` that places most masked points in front of both cameras.
///
/// Points are normalized image coordinates. A point counts when its depth is positive and below
/// `max_depth` in both views. Returns the pose and the cheirality mask restricted to `mask`.
///
/// # Errors
///
/// Returns [`PoseError::RankDeficient`] for an essential matrix of rank lower than two and
/// [`PoseError::Cheirality`] when no candidate places any point in front of both cameras.
pub fn recover_pose(
    e: &DMat3,
    x1: &[DVec2],
    x2: &[DVec2],
    mask: &[bool],
    max_depth: f64,
) -> Result<(RelativePose, Vec<bool>), PoseError> {
    check_essential_rank(e)?;

    let p1 = projection_matrix(&DMat3::IDENTITY, &DMat3::IDENTITY, DVec3::ZERO);

    let mut best: Option<(RelativePose, Vec<bool>)> = None;
    let mut best_count = 0usize;

    for (r, t) in decompose_essential(e) {
        let p2 = projection_matrix(&DMat3::IDENTITY, &r, t);
        let mut front = vec![false; x1.len()];
        let mut count = 0usize;
        for (i, (a, b)) in x1.iter().zip(x2.iter()).enumerate() {
            if !mask.get(i).copied().unwrap_or(false) {
                continue;
            }
            let Some(x) = triangulate_dlt(&p1, &p2, *a, *b) else {
                continue;
            };
            let z1 = x.z;
            let z2 = (r * x + t).z;
            if z1 > 0.0 && z2 > 0.0 && z1 < max_depth && z2 < max_depth {
                front[i] = true;
                count += 1;
            }
        }

        if count > best_count {
            best_count = count;
            best = Some((
                RelativePose {
                    rotation: r,
                    translation: t,
                },
                front,
            ));
        }
    }

    best.ok_or(PoseError::Cheirality)
}

/// Robust relative pose: five-point RANSAC followed by cheirality based decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EssentialRansac {
    /// RANSAC settings.
    pub params: RansacParams,
    /// Re-fit the essential matrix linearly on all inliers.
    pub refine: bool,
    /// Largest accepted depth, in units of the baseline.
    pub max_depth: f64,
}

impl Default for EssentialRansac {
    fn default() -> Self {
        Self {
            params: RansacParams::default(),
            refine: true,
            max_depth: 50.0,
        }
    }
}

impl EssentialRansac {
    /// Create an estimator with the given RANSAC settings.
    pub fn new(params: RansacParams) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }

    /// Enable or disable the linear re-fit on inliers.
    pub fn with_refine(mut self, refine: bool) -> Self {
        self.refine = refine;
        self
    }

    /// Set the largest accepted depth.
    pub fn with_max_depth(mut self, max_depth: f64) -> Self {
        self.max_depth = max_depth;
        self
    }
}

impl RobustPoseSolver for EssentialRansac {
    fn estimate(
        &self,
        x1: &[DVec2],
        x2: &[DVec2],
        intrinsics: &CameraIntrinsics,
    ) -> Result<PoseEstimate, PoseError> {
        let x1n: Vec<DVec2> = x1.iter().map(|p| intrinsics.unproject(*p)).collect();
        let x2n: Vec<DVec2> = x2.iter().map(|p| intrinsics.unproject(*p)).collect();

        let threshold = self.params.threshold / intrinsics.focal;
        let threshold_sq = threshold * threshold;

        let mut result = ransac_essential(&x1n, &x2n, threshold_sq, &self.params)?;
        if self.refine {
            result = refine_essential(&x1n, &x2n, threshold_sq, result);
        }

        let (pose, front) =
            recover_pose(&result.model, &x1n, &x2n, &result.inliers, self.max_depth)?;

        let inliers: Vec<bool> = result
            .inliers
            .iter()
            .zip(front.iter())
            .map(|(a, b)| *a && *b)
            .collect();
        let inlier_count = inliers.iter().filter(|v| **v).count();

        log::debug!(
            "relative pose: {} epipolar inliers, {} in front of both cameras",
            result.inlier_count,
            inlier_count
        );

        Ok(PoseEstimate {
            pose,
            essential: result.model,
            inliers,
            inlier_count,
        })
    }
}
