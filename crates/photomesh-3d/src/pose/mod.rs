//! # Pose estimation
//!
//! Relative pose of two calibrated views from point correspondences.
//!
//! - [`five_point`] — minimal essential matrix solver on five normalized correspondences
//! - [`essential`] — essential matrix utilities: linear fit, constraints, decomposition
//! - [`ransac`] — robust essential matrix estimation and cheirality based pose recovery

mod essential;
pub use essential::*;

mod five_point;
pub use five_point::*;

mod ransac;
pub use ransac::*;

use glam::{DMat3, DVec2, DVec3};

use crate::camera::CameraIntrinsics;

/// Errors returned by the relative pose estimators.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum PoseError {
    /// Input correspondences are invalid or insufficient.
    #[error("Need at least {required} correspondences with equal lengths, got {found}")]
    InvalidInput {
        /// Minimum required correspondences.
        required: usize,
        /// Number of correspondences provided.
        found: usize,
    },

    /// RANSAC did not find any model supported by enough inliers.
    #[error("RANSAC failed to find a valid essential matrix")]
    RansacFailure,

    /// The essential matrix has rank lower than two.
    #[error("Essential matrix is rank deficient (singular values {0:?})")]
    RankDeficient([f64; 3]),

    /// No pose candidate places points in front of both cameras.
    #[error("No pose candidate passes the cheirality check")]
    Cheirality,
}

/// Rigid motion from the first camera frame to the second, `X2 = R * X1 + t`.
///
/// The rotation is orthonormal with determinant +1 and the translation has unit norm, since
/// the scale of a two-view reconstruction is unknown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelativePose {
    /// Rotation from the first to the second camera frame.
    pub rotation: DMat3,
    /// Unit translation from the first to the second camera frame.
    pub translation: DVec3,
}

impl RelativePose {
    /// Map a point from the first camera frame to the second.
    pub fn transform_point(&self, point: DVec3) -> DVec3 {
        self.rotation * point + self.translation
    }

    /// Position of the second camera centre in the first camera frame, `-R^T t`.
    pub fn second_camera_center(&self) -> DVec3 {
        -(self.rotation.transpose() * self.translation)
    }
}

/// Output of a robust relative pose estimation.
#[derive(Debug, Clone)]
pub struct PoseEstimate {
    /// Recovered relative pose.
    pub pose: RelativePose,
    /// Essential matrix consistent with `pose`.
    pub essential: DMat3,
    /// Per-correspondence mask: epipolar inlier and in front of both cameras.
    pub inliers: Vec<bool>,
    /// Number of `true` entries in `inliers`.
    pub inlier_count: usize,
}

/// Capability to robustly estimate the relative pose of two views sharing intrinsics.
pub trait RobustPoseSolver {
    /// Estimate the relative pose from pixel correspondences `x1[i] <-> x2[i]`.
    fn estimate(
        &self,
        x1: &[DVec2],
        x2: &[DVec2],
        intrinsics: &CameraIntrinsics,
    ) -> Result<PoseEstimate, PoseError>;
}
