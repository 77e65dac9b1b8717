use std::path::Path;
use std::time::Duration;

use photomesh_3d::{
    camera::CameraIntrinsics, pointcloud::PointCloudBuilder, pose::EssentialRansac,
    surface::PoissonConfig,
};
use photomesh_image::ImageSize;
use photomesh_imgproc::features::{orb::OrbDetector, RatioTestConfig};
use serde::{Deserialize, Serialize};

/// Errors raised while loading a configuration file.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read configuration file")]
    Io(#[from] std::io::Error),

    /// The file is not a valid configuration.
    #[error("Failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// ORB extraction settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Maximum number of keypoints per image.
    pub n_features: usize,
    /// Number of pyramid levels.
    pub n_levels: usize,
    /// Size ratio between consecutive pyramid levels.
    pub scale_factor: f32,
    /// FAST threshold tried first.
    pub ini_fast_threshold: f32,
    /// FAST threshold used when a level yields too few corners.
    pub min_fast_threshold: f32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            n_features: 500,
            n_levels: 8,
            scale_factor: 1.2,
            ini_fast_threshold: 20.0,
            min_fast_threshold: 7.0,
        }
    }
}

impl FeatureConfig {
    /// Build the ORB detector described by the settings.
    pub fn detector(&self) -> OrbDetector {
        OrbDetector::new()
            .with_n_features(self.n_features)
            .with_pyramid(self.n_levels, self.scale_factor)
            .with_fast_thresholds(self.ini_fast_threshold, self.min_fast_threshold)
    }
}

/// Source of the camera intrinsics shared by both views.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntrinsicsConfig {
    /// Focal length as a fraction of the image width, principal point at the image centre.
    Approximate {
        /// Focal length divided by the image width.
        focal_ratio: f64,
    },
    /// Known intrinsics.
    Explicit(CameraIntrinsics),
}

impl Default for IntrinsicsConfig {
    fn default() -> Self {
        Self::Approximate { focal_ratio: 0.8 }
    }
}

impl IntrinsicsConfig {
    /// Intrinsics for an image of the given size.
    pub fn resolve(&self, size: ImageSize) -> CameraIntrinsics {
        match *self {
            Self::Approximate { focal_ratio } => {
                CameraIntrinsics::approximate(size.width, size.height, focal_ratio)
            }
            Self::Explicit(intrinsics) => intrinsics,
        }
    }
}

/// Settings of every stage of the reconstruction.
///
/// Missing fields take their default values when deserializing, so a configuration file only
/// needs to name what it changes:
///
/// ```
/// use photomesh::ReconstructionConfig;
///
/// let config = ReconstructionConfig::from_json_str(r#"{ "ratio": 0.6 }"#).unwrap();
/// assert_eq!(config.ratio, 0.6);
/// assert_eq!(config.features.n_features, 500);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    /// Keypoint detection and description.
    pub features: FeatureConfig,
    /// Lowe ratio used to accept a nearest neighbour.
    pub ratio: f32,
    /// Camera intrinsics.
    pub intrinsics: IntrinsicsConfig,
    /// Robust relative pose estimation.
    pub pose: EssentialRansac,
    /// Point cloud assembly and normal estimation.
    pub pointcloud: PointCloudBuilder,
    /// Poisson surface reconstruction.
    pub poisson: PoissonConfig,
    /// Time budget of a whole invocation.
    pub timeout: Option<Duration>,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            features: FeatureConfig::default(),
            ratio: RatioTestConfig::default().ratio,
            intrinsics: IntrinsicsConfig::default(),
            pose: EssentialRansac::default(),
            pointcloud: PointCloudBuilder::default(),
            poisson: PoissonConfig::default(),
            timeout: None,
        }
    }
}

impl ReconstructionConfig {
    /// Parse a configuration from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Set the ratio test threshold.
    pub fn with_ratio(mut self, ratio: f32) -> Self {
        self.ratio = ratio;
        self
    }

    /// Set the camera intrinsics.
    pub fn with_intrinsics(mut self, intrinsics: IntrinsicsConfig) -> Self {
        self.intrinsics = intrinsics;
        self
    }

    /// Set the seed of the RANSAC sampler; `None` seeds from the operating system.
    pub fn with_random_seed(mut self, seed: Option<u64>) -> Self {
        self.pose.params.random_seed = seed;
        self
    }

    /// Set the Poisson settings.
    pub fn with_poisson(mut self, poisson: PoissonConfig) -> Self {
        self.poisson = poisson;
        self
    }

    /// Set the time budget.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Ratio test settings with the five correspondence floor of the pose solver.
    pub fn ratio_test(&self) -> RatioTestConfig {
        RatioTestConfig {
            ratio: self.ratio,
            ..Default::default()
        }
    }
}
