//! Feature detection, description and matching.
//!
//! The pipeline-facing entry points are the [`FeatureDetector`] and [`DescriptorMatcher`]
//! capabilities together with [`match_ratio_test`], which turns raw nearest neighbours into a
//! one-to-one correspondence set.
//!
//! # Available Detectors
//!
//! - **FAST**: Features from Accelerated Segment Test corner detection with NMS.
//! - **ORB**: oriented FAST keypoints over a scale pyramid with rotated BRIEF descriptors.

mod error;
pub use error::FeatureError;

mod fast;
pub use fast::*;

mod harris;
pub use harris::*;

mod matching;
pub use matching::*;

/// Oriented FAST and rotated BRIEF.
pub mod orb;

use photomesh_image::Image;

/// A salient image location.
///
/// Coordinates are expressed in pixels of the full resolution image, whatever pyramid level the
/// keypoint was detected on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keypoint {
    /// Column coordinate in pixels.
    pub x: f32,
    /// Row coordinate in pixels.
    pub y: f32,
    /// Scale of the pyramid level relative to the full resolution image.
    pub scale: f32,
    /// Dominant orientation in radians.
    pub angle: f32,
    /// Corner response used for ranking.
    pub response: f32,
    /// Pyramid level the keypoint was detected on.
    pub octave: usize,
}

/// A correspondence between two descriptor sets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Correspondence {
    /// Index of the keypoint in the first (query) image.
    pub query: usize,
    /// Index of the keypoint in the second (train) image.
    pub train: usize,
    /// Descriptor distance; lower is better.
    pub distance: u32,
}

/// Capability to detect keypoints and compute a descriptor for each of them.
pub trait FeatureDetector {
    /// The descriptor type produced by the detector.
    type Descriptor;

    /// Detect keypoints on an intensity image and describe them.
    ///
    /// The two returned vectors are parallel. An image without salient structure yields empty
    /// vectors, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`FeatureError::EmptyImage`] when the image has zero area.
    fn detect_and_compute(
        &self,
        image: &Image<f32, 1>,
    ) -> Result<(Vec<Keypoint>, Vec<Self::Descriptor>), FeatureError>;
}
