use photomesh_image::ImageError;

/// An error type for feature extraction and matching.
#[derive(thiserror::Error, Debug)]
pub enum FeatureError {
    /// The input image has no pixels.
    #[error("Image has zero area ({width}x{height})")]
    EmptyImage {
        /// Width of the rejected image.
        width: usize,
        /// Height of the rejected image.
        height: usize,
    },

    /// Too few correspondences survived filtering.
    #[error("Found {found} correspondences, at least {required} are required")]
    InsufficientCorrespondence {
        /// Number of accepted correspondences.
        found: usize,
        /// Minimum number of correspondences required.
        required: usize,
    },

    /// Error from an image operation.
    #[error(transparent)]
    Image(#[from] ImageError),
}
