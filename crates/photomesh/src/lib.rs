#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

#[doc(inline)]
pub use photomesh_image as image;

#[doc(inline)]
pub use photomesh_imgproc as imgproc;

#[doc(inline)]
pub use photomesh_io as io;

#[doc(inline)]
pub use photomesh_3d as k3d;

/// Backends answering reconstruction requests.
pub mod backend;

/// Reconstruction settings.
pub mod config;

/// Error types of the reconstruction pipeline.
pub mod error;

/// The two-view structure-from-motion pipeline.
pub mod pipeline;

pub use backend::{FixtureBackend, ReconstructionBackend};
pub use config::{ConfigError, FeatureConfig, IntrinsicsConfig, ReconstructionConfig};
pub use error::{ErrorKind, ReconstructError};
pub use pipeline::{ReconstructionReport, SfmPipeline};

use std::path::Path;

/// Reconstruct a mesh from two photographs with the default configuration.
///
/// On success a non-empty mesh is written to `output_model_path`, as PLY when its extension is
/// `.ply` and as glTF binary otherwise. On failure the output path is left untouched.
///
/// # Errors
///
/// See [`ErrorKind`] for the failure taxonomy.
pub fn reconstruct(
    image_a_path: impl AsRef<Path>,
    image_b_path: impl AsRef<Path>,
    output_model_path: impl AsRef<Path>,
) -> Result<ReconstructionReport, ReconstructError> {
    SfmPipeline::new(ReconstructionConfig::default()).reconstruct(
        image_a_path,
        image_b_path,
        output_model_path,
    )
}
