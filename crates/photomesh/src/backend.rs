use std::path::{Path, PathBuf};
use std::time::Instant;

use log::info;
use photomesh_3d::{
    io::{write_atomic, MeshFormat, MeshIoError},
    pose::RobustPoseSolver,
    surface::SurfaceFitter,
};
use photomesh_imgproc::features::{DescriptorMatcher, FeatureDetector};

use crate::error::ReconstructError;
use crate::pipeline::{ReconstructionReport, SfmPipeline};

/// Capability to answer a reconstruction request: two image paths in, one model file out.
pub trait ReconstructionBackend {
    /// Produce a model at `output` from the images at `image_a` and `image_b`.
    ///
    /// On failure `output` is left absent or unchanged.
    fn reconstruct(
        &self,
        image_a: &Path,
        image_b: &Path,
        output: &Path,
    ) -> Result<ReconstructionReport, ReconstructError>;
}

impl<F, M, P, S> ReconstructionBackend for SfmPipeline<F, M, P, S>
where
    F: FeatureDetector,
    M: DescriptorMatcher<F::Descriptor>,
    P: RobustPoseSolver,
    S: SurfaceFitter,
{
    fn reconstruct(
        &self,
        image_a: &Path,
        image_b: &Path,
        output: &Path,
    ) -> Result<ReconstructionReport, ReconstructError> {
        Self::reconstruct(self, image_a, image_b, output)
    }
}

/// Backend that skips reconstruction and publishes a prepared model file.
///
/// The fixture is copied atomically to the output path, so callers observe the same contract
/// as with a real pipeline. The input images are not read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureBackend {
    fixture: PathBuf,
}

impl FixtureBackend {
    /// Serve the model stored at `fixture`.
    pub fn new(fixture: impl Into<PathBuf>) -> Self {
        Self {
            fixture: fixture.into(),
        }
    }

    /// Path of the served model.
    pub fn fixture(&self) -> &Path {
        &self.fixture
    }
}

impl ReconstructionBackend for FixtureBackend {
    fn reconstruct(
        &self,
        _image_a: &Path,
        _image_b: &Path,
        output: &Path,
    ) -> Result<ReconstructionReport, ReconstructError> {
        let start = Instant::now();
        let bytes = std::fs::read(&self.fixture).map_err(MeshIoError::from)?;
        if bytes.is_empty() {
            return Err(MeshIoError::EmptyMesh.into());
        }

        write_atomic(output, |w| Ok(w.write_all(&bytes)?))?;
        info!("fixture: copied {:?} to {output:?}", self.fixture);

        Ok(ReconstructionReport {
            keypoints: [0, 0],
            matches: 0,
            inliers: 0,
            points: 0,
            dropped_points: 0,
            vertices: 0,
            faces: 0,
            format: MeshFormat::from_path(output),
            elapsed: start.elapsed(),
        })
    }
}
