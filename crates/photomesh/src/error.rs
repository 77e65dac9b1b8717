use std::fmt;
use std::path::PathBuf;

use photomesh_3d::{
    io::MeshIoError, pointcloud::PointCloudError, pose::PoseError, surface::SurfaceError,
    triangulation::TriangulationError,
};
use photomesh_imgproc::features::FeatureError;
use photomesh_io::IoError;

/// Category of a reconstruction failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An input image has no pixels or could not be decoded.
    EmptyImage,
    /// Fewer than five correspondences survived matching.
    InsufficientCorrespondence,
    /// The relative pose could not be recovered.
    DegeneratePose,
    /// A correspondence triangulates to a point at infinity.
    DegenerateTriangulation,
    /// No point survived triangulation.
    EmptyPointCloud,
    /// The surface fit failed or produced no faces.
    Reconstruction,
    /// Reading an input or writing the output failed.
    Io,
    /// The invocation exceeded its time budget.
    Timeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::EmptyImage => "empty image",
            Self::InsufficientCorrespondence => "insufficient correspondence",
            Self::DegeneratePose => "degenerate pose",
            Self::DegenerateTriangulation => "degenerate triangulation",
            Self::EmptyPointCloud => "empty point cloud",
            Self::Reconstruction => "reconstruction",
            Self::Io => "io",
            Self::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

/// Errors returned by a reconstruction invocation.
#[derive(thiserror::Error, Debug)]
pub enum ReconstructError {
    /// An input image could not be loaded.
    #[error("Failed to load {path:?}: {source}")]
    LoadImage {
        /// Path of the image.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: IoError,
    },

    /// Feature extraction or matching failed.
    #[error(transparent)]
    Feature(#[from] FeatureError),

    /// Relative pose estimation failed.
    #[error(transparent)]
    Pose(#[from] PoseError),

    /// A correspondence could not be triangulated.
    #[error(transparent)]
    Triangulation(#[from] TriangulationError),

    /// The point cloud could not be assembled.
    #[error(transparent)]
    PointCloud(#[from] PointCloudError),

    /// Surface reconstruction failed.
    #[error(transparent)]
    Surface(#[from] SurfaceError),

    /// The mesh could not be written.
    #[error(transparent)]
    Export(#[from] MeshIoError),

    /// The time budget ran out.
    #[error("Reconstruction exceeded its time budget before {stage}")]
    Timeout {
        /// Stage that was about to run.
        stage: &'static str,
    },
}

impl ReconstructError {
    /// Category of the failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LoadImage { source, .. } => match source {
                IoError::FileDoesNotExist(_) | IoError::FileError(_) => ErrorKind::Io,
                _ => ErrorKind::EmptyImage,
            },
            Self::Feature(FeatureError::InsufficientCorrespondence { .. }) => {
                ErrorKind::InsufficientCorrespondence
            }
            Self::Feature(_) => ErrorKind::EmptyImage,
            Self::Pose(_) => ErrorKind::DegeneratePose,
            Self::Triangulation(_) => ErrorKind::DegenerateTriangulation,
            Self::PointCloud(_) => ErrorKind::EmptyPointCloud,
            Self::Surface(SurfaceError::Timeout) => ErrorKind::Timeout,
            Self::Surface(_) => ErrorKind::Reconstruction,
            Self::Export(MeshIoError::EmptyMesh | MeshIoError::InvalidMesh(_)) => {
                ErrorKind::Reconstruction
            }
            Self::Export(_) => ErrorKind::Io,
            Self::Timeout { .. } => ErrorKind::Timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let cases = [
            (
                ReconstructError::Feature(FeatureError::EmptyImage {
                    width: 0,
                    height: 4,
                }),
                ErrorKind::EmptyImage,
            ),
            (
                ReconstructError::Feature(FeatureError::InsufficientCorrespondence {
                    found: 3,
                    required: 5,
                }),
                ErrorKind::InsufficientCorrespondence,
            ),
            (
                ReconstructError::Pose(PoseError::Cheirality),
                ErrorKind::DegeneratePose,
            ),
            (
                ReconstructError::Triangulation(TriangulationError::PointAtInfinity { index: 2 }),
                ErrorKind::DegenerateTriangulation,
            ),
            (
                ReconstructError::PointCloud(PointCloudError::EmptyPointCloud),
                ErrorKind::EmptyPointCloud,
            ),
            (
                ReconstructError::Surface(SurfaceError::EmptyMesh),
                ErrorKind::Reconstruction,
            ),
            (
                ReconstructError::Surface(SurfaceError::Timeout),
                ErrorKind::Timeout,
            ),
            (
                ReconstructError::Export(MeshIoError::Io(std::io::Error::other("disk full"))),
                ErrorKind::Io,
            ),
            (
                ReconstructError::LoadImage {
                    path: "a.png".into(),
                    source: IoError::FileDoesNotExist("a.png".into()),
                },
                ErrorKind::Io,
            ),
            (
                ReconstructError::Timeout { stage: "matching" },
                ErrorKind::Timeout,
            ),
        ];

        for (error, kind) in cases {
            assert_eq!(error.kind(), kind, "{error}");
        }
    }

    #[test]
    fn test_error_messages() {
        let error = ReconstructError::Feature(FeatureError::InsufficientCorrespondence {
            found: 3,
            required: 5,
        });
        assert_eq!(
            error.to_string(),
            "Found 3 correspondences, at least 5 are required"
        );
        assert_eq!(ErrorKind::DegeneratePose.to_string(), "degenerate pose");
    }
}
