mod glb;
mod ply;

pub use glb::write_glb;
pub use ply::{write_ply_mesh, write_ply_pointcloud};

use std::io::{BufWriter, Write};
use std::path::Path;

use crate::mesh::{MeshError, TriangleMesh};
use crate::pointcloud::PointCloud;

/// Error types for the mesh writers.
#[derive(Debug, thiserror::Error)]
pub enum MeshIoError {
    /// Failed to write the file.
    #[error("Failed to write mesh file")]
    Io(#[from] std::io::Error),

    /// Failed to serialize the glTF document.
    #[error("Failed to serialize glTF JSON")]
    Json(#[from] serde_json::Error),

    /// The mesh has no faces.
    #[error("Refusing to write an empty mesh")]
    EmptyMesh,

    /// The mesh is malformed.
    #[error("Invalid mesh: {0}")]
    InvalidMesh(#[from] MeshError),

    /// The binary payload exceeds the 32 bit lengths of the container.
    #[error("Mesh of {0} bytes is too large for the container")]
    TooLarge(usize),
}

/// Binary model formats understood by [`write_mesh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshFormat {
    /// glTF 2.0 binary container.
    Glb,
    /// Binary little endian PLY.
    Ply,
}

impl MeshFormat {
    /// Pick the format from the file extension; anything but `.ply` is written as glb.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        match path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("ply") => Self::Ply,
            _ => Self::Glb,
        }
    }
}

/// Write to `path` through a temporary file in the same directory that is renamed into place
/// once `write` succeeds. Missing parent directories are created.
///
/// On failure the destination is left untouched.
pub fn write_atomic<F>(path: impl AsRef<Path>, write: F) -> Result<(), MeshIoError>
where
    F: FnOnce(&mut dyn Write) -> Result<(), MeshIoError>,
{
    let path = path.as_ref();
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => std::path::PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)?;

    let tmp = tempfile::NamedTempFile::new_in(&parent)?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        write(&mut writer)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    log::debug!("wrote {}", path.display());
    Ok(())
}

/// Write a mesh to `path` in the format chosen by its extension.
///
/// # Errors
///
/// Refuses empty or malformed meshes; filesystem failures are returned as
/// [`MeshIoError::Io`].
pub fn write_mesh(path: impl AsRef<Path>, mesh: &TriangleMesh) -> Result<MeshFormat, MeshIoError> {
    if mesh.is_empty() {
        return Err(MeshIoError::EmptyMesh);
    }
    mesh.validate()?;

    let format = MeshFormat::from_path(&path);
    write_atomic(&path, |w| match format {
        MeshFormat::Glb => write_glb(w, mesh),
        MeshFormat::Ply => write_ply_mesh(w, mesh),
    })?;
    Ok(format)
}

/// Write a point cloud as binary little endian PLY.
pub fn write_pointcloud(path: impl AsRef<Path>, cloud: &PointCloud) -> Result<(), MeshIoError> {
    write_atomic(path, |w| write_ply_pointcloud(w, cloud))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> TriangleMesh {
        TriangleMesh {
            vertices: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            faces: vec![[0, 1, 2]],
            colors: Some(vec![[255, 0, 0], [0, 255, 0], [0, 0, 255]]),
            densities: Some(vec![1.0, 2.0, 3.0]),
        }
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(MeshFormat::from_path("a/b.ply"), MeshFormat::Ply);
        assert_eq!(MeshFormat::from_path("a/b.PLY"), MeshFormat::Ply);
        assert_eq!(MeshFormat::from_path("a/b.glb"), MeshFormat::Glb);
        assert_eq!(MeshFormat::from_path("a/b.obj"), MeshFormat::Glb);
        assert_eq!(MeshFormat::from_path("model"), MeshFormat::Glb);
    }

    #[test]
    fn test_write_mesh_creates_parents() -> Result<(), MeshIoError> {
        let tmp_dir = tempfile::tempdir()?;
        let path = tmp_dir.path().join("nested").join("deeper").join("mesh.glb");

        let format = write_mesh(&path, &triangle())?;
        assert_eq!(format, MeshFormat::Glb);

        let bytes = std::fs::read(&path)?;
        assert_eq!(&bytes[0..4], b"glTF");

        let ply_path = tmp_dir.path().join("mesh.ply");
        assert_eq!(write_mesh(&ply_path, &triangle())?, MeshFormat::Ply);
        assert!(std::fs::read(&ply_path)?.starts_with(b"ply\n"));

        // the nested directory and the ply, no leftover temporaries
        let entries = std::fs::read_dir(tmp_dir.path())?.count();
        assert_eq!(entries, 2);
        Ok(())
    }

    #[test]
    fn test_write_mesh_refuses_empty() -> Result<(), MeshIoError> {
        let tmp_dir = tempfile::tempdir()?;
        let path = tmp_dir.path().join("empty.glb");

        let res = write_mesh(&path, &TriangleMesh::new());
        assert!(matches!(res, Err(MeshIoError::EmptyMesh)));
        assert!(!path.exists());

        let mut broken = triangle();
        broken.faces.push([0, 1, 7]);
        assert!(matches!(
            write_mesh(&path, &broken),
            Err(MeshIoError::InvalidMesh(_))
        ));
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn test_failed_write_keeps_previous_file() -> Result<(), MeshIoError> {
        let tmp_dir = tempfile::tempdir()?;
        let path = tmp_dir.path().join("mesh.glb");
        std::fs::write(&path, b"previous")?;

        let res = write_atomic(&path, |w| {
            w.write_all(b"partial")?;
            Err(MeshIoError::EmptyMesh)
        });
        assert!(res.is_err());
        assert_eq!(std::fs::read(&path)?, b"previous");
        assert_eq!(std::fs::read_dir(tmp_dir.path())?.count(), 1);
        Ok(())
    }

    #[test]
    fn test_write_pointcloud() -> Result<(), Box<dyn std::error::Error>> {
        let tmp_dir = tempfile::tempdir()?;
        let path = tmp_dir.path().join("cloud.ply");
        let cloud = PointCloud::new(vec![[1.0, 2.0, 3.0]], Some(vec![[9, 8, 7]]), None)?;
        write_pointcloud(&path, &cloud)?;
        assert!(std::fs::read(&path)?.starts_with(b"ply\n"));
        Ok(())
    }
}
