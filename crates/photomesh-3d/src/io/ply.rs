use std::io::Write;

use super::MeshIoError;
use crate::mesh::TriangleMesh;
use crate::pointcloud::PointCloud;

fn write_f32s<W: Write + ?Sized>(writer: &mut W, values: &[f64]) -> Result<(), MeshIoError> {
    for v in values {
        writer.write_all(&(*v as f32).to_le_bytes())?;
    }
    Ok(())
}

/// Write a mesh as binary little endian PLY with normals, optional colours and densities.
pub fn write_ply_mesh<W: Write + ?Sized>(
    writer: &mut W,
    mesh: &TriangleMesh,
) -> Result<(), MeshIoError> {
    let normals = mesh.vertex_normals();

    let mut header = String::from("ply\nformat binary_little_endian 1.0\ncomment photomesh\n");
    header.push_str(&format!("element vertex {}\n", mesh.num_vertices()));
    header.push_str("property float x\nproperty float y\nproperty float z\n");
    header.push_str("property float nx\nproperty float ny\nproperty float nz\n");
    if mesh.colors.is_some() {
        header.push_str("property uchar red\nproperty uchar green\nproperty uchar blue\n");
    }
    if mesh.densities.is_some() {
        header.push_str("property float density\n");
    }
    header.push_str(&format!("element face {}\n", mesh.num_faces()));
    header.push_str("property list uchar int vertex_indices\nend_header\n");
    writer.write_all(header.as_bytes())?;

    for (i, v) in mesh.vertices.iter().enumerate() {
        write_f32s(writer, v)?;
        write_f32s(writer, &normals[i])?;
        if let Some(colors) = &mesh.colors {
            writer.write_all(&colors[i])?;
        }
        if let Some(densities) = &mesh.densities {
            write_f32s(writer, &[densities[i]])?;
        }
    }

    for f in &mesh.faces {
        writer.write_all(&[3u8])?;
        for i in f {
            let i = i32::try_from(*i).map_err(|_| MeshIoError::TooLarge(*i as usize))?;
            writer.write_all(&i.to_le_bytes())?;
        }
    }

    Ok(())
}

/// Write a point cloud as binary little endian PLY, colours and normals included when present.
pub fn write_ply_pointcloud<W: Write + ?Sized>(
    writer: &mut W,
    cloud: &PointCloud,
) -> Result<(), MeshIoError> {
    let mut header = String::from("ply\nformat binary_little_endian 1.0\ncomment photomesh\n");
    header.push_str(&format!("element vertex {}\n", cloud.len()));
    header.push_str("property float x\nproperty float y\nproperty float z\n");
    if cloud.colors().is_some() {
        header.push_str("property uchar red\nproperty uchar green\nproperty uchar blue\n");
    }
    if cloud.normals().is_some() {
        header.push_str("property float nx\nproperty float ny\nproperty float nz\n");
    }
    header.push_str("end_header\n");
    writer.write_all(header.as_bytes())?;

    for (i, p) in cloud.points().iter().enumerate() {
        write_f32s(writer, p)?;
        if let Some(colors) = cloud.colors() {
            writer.write_all(&colors[i])?;
        }
        if let Some(normals) = cloud.normals() {
            write_f32s(writer, &normals[i])?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split_header(bytes: &[u8]) -> (String, &[u8]) {
        let marker = b"end_header\n";
        let end = bytes
            .windows(marker.len())
            .position(|w| w == marker)
            .map(|p| p + marker.len())
            .unwrap_or(bytes.len());
        (String::from_utf8_lossy(&bytes[..end]).into_owned(), &bytes[end..])
    }

    #[test]
    fn test_ply_mesh() -> Result<(), MeshIoError> {
        let mesh = TriangleMesh {
            vertices: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            faces: vec![[0, 1, 2]],
            colors: Some(vec![[1, 2, 3]; 3]),
            densities: Some(vec![0.5; 3]),
        };
        let mut out = Vec::new();
        write_ply_mesh(&mut out, &mesh)?;

        let (header, body) = split_header(&out);
        assert!(header.contains("element vertex 3\n"));
        assert!(header.contains("element face 1\n"));
        assert!(header.contains("property uchar red\n"));
        assert!(header.contains("property float density\n"));

        // xyz + normal + rgb + density per vertex, count byte + 3 ints per face
        let vertex_size = 12 + 12 + 3 + 4;
        assert_eq!(body.len(), 3 * vertex_size + 13);

        let second_x = f32::from_le_bytes([
            body[vertex_size],
            body[vertex_size + 1],
            body[vertex_size + 2],
            body[vertex_size + 3],
        ]);
        assert_eq!(second_x, 1.0);
        assert_eq!(&body[24..27], &[1, 2, 3]);
        assert_eq!(body[3 * vertex_size], 3);
        Ok(())
    }

    #[test]
    fn test_ply_pointcloud() -> Result<(), Box<dyn std::error::Error>> {
        let cloud = PointCloud::new(
            vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]],
            Some(vec![[255, 128, 0], [0, 0, 0]]),
            Some(vec![[0.0, 0.0, 1.0]; 2]),
        )?;
        let mut out = Vec::new();
        write_ply_pointcloud(&mut out, &cloud)?;

        let (header, body) = split_header(&out);
        assert!(header.starts_with("ply\nformat binary_little_endian 1.0\n"));
        assert!(header.contains("element vertex 2\n"));
        assert!(!header.contains("element face"));
        assert_eq!(body.len(), 2 * (12 + 3 + 12));
        assert_eq!(&body[12..15], &[255, 128, 0]);
        Ok(())
    }
}
