//! glTF 2.0 binary container.

use std::io::Write;

use serde_json::json;

use super::MeshIoError;
use crate::mesh::TriangleMesh;

const GLB_MAGIC: u32 = 0x4654_6C67;
const GLB_VERSION: u32 = 2;
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;

const COMPONENT_UNSIGNED_BYTE: u32 = 5121;
const COMPONENT_UNSIGNED_INT: u32 = 5125;
const COMPONENT_FLOAT: u32 = 5126;
const TARGET_ARRAY_BUFFER: u32 = 34962;
const TARGET_ELEMENT_ARRAY_BUFFER: u32 = 34963;
const MODE_TRIANGLES: u32 = 4;

fn pad_to_4(buf: &mut Vec<u8>, fill: u8) {
    while buf.len() % 4 != 0 {
        buf.push(fill);
    }
}

fn to_u32(len: usize) -> Result<u32, MeshIoError> {
    u32::try_from(len).map_err(|_| MeshIoError::TooLarge(len))
}

/// Serialize a mesh as a single-buffer glb with positions, normals, optional vertex colours and
/// triangle indices.
pub fn write_glb<W: Write + ?Sized>(
    writer: &mut W,
    mesh: &TriangleMesh,
) -> Result<(), MeshIoError> {
    let n = mesh.num_vertices();
    let normals = mesh.vertex_normals();

    let mut bin = Vec::with_capacity(n * 28 + mesh.num_faces() * 12);
    let mut views = Vec::new();
    let mut accessors = Vec::new();
    let mut attributes = serde_json::Map::new();

    // POSITION, with the bounds glTF requires
    let mut lo = [f32::INFINITY; 3];
    let mut hi = [f32::NEG_INFINITY; 3];
    let start = bin.len();
    for v in &mesh.vertices {
        for (k, c) in v.iter().enumerate() {
            let c = *c as f32;
            lo[k] = lo[k].min(c);
            hi[k] = hi[k].max(c);
            bin.extend_from_slice(&c.to_le_bytes());
        }
    }
    views.push(json!({
        "buffer": 0,
        "byteOffset": start,
        "byteLength": bin.len() - start,
        "target": TARGET_ARRAY_BUFFER,
    }));
    accessors.push(json!({
        "bufferView": views.len() - 1,
        "componentType": COMPONENT_FLOAT,
        "count": n,
        "type": "VEC3",
        "min": lo,
        "max": hi,
    }));
    attributes.insert("POSITION".into(), json!(accessors.len() - 1));

    let start = bin.len();
    for nrm in &normals {
        for c in nrm {
            bin.extend_from_slice(&(*c as f32).to_le_bytes());
        }
    }
    views.push(json!({
        "buffer": 0,
        "byteOffset": start,
        "byteLength": bin.len() - start,
        "target": TARGET_ARRAY_BUFFER,
    }));
    accessors.push(json!({
        "bufferView": views.len() - 1,
        "componentType": COMPONENT_FLOAT,
        "count": n,
        "type": "VEC3",
    }));
    attributes.insert("NORMAL".into(), json!(accessors.len() - 1));

    if let Some(colors) = &mesh.colors {
        let start = bin.len();
        for c in colors {
            bin.extend_from_slice(&[c[0], c[1], c[2], 255]);
        }
        views.push(json!({
            "buffer": 0,
            "byteOffset": start,
            "byteLength": bin.len() - start,
            "target": TARGET_ARRAY_BUFFER,
        }));
        accessors.push(json!({
            "bufferView": views.len() - 1,
            "componentType": COMPONENT_UNSIGNED_BYTE,
            "normalized": true,
            "count": n,
            "type": "VEC4",
        }));
        attributes.insert("COLOR_0".into(), json!(accessors.len() - 1));
    }

    let start = bin.len();
    for f in &mesh.faces {
        for i in f {
            bin.extend_from_slice(&i.to_le_bytes());
        }
    }
    views.push(json!({
        "buffer": 0,
        "byteOffset": start,
        "byteLength": bin.len() - start,
        "target": TARGET_ELEMENT_ARRAY_BUFFER,
    }));
    accessors.push(json!({
        "bufferView": views.len() - 1,
        "componentType": COMPONENT_UNSIGNED_INT,
        "count": mesh.num_faces() * 3,
        "type": "SCALAR",
    }));
    let indices = accessors.len() - 1;

    let doc = json!({
        "asset": { "version": "2.0", "generator": "photomesh" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 0 }],
        "meshes": [{
            "primitives": [{
                "attributes": attributes,
                "indices": indices,
                "mode": MODE_TRIANGLES,
            }]
        }],
        "buffers": [{ "byteLength": bin.len() }],
        "bufferViews": views,
        "accessors": accessors,
    });

    let mut json_chunk = serde_json::to_vec(&doc)?;
    pad_to_4(&mut json_chunk, b' ');
    pad_to_4(&mut bin, 0);

    let total = to_u32(12 + 8 + json_chunk.len() + 8 + bin.len())?;

    writer.write_all(&GLB_MAGIC.to_le_bytes())?;
    writer.write_all(&GLB_VERSION.to_le_bytes())?;
    writer.write_all(&total.to_le_bytes())?;

    writer.write_all(&to_u32(json_chunk.len())?.to_le_bytes())?;
    writer.write_all(&CHUNK_JSON.to_le_bytes())?;
    writer.write_all(&json_chunk)?;

    writer.write_all(&to_u32(bin.len())?.to_le_bytes())?;
    writer.write_all(&CHUNK_BIN.to_le_bytes())?;
    writer.write_all(&bin)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_u32(b: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
    }

    #[test]
    fn test_glb_layout() -> Result<(), MeshIoError> {
        let mesh = TriangleMesh {
            vertices: vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 2.0, 0.0],
                [0.0, 0.0, 3.0],
            ],
            faces: vec![[0, 1, 2], [0, 2, 3]],
            colors: Some(vec![[10, 20, 30]; 4]),
            densities: None,
        };
        let mut out = Vec::new();
        write_glb(&mut out, &mesh)?;

        assert_eq!(&out[0..4], b"glTF");
        assert_eq!(read_u32(&out, 4), 2);
        assert_eq!(read_u32(&out, 8) as usize, out.len());

        let json_len = read_u32(&out, 12) as usize;
        assert_eq!(json_len % 4, 0);
        assert_eq!(read_u32(&out, 16), CHUNK_JSON);
        let doc: serde_json::Value = serde_json::from_slice(&out[20..20 + json_len])?;

        let bin_header = 20 + json_len;
        let bin_len = read_u32(&out, bin_header) as usize;
        assert_eq!(read_u32(&out, bin_header + 4), CHUNK_BIN);
        assert_eq!(bin_header + 8 + bin_len, out.len());
        // positions, normals, colours and indices
        assert_eq!(bin_len, 4 * 12 + 4 * 12 + 4 * 4 + 6 * 4);
        assert_eq!(doc["buffers"][0]["byteLength"], bin_len);

        let prim = &doc["meshes"][0]["primitives"][0];
        assert_eq!(prim["attributes"]["POSITION"], 0);
        assert_eq!(prim["attributes"]["NORMAL"], 1);
        assert_eq!(prim["attributes"]["COLOR_0"], 2);
        assert_eq!(prim["indices"], 3);
        assert_eq!(doc["accessors"][3]["count"], 6);
        assert_eq!(doc["accessors"][0]["max"][2], 3.0);
        assert_eq!(doc["bufferViews"][3]["target"], TARGET_ELEMENT_ARRAY_BUFFER);

        // first index of the second face
        let indices_offset =
            bin_header + 8 + doc["bufferViews"][3]["byteOffset"].as_u64().unwrap_or(0) as usize;
        assert_eq!(read_u32(&out, indices_offset + 12), 0);
        assert_eq!(read_u32(&out, indices_offset + 16), 2);
        Ok(())
    }

    #[test]
    fn test_glb_without_colors() -> Result<(), MeshIoError> {
        let mesh = TriangleMesh {
            vertices: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            faces: vec![[0, 1, 2]],
            colors: None,
            densities: None,
        };
        let mut out = Vec::new();
        write_glb(&mut out, &mesh)?;
        let json_len = read_u32(&out, 12) as usize;
        let doc: serde_json::Value = serde_json::from_slice(&out[20..20 + json_len])?;
        assert!(doc["meshes"][0]["primitives"][0]["attributes"]
            .get("COLOR_0")
            .is_none());
        assert_eq!(doc["meshes"][0]["primitives"][0]["indices"], 2);
        Ok(())
    }
}
