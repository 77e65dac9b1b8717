//! Marching tetrahedra over the hierarchy of cells.

use std::collections::HashMap;

use glam::DVec3;

use super::grid::{corner_key, CellKey, Hierarchy, NodeKey};
use crate::mesh::TriangleMesh;

/// Split of a cube into six tetrahedra sharing the diagonal from corner 0 to corner 7.
const TETRAHEDRA: [[usize; 4]; 6] = [
    [0, 1, 3, 7],
    [0, 3, 2, 7],
    [0, 2, 6, 7],
    [0, 6, 4, 7],
    [0, 4, 5, 7],
    [0, 5, 1, 7],
];

/// Incrementally built isosurface with edge vertices shared between cells.
struct SurfaceBuilder {
    iso: f64,
    vertices: Vec<[f64; 3]>,
    faces: Vec<[u32; 3]>,
    edges: HashMap<(NodeKey, NodeKey), u32>,
}

struct Corner {
    key: NodeKey,
    position: DVec3,
    value: f64,
}

impl SurfaceBuilder {
    fn new(iso: f64) -> Self {
        Self {
            iso,
            vertices: Vec::new(),
            faces: Vec::new(),
            edges: HashMap::new(),
        }
    }

    /// Vertex where the isosurface crosses the edge between two corners on opposite sides.
    fn edge_vertex(&mut self, a: &Corner, b: &Corner) -> u32 {
        let key = if a.key <= b.key {
            (a.key, b.key)
        } else {
            (b.key, a.key)
        };
        if let Some(v) = self.edges.get(&key) {
            return *v;
        }

        let denom = b.value - a.value;
        let t = if denom.abs() > f64::EPSILON {
            ((self.iso - a.value) / denom).clamp(0.0, 1.0)
        } else {
            0.5
        };
        let p = a.position + (b.position - a.position) * t;

        let index = self.vertices.len() as u32;
        self.vertices.push(p.to_array());
        self.edges.insert(key, index);
        index
    }

    /// Emit a triangle facing away from the inside corners.
    fn push_triangle(&mut self, mut tri: [u32; 3], inside: DVec3, outside: DVec3) {
        let [a, b, c] = tri.map(|i| DVec3::from_array(self.vertices[i as usize]));
        let normal = (b - a).cross(c - a);
        if normal.dot(outside - inside) < 0.0 {
            tri.swap(1, 2);
        }
        self.faces.push(tri);
    }

    fn polygonize_tetrahedron(&mut self, corners: [&Corner; 4]) {
        let iso = self.iso;
        let (inside, outside): (Vec<&Corner>, Vec<&Corner>) =
            corners.iter().partition(|c| c.value > iso);
        if inside.is_empty() || outside.is_empty() {
            return;
        }

        let centroid = |cs: &[&Corner]| {
            cs.iter().fold(DVec3::ZERO, |acc, c| acc + c.position) / cs.len() as f64
        };
        let (ci, co) = (centroid(&inside), centroid(&outside));

        match (inside.len(), outside.len()) {
            (1, 3) => {
                let tri = [
                    self.edge_vertex(inside[0], outside[0]),
                    self.edge_vertex(inside[0], outside[1]),
                    self.edge_vertex(inside[0], outside[2]),
                ];
                self.push_triangle(tri, ci, co);
            }
            (3, 1) => {
                let tri = [
                    self.edge_vertex(inside[0], outside[0]),
                    self.edge_vertex(inside[1], outside[0]),
                    self.edge_vertex(inside[2], outside[0]),
                ];
                self.push_triangle(tri, ci, co);
            }
            _ => {
                // the four crossed edges form a cycle
                let q = [
                    self.edge_vertex(inside[0], outside[0]),
                    self.edge_vertex(inside[0], outside[1]),
                    self.edge_vertex(inside[1], outside[1]),
                    self.edge_vertex(inside[1], outside[0]),
                ];
                self.push_triangle([q[0], q[1], q[2]], ci, co);
                self.push_triangle([q[0], q[2], q[3]], ci, co);
            }
        }
    }

    fn polygonize_cell(&mut self, hierarchy: &Hierarchy, li: usize, cell: CellKey) {
        let level = &hierarchy.levels[li];
        let shift = hierarchy.max_depth() - level.depth;

        let corners: Vec<Corner> = (0..8u32)
            .map(|bits| {
                let key = corner_key(cell, bits);
                Corner {
                    key: key.map(|c| c << shift),
                    position: level.node_position(&hierarchy.cube, key),
                    value: hierarchy.value(li, key),
                }
            })
            .collect();

        let any_in = corners.iter().any(|c| c.value > self.iso);
        let any_out = corners.iter().any(|c| c.value <= self.iso);
        if !(any_in && any_out) {
            return;
        }

        for tet in TETRAHEDRA {
            self.polygonize_tetrahedron(tet.map(|i| &corners[i]));
        }
    }
}

fn has_refined_children(hierarchy: &Hierarchy, li: usize, cell: CellKey) -> bool {
    let Some(next) = hierarchy.levels.get(li + 1) else {
        return false;
    };
    (0..8u32).any(|bits| {
        let child = corner_key(cell.map(|c| c * 2), bits);
        next.has_cell(child)
    })
}

/// Extract the isosurface `value == iso` of the hierarchy.
///
/// Each cell is polygonized at the finest level that refines it. Faces point toward
/// decreasing values.
pub(crate) fn extract_isosurface(hierarchy: &Hierarchy, iso: f64) -> TriangleMesh {
    let mut builder = SurfaceBuilder::new(iso);

    let Some(coarse) = hierarchy.levels.first() else {
        return TriangleMesh::new();
    };
    let mut cells = Vec::with_capacity((coarse.res as usize).pow(3));
    for z in 0..coarse.res {
        for y in 0..coarse.res {
            for x in 0..coarse.res {
                cells.push([x, y, z]);
            }
        }
    }

    for li in 0..hierarchy.levels.len() {
        let mut refined = Vec::new();
        for cell in cells {
            if has_refined_children(hierarchy, li, cell) {
                let base = cell.map(|c| c * 2);
                refined.extend((0..8u32).map(|bits| corner_key(base, bits)));
            } else {
                builder.polygonize_cell(hierarchy, li, cell);
            }
        }
        cells = refined;
    }

    TriangleMesh {
        vertices: builder.vertices,
        faces: builder.faces,
        colors: None,
        densities: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::grid::{Cube, Level};

    /// Dense single level holding the signed field `r - |p - c|` of a sphere.
    fn sphere_hierarchy(depth: u32, radius: f64) -> Hierarchy {
        let cube = Cube {
            origin: DVec3::splat(-1.0),
            size: 2.0,
        };
        let mut level = Level::dense(&cube, depth);
        for key in level.active_nodes() {
            let p = level.node_position(&cube, key);
            level.values.insert(key, radius - p.length());
        }
        Hierarchy {
            cube,
            levels: vec![level],
        }
    }

    #[test]
    fn test_sphere_isosurface() {
        let h = sphere_hierarchy(4, 0.6);
        let mesh = extract_isosurface(&h, 0.0);

        assert!(mesh.num_faces() > 100);
        assert_eq!(mesh.validate(), Ok(()));
        for v in &mesh.vertices {
            let r = DVec3::from_array(*v).length();
            assert!((r - 0.6).abs() < 0.1, "vertex at radius {r}");
        }

        // faces point outward
        for f in &mesh.faces {
            let [a, b, c] = f.map(|i| DVec3::from_array(mesh.vertices[i as usize]));
            let n = (b - a).cross(c - a);
            assert!(n.dot((a + b + c) / 3.0) >= 0.0);
        }
    }

    #[test]
    fn test_shared_vertices() {
        let h = sphere_hierarchy(3, 0.5);
        let mesh = extract_isosurface(&h, 0.0);
        // a closed surface references every vertex from several faces
        let mut uses = vec![0usize; mesh.num_vertices()];
        for f in &mesh.faces {
            for &i in f {
                uses[i as usize] += 1;
            }
        }
        assert!(uses.iter().all(|&u| u >= 3));
    }

    #[test]
    fn test_no_crossing() {
        // every node below the iso-value
        let h = sphere_hierarchy(2, -1.0);
        assert!(extract_isosurface(&h, 0.0).is_empty());
    }

    #[test]
    fn test_refined_cells_use_finer_level() {
        let cube = Cube {
            origin: DVec3::splat(-1.0),
            size: 2.0,
        };
        let mut h = sphere_hierarchy(2, 0.6);
        let samples = [crate::surface::grid::Sample {
            position: DVec3::new(0.6, 0.0, 0.0),
            normal: DVec3::X,
        }];
        let mut fine = Level::banded(&cube, 3, &samples, 0);
        for key in fine.active_nodes() {
            let p = fine.node_position(&cube, key);
            fine.values.insert(key, 0.6 - p.length());
        }
        h.levels.push(fine);

        let mesh = extract_isosurface(&h, 0.0);
        assert!(!mesh.is_empty());
        assert_eq!(mesh.validate(), Ok(()));
    }
}
