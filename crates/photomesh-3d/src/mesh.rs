use glam::DVec3;

/// Errors found when validating a mesh.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum MeshError {
    /// A face references a vertex that does not exist.
    #[error("Face {face} references vertex {vertex} of {num_vertices}")]
    DanglingIndex {
        /// Index of the offending face.
        face: usize,
        /// Referenced vertex index.
        vertex: u32,
        /// Number of vertices in the mesh.
        num_vertices: usize,
    },

    /// A per-vertex attribute does not have one entry per vertex.
    #[error("Vertex attribute `{name}` has {found} entries for {expected} vertices")]
    AttributeLength {
        /// Attribute name.
        name: &'static str,
        /// Number of vertices.
        expected: usize,
        /// Number of attribute entries.
        found: usize,
    },

    /// A vertex coordinate is NaN or infinite.
    #[error("Vertex {0} is not finite")]
    NonFiniteVertex(usize),
}

/// An indexed triangle mesh with optional per-vertex colours and densities.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriangleMesh {
    /// List of 3D vertices.
    pub vertices: Vec<[f64; 3]>,
    /// List of triangles, each three indices into `vertices` in counter clockwise order seen
    /// from outside.
    pub faces: Vec<[u32; 3]>,
    /// Optional per-vertex RGB colours.
    pub colors: Option<Vec<[u8; 3]>>,
    /// Optional per-vertex sample density.
    pub densities: Option<Vec<f64>>,
}

impl TriangleMesh {
    /// Creates a new, empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of vertices.
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Number of faces.
    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// Whether the mesh has no faces.
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Check that every face references an existing vertex, attributes have one entry per
    /// vertex and all coordinates are finite.
    pub fn validate(&self) -> Result<(), MeshError> {
        let n = self.vertices.len();
        for (face, tri) in self.faces.iter().enumerate() {
            if let Some(&vertex) = tri.iter().find(|&&v| v as usize >= n) {
                return Err(MeshError::DanglingIndex {
                    face,
                    vertex,
                    num_vertices: n,
                });
            }
        }
        if let Some(colors) = &self.colors {
            if colors.len() != n {
                return Err(MeshError::AttributeLength {
                    name: "colors",
                    expected: n,
                    found: colors.len(),
                });
            }
        }
        if let Some(densities) = &self.densities {
            if densities.len() != n {
                return Err(MeshError::AttributeLength {
                    name: "densities",
                    expected: n,
                    found: densities.len(),
                });
            }
        }
        if let Some(i) = self
            .vertices
            .iter()
            .position(|v| v.iter().any(|c| !c.is_finite()))
        {
            return Err(MeshError::NonFiniteVertex(i));
        }
        Ok(())
    }

    /// Minimum and maximum corners of the vertex bounding box, `None` without vertices.
    pub fn bounds(&self) -> Option<(DVec3, DVec3)> {
        let first = DVec3::from_array(*self.vertices.first()?);
        Some(self.vertices.iter().map(|v| DVec3::from_array(*v)).fold(
            (first, first),
            |(lo, hi), v| (lo.min(v), hi.max(v)),
        ))
    }

    /// Area weighted vertex normals; isolated vertices get a zero normal.
    pub fn vertex_normals(&self) -> Vec<[f64; 3]> {
        let mut acc = vec![DVec3::ZERO; self.vertices.len()];
        for f in &self.faces {
            let [a, b, c] = f.map(|i| DVec3::from_array(self.vertices[i as usize]));
            // cross product length is twice the area
            let n = (b - a).cross(c - a);
            for &i in f {
                acc[i as usize] += n;
            }
        }
        acc.into_iter()
            .map(|n| n.normalize_or_zero().to_array())
            .collect()
    }

    /// Remove the vertices flagged in `remove` together with every face that references one,
    /// then compact the vertex indices.
    pub fn remove_vertices(&mut self, remove: &[bool]) {
        let mut remap = vec![u32::MAX; self.vertices.len()];
        let mut next = 0u32;
        for (i, slot) in remap.iter_mut().enumerate() {
            if !remove.get(i).copied().unwrap_or(false) {
                *slot = next;
                next += 1;
            }
        }

        let keep = |i: usize| remap[i] != u32::MAX;
        self.faces = self
            .faces
            .iter()
            .filter(|f| f.iter().all(|&v| keep(v as usize)))
            .map(|f| f.map(|v| remap[v as usize]))
            .collect();

        fn compact<T: Copy>(values: &[T], remap: &[u32]) -> Vec<T> {
            values
                .iter()
                .zip(remap.iter())
                .filter(|(_, r)| **r != u32::MAX)
                .map(|(v, _)| *v)
                .collect()
        }
        self.vertices = compact(&self.vertices, &remap);
        if let Some(colors) = &self.colors {
            self.colors = Some(compact(colors, &remap));
        }
        if let Some(densities) = &self.densities {
            self.densities = Some(compact(densities, &remap));
        }
    }

    /// Drop vertices no face references.
    pub fn remove_unreferenced_vertices(&mut self) {
        let mut used = vec![false; self.vertices.len()];
        for f in &self.faces {
            for &v in f {
                if let Some(u) = used.get_mut(v as usize) {
                    *u = true;
                }
            }
        }
        let remove: Vec<bool> = used.into_iter().map(|u| !u).collect();
        self.remove_vertices(&remove);
    }
}
