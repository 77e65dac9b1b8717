//! # Surface reconstruction
//!
//! Poisson reconstruction of an indicator function from an oriented point cloud. The Poisson
//! equation is solved coarse to fine on band limited grids and the isosurface is polygonized
//! with marching tetrahedra.

mod density;
mod extract;
mod grid;
mod solver;

use glam::DVec3;
use kiddo::immutable::float::kdtree::ImmutableKdTree;
use serde::{Deserialize, Serialize};

use crate::deadline::Deadline;
use crate::linalg::principal_axes;
use crate::mesh::{MeshError, TriangleMesh};
use crate::pointcloud::PointCloud;
use density::{prune_low_density, vertex_colors, vertex_densities, SampleTree};
use grid::{Cube, Hierarchy, Level, Sample};
use solver::{solve_level, CgSettings};

/// Errors raised by surface reconstruction.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum SurfaceError {
    /// Too few points to fit a surface.
    #[error("Need at least {required} points, got {found}")]
    TooFewPoints {
        /// Minimum number of points.
        required: usize,
        /// Number of points provided.
        found: usize,
    },

    /// The point cloud carries no normals.
    #[error("Point cloud has no normals")]
    MissingNormals,

    /// The points do not span a volume.
    #[error("Degenerate point cloud: {0}")]
    DegenerateCloud(&'static str),

    /// The linear solver produced a NaN or infinite residual.
    #[error("Poisson solve at depth {depth} diverged")]
    NonFiniteResidual {
        /// Grid depth of the failing solve.
        depth: u32,
    },

    /// The linear solver did not reach its tolerance.
    #[error("Poisson solve at depth {depth} did not converge after {iterations} iterations (relative residual {residual:e})")]
    NotConverged {
        /// Grid depth of the failing solve.
        depth: u32,
        /// Iterations run.
        iterations: usize,
        /// Final relative residual.
        residual: f64,
    },

    /// The extracted mesh has no faces.
    #[error("Reconstructed mesh has no faces")]
    EmptyMesh,

    /// The extracted mesh is malformed.
    #[error("Reconstructed mesh is invalid: {0}")]
    InvalidMesh(#[from] MeshError),

    /// The deadline expired during the fit.
    #[error("Surface reconstruction timed out")]
    Timeout,
}

/// Capability to fit a triangle mesh to an oriented point cloud.
pub trait SurfaceFitter {
    /// Fit a surface, giving up with [`SurfaceError::Timeout`] once `deadline` expires.
    fn fit(&self, cloud: &PointCloud, deadline: &Deadline) -> Result<TriangleMesh, SurfaceError>;
}

/// Parameters of the Poisson reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoissonConfig {
    /// Grid depth of the finest level; it has `2^depth` cells per axis.
    pub depth: u32,
    /// Cap the depth by the number of samples, `ceil(log2(sqrt(N))) + 1`.
    pub adaptive_depth: bool,
    /// Depth of the dense coarse solve.
    pub coarse_depth: u32,
    /// Ratio between the reconstruction cube and the largest bounding box extent.
    pub scale: f64,
    /// Cells kept around the samples on refined levels.
    pub band_width: u32,
    /// Relative residual at which conjugate gradients stop.
    pub cg_tolerance: f64,
    /// Iteration cap of conjugate gradients.
    pub cg_max_iterations: usize,
    /// Vertices with a density below this quantile are removed.
    pub density_quantile: f64,
    /// Minimum number of points accepted.
    pub min_points: usize,
}

impl Default for PoissonConfig {
    fn default() -> Self {
        Self {
            depth: 8,
            adaptive_depth: false,
            coarse_depth: 5,
            scale: 1.1,
            band_width: 3,
            cg_tolerance: 1e-6,
            cg_max_iterations: 2000,
            density_quantile: 0.1,
            min_points: 8,
        }
    }
}

impl PoissonConfig {
    /// Set the grid depth of the finest level.
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Cap the depth by the number of samples.
    pub fn with_adaptive_depth(mut self, adaptive: bool) -> Self {
        self.adaptive_depth = adaptive;
        self
    }

    /// Set the density quantile used for pruning.
    pub fn with_density_quantile(mut self, quantile: f64) -> Self {
        self.density_quantile = quantile;
        self
    }

    /// Depth solved for `n` points.
    ///
    /// This is `depth` unless `adaptive_depth` is set, in which case sparse clouds get coarser
    /// grids, never below the coarse depth.
    pub fn effective_depth(&self, n: usize) -> u32 {
        if !self.adaptive_depth {
            return self.depth;
        }
        let coarse = self.coarse_depth.min(self.depth);
        let by_count = ((n.max(1) as f64).sqrt().log2().ceil() as u32).saturating_add(1);
        self.depth.min(by_count).max(coarse)
    }
}

/// Poisson surface reconstruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoissonReconstructor {
    /// Reconstruction parameters.
    pub config: PoissonConfig,
}

impl PoissonReconstructor {
    /// Create a reconstructor with the given parameters.
    pub fn new(config: PoissonConfig) -> Self {
        Self { config }
    }

    fn samples(&self, cloud: &PointCloud) -> Result<Vec<Sample>, SurfaceError> {
        if cloud.len() < self.config.min_points {
            return Err(SurfaceError::TooFewPoints {
                required: self.config.min_points,
                found: cloud.len(),
            });
        }
        let normals = cloud.normals().ok_or(SurfaceError::MissingNormals)?;

        Ok(cloud
            .points()
            .iter()
            .zip(normals.iter())
            .map(|(p, n)| Sample {
                position: DVec3::from_array(*p),
                normal: DVec3::from_array(*n).normalize_or_zero(),
            })
            .collect())
    }

    fn check_extent(samples: &[Sample], lo: DVec3, hi: DVec3) -> Result<(), SurfaceError> {
        if (hi - lo).max_element() <= f64::EPSILON {
            return Err(SurfaceError::DegenerateCloud("zero extent"));
        }
        let positions: Vec<DVec3> = samples.iter().map(|s| s.position).collect();
        let (_, axes) = principal_axes(&positions);
        if axes.s.z < 1e-6 * axes.s.x {
            return Err(SurfaceError::DegenerateCloud("points are coplanar"));
        }
        Ok(())
    }
}

impl SurfaceFitter for PoissonReconstructor {
    fn fit(&self, cloud: &PointCloud, deadline: &Deadline) -> Result<TriangleMesh, SurfaceError> {
        let samples = self.samples(cloud)?;
        let (lo, hi) = cloud.bounds().ok_or(SurfaceError::TooFewPoints {
            required: self.config.min_points,
            found: 0,
        })?;
        Self::check_extent(&samples, lo, hi)?;

        let cube = Cube::enclosing(lo, hi, self.config.scale);
        let depth = self.config.effective_depth(samples.len());
        let coarse_depth = self.config.coarse_depth.min(depth);

        let mut levels = vec![Level::dense(&cube, coarse_depth)];
        for d in coarse_depth + 1..=depth {
            levels.push(Level::banded(&cube, d, &samples, self.config.band_width));
        }
        let mut hierarchy = Hierarchy { cube, levels };

        let settings = CgSettings {
            tolerance: self.config.cg_tolerance,
            max_iterations: self.config.cg_max_iterations,
        };
        for li in 0..hierarchy.levels.len() {
            if deadline.expired() {
                return Err(SurfaceError::Timeout);
            }
            solve_level(&mut hierarchy, li, &samples, &settings, deadline)?;
        }

        let iso = samples
            .iter()
            .map(|s| hierarchy.value_at(s.position))
            .sum::<f64>()
            / samples.len() as f64;

        let mut mesh = extract::extract_isosurface(&hierarchy, iso);
        log::debug!(
            "poisson depth {} (coarse {}), iso {:.4}: {} vertices, {} faces",
            depth,
            coarse_depth,
            iso,
            mesh.num_vertices(),
            mesh.num_faces()
        );
        if mesh.is_empty() {
            return Err(SurfaceError::EmptyMesh);
        }

        let points = cloud.points();
        let tree: SampleTree = ImmutableKdTree::new_from_slice(points);
        let sigma = 2.0 * cube.cell_size(depth);
        mesh.densities = Some(vertex_densities(&mesh.vertices, &tree, sigma));
        if let Some(colors) = cloud.colors() {
            mesh.colors = Some(vertex_colors(&mesh.vertices, &tree, colors));
        }

        let removed = prune_low_density(&mut mesh, self.config.density_quantile);
        mesh.remove_unreferenced_vertices();
        log::debug!("removed {removed} low density vertices");

        if mesh.is_empty() {
            return Err(SurfaceError::EmptyMesh);
        }
        mesh.validate()?;

        Ok(mesh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sphere_cloud(n: usize, radius: f64) -> PointCloud {
        let golden = std::f64::consts::PI * (3.0 - 5f64.sqrt());
        let mut points = Vec::with_capacity(n);
        let mut normals = Vec::with_capacity(n);
        for i in 0..n {
            let y = 1.0 - 2.0 * (i as f64 + 0.5) / n as f64;
            let r = (1.0 - y * y).sqrt();
            let theta = golden * i as f64;
            let dir = DVec3::new(r * theta.cos(), y, r * theta.sin());
            points.push((dir * radius + DVec3::new(0.0, 0.0, 4.0)).to_array());
            normals.push(dir.to_array());
        }
        let colors = vec![[200, 100, 50]; n];
        PointCloud::new(points, Some(colors), Some(normals)).unwrap()
    }

    #[test]
    fn test_effective_depth() {
        let config = PoissonConfig::default();
        assert_eq!(config.effective_depth(8), 8);
        assert_eq!(config.effective_depth(82), 8);
        assert_eq!(config.with_depth(6).effective_depth(500), 6);

        let config = config.with_adaptive_depth(true);
        assert_eq!(config.effective_depth(8), 5);
        assert_eq!(config.effective_depth(600), 6);
        assert_eq!(config.effective_depth(1_000_000), 8);
        assert_eq!(config.with_depth(4).effective_depth(1_000_000), 4);
    }

    #[test]
    fn test_fit_sphere() {
        let cloud = sphere_cloud(600, 1.0);
        let fitter = PoissonReconstructor::new(PoissonConfig::default().with_depth(6));
        let mesh = fitter.fit(&cloud, &Deadline::never()).unwrap();

        assert!(mesh.num_faces() > 200);
        assert_eq!(mesh.validate(), Ok(()));
        assert_eq!(mesh.colors.as_ref().map(|c| c[0]), Some([200, 100, 50]));

        let center = DVec3::new(0.0, 0.0, 4.0);
        let mean_radius = mesh
            .vertices
            .iter()
            .map(|v| (DVec3::from_array(*v) - center).length())
            .sum::<f64>()
            / mesh.num_vertices() as f64;
        assert!((mean_radius - 1.0).abs() < 0.15, "mean radius {mean_radius}");

        // outward orientation on average
        let outward: f64 = mesh
            .faces
            .iter()
            .map(|f| {
                let [a, b, c] = f.map(|i| DVec3::from_array(mesh.vertices[i as usize]));
                (b - a).cross(c - a).dot((a + b + c) / 3.0 - center)
            })
            .sum();
        assert!(outward > 0.0);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let cloud = sphere_cloud(300, 0.5);
        let fitter = PoissonReconstructor::new(PoissonConfig::default().with_depth(5));
        let a = fitter.fit(&cloud, &Deadline::never()).unwrap();
        let b = fitter.fit(&cloud, &Deadline::never()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_fit_rejects_degenerate_input() {
        let fitter = PoissonReconstructor::default();

        let few = PointCloud::new(
            vec![[0.0, 0.0, 1.0], [1.0, 0.0, 1.0]],
            None,
            Some(vec![[0.0, 0.0, -1.0]; 2]),
        )
        .unwrap();
        assert_eq!(
            fitter.fit(&few, &Deadline::never()),
            Err(SurfaceError::TooFewPoints {
                required: 8,
                found: 2
            })
        );

        let no_normals = PointCloud::new(vec![[0.0; 3]; 10], None, None).unwrap();
        assert_eq!(
            fitter.fit(&no_normals, &Deadline::never()),
            Err(SurfaceError::MissingNormals)
        );

        let same =
            PointCloud::new(vec![[1.0; 3]; 10], None, Some(vec![[0.0, 0.0, 1.0]; 10])).unwrap();
        assert_eq!(
            fitter.fit(&same, &Deadline::never()),
            Err(SurfaceError::DegenerateCloud("zero extent"))
        );

        let plane: Vec<[f64; 3]> = (0..25)
            .map(|i| [(i % 5) as f64, (i / 5) as f64, 2.0])
            .collect();
        let plane = PointCloud::new(plane, None, Some(vec![[0.0, 0.0, -1.0]; 25])).unwrap();
        assert_eq!(
            fitter.fit(&plane, &Deadline::never()),
            Err(SurfaceError::DegenerateCloud("points are coplanar"))
        );
    }

    #[test]
    fn test_fit_timeout() {
        let cloud = sphere_cloud(100, 1.0);
        let deadline = Deadline::after(std::time::Duration::ZERO);
        assert_eq!(
            PoissonReconstructor::default().fit(&cloud, &deadline),
            Err(SurfaceError::Timeout)
        );
    }
}
