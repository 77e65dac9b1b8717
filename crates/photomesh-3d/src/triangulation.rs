use glam::{DMat3, DVec2, DVec3};

use crate::camera::CameraIntrinsics;
use crate::pose::RelativePose;

/// A 3x4 camera projection matrix, stored row-major.
pub type Projection = [[f64; 4]; 3];

/// Errors raised when triangulating a single correspondence.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum TriangulationError {
    /// The homogeneous scale of the solution vanishes; the rays are parallel.
    #[error("Correspondence {index} triangulates to a point at infinity")]
    PointAtInfinity {
        /// Index of the correspondence in the input.
        index: usize,
    },

    /// The solution contains NaN or infinite coordinates.
    #[error("Correspondence {index} triangulates to a non finite point")]
    NonFinite {
        /// Index of the correspondence in the input.
        index: usize,
    },
}

/// Points triangulated from a batch of correspondences.
#[derive(Debug, Clone, Default)]
pub struct Triangulation {
    /// Triangulated points in the first camera frame.
    pub points: Vec<DVec3>,
    /// Index of the originating correspondence for each point.
    pub indices: Vec<usize>,
    /// Number of correspondences dropped because they could not be triangulated.
    pub dropped: usize,
}

impl Triangulation {
    /// Number of triangulated points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether no point was triangulated.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Compose `K [R | t]`.
pub fn projection_matrix(k: &DMat3, r: &DMat3, t: DVec3) -> Projection {
    let kr = *k * *r;
    let kt = *k * t;
    let mut p = [[0.0; 4]; 3];
    for (i, row) in p.iter_mut().enumerate() {
        for j in 0..3 {
            row[j] = kr.col(j)[i];
        }
        row[3] = kt[i];
    }
    p
}

/// Project a point with a 3x4 projection matrix. Returns `None` on the camera plane.
pub fn project(p: &Projection, x: DVec3) -> Option<DVec2> {
    let xh = [x.x, x.y, x.z, 1.0];
    let row = |r: &[f64; 4]| r.iter().zip(xh.iter()).map(|(a, b)| a * b).sum::<f64>();
    let w = row(&p[2]);
    if w.abs() < 1e-12 {
        return None;
    }
    Some(DVec2::new(row(&p[0]) / w, row(&p[1]) / w))
}

/// Linear triangulation of a single correspondence by the direct linear transform.
///
/// Returns `None` when the homogeneous scale of the solution is (near) zero.
pub fn triangulate_dlt(p1: &Projection, p2: &Projection, x1: DVec2, x2: DVec2) -> Option<DVec3> {
    let mut a = faer::Mat::<f64>::zeros(4, 4);
    write_dlt_row(&mut a, 0, x1.x, &p1[2], &p1[0]);
    write_dlt_row(&mut a, 1, x1.y, &p1[2], &p1[1]);
    write_dlt_row(&mut a, 2, x2.x, &p2[2], &p2[0]);
    write_dlt_row(&mut a, 3, x2.y, &p2[2], &p2[1]);

    let svd = a.svd();
    let v = svd.v();
    let w = v.read(3, 3);
    if w.abs() < 1e-12 {
        return None;
    }
    Some(DVec3::new(
        v.read(0, 3) / w,
        v.read(1, 3) / w,
        v.read(2, 3) / w,
    ))
}

fn write_dlt_row(a: &mut faer::Mat<f64>, row: usize, x: f64, p3: &[f64; 4], p1: &[f64; 4]) {
    for j in 0..4 {
        a.write(row, j, x * p3[j] - p1[j]);
    }
}

/// Two-view triangulator for cameras sharing intrinsics, the first at the origin.
#[derive(Debug, Clone, Copy)]
pub struct Triangulator {
    p1: Projection,
    p2: Projection,
}

impl Triangulator {
    /// Build `P1 = K [I | 0]` and `P2 = K [R | t]`.
    pub fn new(pose: &RelativePose, intrinsics: &CameraIntrinsics) -> Self {
        let k = intrinsics.matrix();
        Self {
            p1: projection_matrix(&k, &DMat3::IDENTITY, DVec3::ZERO),
            p2: projection_matrix(&k, &pose.rotation, pose.translation),
        }
    }

    /// Projection matrices of both cameras.
    pub fn projections(&self) -> (&Projection, &Projection) {
        (&self.p1, &self.p2)
    }

    /// Triangulate correspondence `index` from its pixel coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`TriangulationError`] when the point lies at infinity or is not finite.
    pub fn triangulate_point(
        &self,
        index: usize,
        x1: DVec2,
        x2: DVec2,
    ) -> Result<DVec3, TriangulationError> {
        let x = triangulate_dlt(&self.p1, &self.p2, x1, x2)
            .ok_or(TriangulationError::PointAtInfinity { index })?;
        if !x.is_finite() {
            return Err(TriangulationError::NonFinite { index });
        }
        Ok(x)
    }

    /// Triangulate the correspondences selected by `mask`.
    ///
    /// Points that fail to triangulate are dropped and counted.
    pub fn triangulate(&self, x1: &[DVec2], x2: &[DVec2], mask: &[bool]) -> Triangulation {
        let mut out = Triangulation::default();
        for (index, ((a, b), keep)) in x1.iter().zip(x2.iter()).zip(mask.iter()).enumerate() {
            if !*keep {
                continue;
            }
            match self.triangulate_point(index, *a, *b) {
                Ok(x) => {
                    out.points.push(x);
                    out.indices.push(index);
                }
                Err(err) => {
                    log::warn!("dropping correspondence: {err}");
                    out.dropped += 1;
                }
            }
        }
        out
    }

    /// Reprojection errors in pixels of a point against both observations.
    pub fn reprojection_error(&self, x: DVec3, x1: DVec2, x2: DVec2) -> Option<(f64, f64)> {
        let r1 = project(&self.p1, x)?;
        let r2 = project(&self.p2, x)?;
        Some(((r1 - x1).length(), (r2 - x2).length()))
    }
}
