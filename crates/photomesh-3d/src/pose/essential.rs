use glam::{DMat3, DVec2, DVec3};

use super::{PoseError, RelativePose};
use crate::linalg::{mat3_from_rows, smallest_right_singular_vector, skew, svd3};

/// Essential matrix of a relative pose, `E = [t]x R`.
pub fn essential_from_pose(pose: &RelativePose) -> DMat3 {
    skew(pose.translation) * pose.rotation
}

/// Enforce the (1,1,0) singular value constraint on an essential matrix.
pub fn enforce_essential_constraints(e: &DMat3) -> DMat3 {
    let svd = svd3(e);
    svd.u * DMat3::from_diagonal(DVec3::new(1.0, 1.0, 0.0)) * svd.v.transpose()
}

/// Check that an essential matrix has rank two.
///
/// # Errors
///
/// Returns [`PoseError::RankDeficient`] when the second singular value vanishes relative to the
/// first one, or when the matrix is not finite.
pub fn check_essential_rank(e: &DMat3) -> Result<(), PoseError> {
    let s = svd3(e).s;
    if !s.is_finite() || s.x <= f64::EPSILON || s.y < 1e-6 * s.x {
        return Err(PoseError::RankDeficient(s.to_array()));
    }
    Ok(())
}

/// Decompose an essential matrix into its four possible `(R, t)` solutions.
///
/// Rotations are proper and translations have unit norm.
pub fn decompose_essential(e: &DMat3) -> [(DMat3, DVec3); 4] {
    let svd = svd3(e);
    let mut u = svd.u;
    let mut v = svd.v;

    if u.determinant() < 0.0 {
        u.z_axis = -u.z_axis;
    }
    if v.determinant() < 0.0 {
        v.z_axis = -v.z_axis;
    }

    let w = DMat3::from_cols(
        DVec3::new(0.0, 1.0, 0.0),
        DVec3::new(-1.0, 0.0, 0.0),
        DVec3::new(0.0, 0.0, 1.0),
    );

    let r1 = u * w * v.transpose();
    let r2 = u * w.transpose() * v.transpose();
    let t = u.z_axis.normalize_or_zero();

    [(r1, t), (r1, -t), (r2, t), (r2, -t)]
}

/// Squared Sampson distance of a correspondence to the epipolar constraint `x2^T E x1 = 0`.
///
/// Points are expressed in the same coordinates as the matrix (normalized image coordinates for
/// an essential matrix).
pub fn sampson_distance(e: &DMat3, x1: DVec2, x2: DVec2) -> f64 {
    let x1h = x1.extend(1.0);
    let x2h = x2.extend(1.0);

    let ex1 = *e * x1h;
    let etx2 = e.transpose() * x2h;
    let num = x2h.dot(ex1);
    let den = ex1.x * ex1.x + ex1.y * ex1.y + etx2.x * etx2.x + etx2.y * etx2.y;

    if den <= f64::EPSILON {
        return f64::INFINITY;
    }
    num * num / den
}

/// Linear essential matrix estimate from eight or more normalized correspondences.
///
/// The points are conditioned with a similarity transform before solving the design system and
/// the result is projected onto the essential manifold. Returns `None` with fewer than eight
/// correspondences.
pub fn essential_8point(x1: &[DVec2], x2: &[DVec2]) -> Option<DMat3> {
    if x1.len() != x2.len() || x1.len() < 8 {
        return None;
    }

    let (x1n, t1) = normalize_points_2d(x1);
    let (x2n, t2) = normalize_points_2d(x2);

    let n = x1n.len();
    let mut a = faer::Mat::<f64>::zeros(n.max(9), 9);
    for i in 0..n {
        let (x, y) = (x1n[i].x, x1n[i].y);
        let (xp, yp) = (x2n[i].x, x2n[i].y);
        a.write(i, 0, xp * x);
        a.write(i, 1, xp * y);
        a.write(i, 2, xp);
        a.write(i, 3, yp * x);
        a.write(i, 4, yp * y);
        a.write(i, 5, yp);
        a.write(i, 6, x);
        a.write(i, 7, y);
        a.write(i, 8, 1.0);
    }

    let f = smallest_right_singular_vector(&a);
    let e_norm = mat3_from_rows([[f[0], f[1], f[2]], [f[3], f[4], f[5]], [f[6], f[7], f[8]]]);

    // undo the conditioning, then project onto the essential manifold
    let e = t2.transpose() * e_norm * t1;
    let e = enforce_essential_constraints(&e);

    e.is_finite().then_some(e)
}

/// Similarity transform moving the centroid to the origin with a mean distance of sqrt(2).
fn normalize_points_2d(x: &[DVec2]) -> (Vec<DVec2>, DMat3) {
    let n = x.len() as f64;
    let mean = x.iter().fold(DVec2::ZERO, |acc, p| acc + *p) / n;
    let mean_dist = x.iter().map(|p| (*p - mean).length()).sum::<f64>() / n;
    let scale = if mean_dist > 0.0 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    let xn = x.iter().map(|p| (*p - mean) * scale).collect();
    let t = mat3_from_rows([
        [scale, 0.0, -scale * mean.x],
        [0.0, scale, -scale * mean.y],
        [0.0, 0.0, 1.0],
    ]);
    (xn, t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::at;
    use approx::assert_relative_eq;

    fn synthetic_scene(pose: &RelativePose, n: usize) -> (Vec<DVec2>, Vec<DVec2>) {
        let mut x1 = Vec::with_capacity(n);
        let mut x2 = Vec::with_capacity(n);
        for i in 0..n {
            let fi = i as f64;
            let p = DVec3::new(
                (fi * 0.37).sin() * 1.5,
                (fi * 0.71).cos() * 1.0,
                4.0 + (fi * 0.53).sin(),
            );
            let q = pose.transform_point(p);
            x1.push(DVec2::new(p.x / p.z, p.y / p.z));
            x2.push(DVec2::new(q.x / q.z, q.y / q.z));
        }
        (x1, x2)
    }

    fn test_pose() -> RelativePose {
        RelativePose {
            rotation: DMat3::from_rotation_y(0.1) * DMat3::from_rotation_x(-0.05),
            translation: DVec3::new(-1.0, 0.1, 0.05).normalize(),
        }
    }

    #[test]
    fn test_decompose_essential_recovers_pose() {
        let pose = test_pose();
        let e = essential_from_pose(&pose);

        let candidates = decompose_essential(&e);
        let mut found = false;
        for (r, t) in candidates {
            assert_relative_eq!(r.determinant(), 1.0, epsilon = 1e-9);
            assert_relative_eq!(t.length(), 1.0, epsilon = 1e-9);

            let dr = (r - pose.rotation).to_cols_array();
            let close_r = dr.iter().all(|d| d.abs() < 1e-6);
            if close_r && t.dot(pose.translation) > 0.999 {
                found = true;
            }
        }
        assert!(found);
    }

    #[test]
    fn test_enforce_essential_constraints_rank2() {
        let e = mat3_from_rows([[0.1, 0.4, -0.2], [0.2, -0.1, 0.5], [-0.3, 0.2, 0.3]]);
        let e_fixed = enforce_essential_constraints(&e);
        let s = svd3(&e_fixed).s;
        assert!(s.z.abs() < 1e-9);
        assert_relative_eq!(s.x, 1.0, epsilon = 1e-9);
        assert_relative_eq!(s.y, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rank_check() {
        let pose = test_pose();
        assert!(check_essential_rank(&essential_from_pose(&pose)).is_ok());

        let rank1 = mat3_from_rows([[1.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]]);
        assert!(matches!(
            check_essential_rank(&rank1),
            Err(PoseError::RankDeficient(_))
        ));
        assert!(check_essential_rank(&DMat3::ZERO).is_err());
    }

    #[test]
    fn test_sampson_distance_zero_on_inliers() {
        let pose = test_pose();
        let e = essential_from_pose(&pose);
        let (x1, x2) = synthetic_scene(&pose, 10);
        for (a, b) in x1.iter().zip(x2.iter()) {
            assert!(sampson_distance(&e, *a, *b) < 1e-20);
        }
        let off = sampson_distance(&e, x1[0], x2[0] + DVec2::new(0.0, 0.01));
        assert!(off > 1e-8);
    }

    #[test]
    fn test_essential_8point() {
        let pose = test_pose();
        let e_true = essential_from_pose(&pose);
        let (x1, x2) = synthetic_scene(&pose, 20);

        let e = essential_8point(&x1, &x2).unwrap();
        let sign = if at(&e, 0, 1) * at(&e_true, 0, 1) < 0.0 {
            -1.0
        } else {
            1.0
        };
        let scale = e_true.to_cols_array().iter().map(|v| v * v).sum::<f64>().sqrt()
            / e.to_cols_array().iter().map(|v| v * v).sum::<f64>().sqrt();
        for (a, b) in (e * (sign * scale))
            .to_cols_array()
            .iter()
            .zip(e_true.to_cols_array().iter())
        {
            assert_relative_eq!(a, b, epsilon = 1e-6);
        }

        assert!(essential_8point(&x1[..7], &x2[..7]).is_none());
    }
}
