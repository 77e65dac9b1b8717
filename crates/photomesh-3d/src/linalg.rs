use glam::{DMat3, DVec3};

/// Singular value decomposition of a 3x3 matrix, `m = U * diag(s) * V^T`.
///
/// Singular values are sorted in decreasing order.
#[derive(Debug, Clone, Copy)]
pub struct Svd3 {
    /// Left singular vectors as columns.
    pub u: DMat3,
    /// Singular values.
    pub s: DVec3,
    /// Right singular vectors as columns.
    pub v: DMat3,
}

/// Convert a glam matrix into a faer matrix.
pub fn to_faer_mat3(m: &DMat3) -> faer::Mat<f64> {
    let mut out = faer::Mat::<f64>::zeros(3, 3);
    for j in 0..3 {
        let col = m.col(j);
        for i in 0..3 {
            out.write(i, j, col[i]);
        }
    }
    out
}

/// Convert the top-left 3x3 block of a faer matrix into a glam matrix.
pub fn from_faer_mat3(m: faer::MatRef<'_, f64>) -> DMat3 {
    DMat3::from_cols(
        DVec3::new(m.read(0, 0), m.read(1, 0), m.read(2, 0)),
        DVec3::new(m.read(0, 1), m.read(1, 1), m.read(2, 1)),
        DVec3::new(m.read(0, 2), m.read(1, 2), m.read(2, 2)),
    )
}

/// Build a matrix from its rows.
pub fn mat3_from_rows(rows: [[f64; 3]; 3]) -> DMat3 {
    DMat3::from_cols_array_2d(&rows).transpose()
}

/// Element at `(row, col)`.
#[inline]
pub fn at(m: &DMat3, row: usize, col: usize) -> f64 {
    m.col(col)[row]
}

/// Compute the singular value decomposition of a 3x3 matrix.
pub fn svd3(m: &DMat3) -> Svd3 {
    let svd = to_faer_mat3(m).svd();
    let s = svd.s_diagonal();
    Svd3 {
        u: from_faer_mat3(svd.u()),
        s: DVec3::new(s[0], s[1], s[2]),
        v: from_faer_mat3(svd.v()),
    }
}

/// Cross product matrix, `skew(t) * x == t.cross(x)`.
pub fn skew(t: DVec3) -> DMat3 {
    DMat3::from_cols(
        DVec3::new(0.0, t.z, -t.y),
        DVec3::new(-t.z, 0.0, t.x),
        DVec3::new(t.y, -t.x, 0.0),
    )
}

/// Right singular vector of the smallest singular value of `a`, i.e. the least squares
/// solution of `a x = 0` with `|x| = 1`.
///
/// PRECONDITION: `a` has at least as many rows as columns, or the caller accepts any vector
/// of the nullspace.
pub fn smallest_right_singular_vector(a: &faer::Mat<f64>) -> Vec<f64> {
    let svd = a.svd();
    let v = svd.v();
    let last = v.ncols() - 1;
    (0..v.nrows()).map(|i| v.read(i, last)).collect()
}

/// Mean and principal axes of a set of points.
///
/// The returned axes are sorted by decreasing spread and the singular values are those of the
/// centred point matrix.
pub fn principal_axes(points: &[DVec3]) -> (DVec3, Svd3) {
    let n = points.len().max(1) as f64;
    let mean = points.iter().fold(DVec3::ZERO, |acc, p| acc + *p) / n;

    let mut cov = DMat3::ZERO;
    for p in points {
        let d = *p - mean;
        cov += DMat3::from_cols(d * d.x, d * d.y, d * d.z);
    }

    let svd = svd3(&cov);
    (
        mean,
        Svd3 {
            u: svd.u,
            s: DVec3::new(svd.s.x.sqrt(), svd.s.y.sqrt(), svd.s.z.max(0.0).sqrt()),
            v: svd.v,
        },
    )
}
