//! Minimal essential matrix solver on five correspondences.
//!
//! The four dimensional nullspace of the epipolar constraints is parameterized as
//! `E = x X + y Y + z Z + W`. The determinant and trace constraints give ten cubic equations in
//! `(x, y, z)` that are reduced to an action matrix whose real eigenvectors are the solutions.

use glam::{DMat3, DVec2};

use super::PoseError;
use crate::linalg::{mat3_from_rows, smallest_right_singular_vector};

/// Number of correspondences used by the minimal solver.
pub const FIVE_POINT_SAMPLE: usize = 5;

const ACTION: usize = 10;

type Poly = [f64; 20];

/// Exponents of `(x, y, z)` for each monomial slot: cubics first, then the quotient basis.
const MONOMIALS: [[u8; 3]; 20] = [
    [3, 0, 0],
    [2, 1, 0],
    [1, 2, 0],
    [0, 3, 0],
    [2, 0, 1],
    [1, 1, 1],
    [0, 2, 1],
    [1, 0, 2],
    [0, 1, 2],
    [0, 0, 3],
    [2, 0, 0],
    [1, 1, 0],
    [0, 2, 0],
    [1, 0, 1],
    [0, 1, 1],
    [0, 0, 2],
    [1, 0, 0],
    [0, 1, 0],
    [0, 0, 1],
    [0, 0, 0],
];

fn monomial_index(exp: [u8; 3]) -> Option<usize> {
    MONOMIALS.iter().position(|m| *m == exp)
}

fn poly_linear(x: f64, y: f64, z: f64, one: f64) -> Poly {
    let mut p = [0.0; 20];
    p[16] = x;
    p[17] = y;
    p[18] = z;
    p[19] = one;
    p
}

fn poly_mul(a: &Poly, b: &Poly) -> Poly {
    let mut out = [0.0; 20];
    for (i, &ai) in a.iter().enumerate() {
        if ai == 0.0 {
            continue;
        }
        for (j, &bj) in b.iter().enumerate() {
            if bj == 0.0 {
                continue;
            }
            let exp = [
                MONOMIALS[i][0] + MONOMIALS[j][0],
                MONOMIALS[i][1] + MONOMIALS[j][1],
                MONOMIALS[i][2] + MONOMIALS[j][2],
            ];
            // products above degree three never occur in the constraints
            if let Some(k) = monomial_index(exp) {
                out[k] += ai * bj;
            }
        }
    }
    out
}

fn poly_axpy(acc: &mut Poly, s: f64, p: &Poly) {
    for (a, v) in acc.iter_mut().zip(p.iter()) {
        *a += s * v;
    }
}

/// Ten cubic constraints: `det(E) = 0` and `2 E E^T E - tr(E E^T) E = 0`.
fn build_constraints(basis: &[[f64; 9]; 4]) -> [Poly; 10] {
    let mut e = [[[0.0; 20]; 3]; 3];
    for (r, row) in e.iter_mut().enumerate() {
        for (c, p) in row.iter_mut().enumerate() {
            let k = 3 * r + c;
            *p = poly_linear(basis[0][k], basis[1][k], basis[2][k], basis[3][k]);
        }
    }

    let mut det = [0.0; 20];
    let minor = |a: usize, b: usize, c: usize, d: usize| {
        let mut m = poly_mul(&e[1][a], &e[2][b]);
        poly_axpy(&mut m, -1.0, &poly_mul(&e[1][c], &e[2][d]));
        m
    };
    poly_axpy(&mut det, 1.0, &poly_mul(&e[0][0], &minor(1, 2, 2, 1)));
    poly_axpy(&mut det, -1.0, &poly_mul(&e[0][1], &minor(0, 2, 2, 0)));
    poly_axpy(&mut det, 1.0, &poly_mul(&e[0][2], &minor(0, 1, 1, 0)));

    let mut eet = [[[0.0; 20]; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            for k in 0..3 {
                poly_axpy(&mut eet[i][j], 1.0, &poly_mul(&e[i][k], &e[j][k]));
            }
        }
    }

    let mut trace = [0.0; 20];
    for (i, row) in eet.iter().enumerate() {
        poly_axpy(&mut trace, 1.0, &row[i]);
    }

    let mut out = [[0.0; 20]; 10];
    out[0] = det;
    for i in 0..3 {
        for j in 0..3 {
            let row = &mut out[1 + 3 * i + j];
            for k in 0..3 {
                poly_axpy(row, 2.0, &poly_mul(&eet[i][k], &e[k][j]));
            }
            poly_axpy(row, -1.0, &poly_mul(&trace, &e[i][j]));
        }
    }
    out
}

/// Reduce the constraint matrix to `[I | B]` and return `B`, or `None` when the cubic block is
/// singular.
fn eliminate(mut m: [Poly; 10]) -> Option<[[f64; 10]; 10]> {
    let scale = m
        .iter()
        .flat_map(|row| row.iter())
        .fold(0.0f64, |acc, v| acc.max(v.abs()));
    if scale == 0.0 || !scale.is_finite() {
        return None;
    }

    for col in 0..10 {
        let pivot = (col..10).max_by(|&a, &b| m[a][col].abs().total_cmp(&m[b][col].abs()))?;
        if m[pivot][col].abs() < 1e-12 * scale {
            return None;
        }
        m.swap(col, pivot);

        let inv = 1.0 / m[col][col];
        for v in m[col].iter_mut() {
            *v *= inv;
        }
        let pivot_row = m[col];
        for (r, row) in m.iter_mut().enumerate() {
            if r == col {
                continue;
            }
            let f = row[col];
            if f != 0.0 {
                poly_axpy(row, -f, &pivot_row);
            }
        }
    }

    let mut b = [[0.0; 10]; 10];
    for (r, row) in b.iter_mut().enumerate() {
        row.copy_from_slice(&m[r][10..]);
    }
    Some(b)
}

/// Action matrix of multiplication by `x` on the basis `x^2, xy, y^2, xz, yz, z^2, x, y, z, 1`.
fn action_matrix(b: &[[f64; 10]; 10]) -> [[f64; ACTION]; ACTION] {
    let mut at = [[0.0; ACTION]; ACTION];
    // x * {x^2, xy, y^2, xz, yz, z^2} are the reduced cubics x^3, x^2y, xy^2, x^2z, xyz, xz^2
    for (row, cubic) in [0usize, 1, 2, 4, 5, 7].into_iter().enumerate() {
        for k in 0..ACTION {
            at[row][k] = -b[cubic][k];
        }
    }
    // x * {x, y, z, 1} stay in the basis
    at[6][0] = 1.0;
    at[7][1] = 1.0;
    at[8][3] = 1.0;
    at[9][6] = 1.0;
    at
}

/// Coefficients of the characteristic polynomial, lowest degree first, by Faddeev-LeVerrier.
fn characteristic_polynomial(a: &[[f64; ACTION]; ACTION]) -> [f64; ACTION + 1] {
    let n = ACTION;
    let mut c = [0.0; ACTION + 1];
    c[n] = 1.0;

    let mut m = [[0.0; ACTION]; ACTION];
    for k in 1..=n {
        let mut next = matmul(a, &m);
        for (i, row) in next.iter_mut().enumerate() {
            row[i] += c[n - k + 1];
        }
        let am = matmul(a, &next);
        let trace: f64 = (0..n).map(|i| am[i][i]).sum();
        c[n - k] = -trace / k as f64;
        m = next;
    }
    c
}

fn matmul(a: &[[f64; ACTION]; ACTION], b: &[[f64; ACTION]; ACTION]) -> [[f64; ACTION]; ACTION] {
    let mut out = [[0.0; ACTION]; ACTION];
    for i in 0..ACTION {
        for k in 0..ACTION {
            let aik = a[i][k];
            if aik == 0.0 {
                continue;
            }
            for j in 0..ACTION {
                out[i][j] += aik * b[k][j];
            }
        }
    }
    out
}

fn horner(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Real roots of a polynomial given lowest degree first.
///
/// The critical points split the real line into monotone pieces which are bracketed and
/// bisected. Roots of even multiplicity are not reported.
pub(crate) fn real_roots(coeffs: &[f64]) -> Vec<f64> {
    let max_abs = coeffs.iter().fold(0.0f64, |acc, c| acc.max(c.abs()));
    let mut deg = coeffs.len();
    while deg > 0 && coeffs[deg - 1].abs() <= 1e-14 * max_abs {
        deg -= 1;
    }
    if deg < 2 {
        return Vec::new();
    }
    let p = &coeffs[..deg];
    let n = deg - 1;
    if n == 1 {
        return vec![-p[0] / p[1]];
    }

    let lead = p[n];
    let bound = 1.0 + p[..n].iter().fold(0.0f64, |acc, c| acc.max((c / lead).abs()));

    let derivative: Vec<f64> = (1..=n).map(|i| p[i] * i as f64).collect();
    let mut knots = vec![-bound];
    knots.extend(
        real_roots(&derivative)
            .into_iter()
            .filter(|r| r.abs() < bound),
    );
    knots.push(bound);
    knots.sort_by(f64::total_cmp);

    let mut roots: Vec<f64> = Vec::new();
    for w in knots.windows(2) {
        let (mut lo, mut hi) = (w[0], w[1]);
        let mut flo = horner(p, lo);
        let fhi = horner(p, hi);
        if flo == 0.0 {
            roots.push(lo);
            continue;
        }
        if flo * fhi > 0.0 {
            continue;
        }
        for _ in 0..200 {
            let mid = 0.5 * (lo + hi);
            if mid <= lo || mid >= hi {
                break;
            }
            let fmid = horner(p, mid);
            if fmid == 0.0 {
                lo = mid;
                hi = mid;
                break;
            }
            if flo * fmid < 0.0 {
                hi = mid;
            } else {
                lo = mid;
                flo = fmid;
            }
        }
        roots.push(0.5 * (lo + hi));
    }

    roots.sort_by(f64::total_cmp);
    roots.dedup_by(|a, b| (*a - *b).abs() <= 1e-10 * (1.0 + b.abs()));
    roots
}

/// Solve for the essential matrices consistent with five normalized correspondences.
///
/// More than five correspondences are accepted, in which case the nullspace is the least
/// squares one. Each returned matrix has unit Frobenius norm; up to ten real solutions exist.
///
/// # Errors
///
/// Returns [`PoseError::InvalidInput`] when fewer than five correspondences are given or the
/// slices differ in length.
pub fn essential_5point(x1: &[DVec2], x2: &[DVec2]) -> Result<Vec<DMat3>, PoseError> {
    if x1.len() != x2.len() || x1.len() < FIVE_POINT_SAMPLE {
        return Err(PoseError::InvalidInput {
            required: FIVE_POINT_SAMPLE,
            found: x1.len().min(x2.len()),
        });
    }

    // rows of x2^T E x1 = 0 with E stored row-major
    let n = x1.len();
    let mut a = faer::Mat::<f64>::zeros(n.max(9), 9);
    for (i, (p1, p2)) in x1.iter().zip(x2.iter()).enumerate() {
        let lhs = [p2.x, p2.y, 1.0];
        let rhs = [p1.x, p1.y, 1.0];
        for (r, l) in lhs.iter().enumerate() {
            for (c, v) in rhs.iter().enumerate() {
                a.write(i, 3 * r + c, l * v);
            }
        }
    }

    let svd = a.svd();
    let v = svd.v();
    let mut basis = [[0.0; 9]; 4];
    for (b, col) in basis.iter_mut().zip(5..9) {
        for (k, val) in b.iter_mut().enumerate() {
            *val = v.read(k, col);
        }
    }

    let Some(b) = eliminate(build_constraints(&basis)) else {
        return Ok(Vec::new());
    };
    let at = action_matrix(&b);

    let scale = at
        .iter()
        .flat_map(|row| row.iter())
        .fold(0.0f64, |acc, v| acc.max(v.abs()));
    if scale == 0.0 || !scale.is_finite() {
        return Ok(Vec::new());
    }
    let mut scaled = at;
    for v in scaled.iter_mut().flat_map(|row| row.iter_mut()) {
        *v /= scale;
    }

    let mut solutions = Vec::new();
    for mu in real_roots(&characteristic_polynomial(&scaled)) {
        let lambda = mu * scale;

        let mut shifted = faer::Mat::<f64>::zeros(ACTION, ACTION);
        for i in 0..ACTION {
            for j in 0..ACTION {
                let diag = if i == j { lambda } else { 0.0 };
                shifted.write(i, j, at[i][j] - diag);
            }
        }
        let vec = smallest_right_singular_vector(&shifted);
        if vec[9].abs() < 1e-12 {
            continue;
        }
        let (x, y, z) = (vec[6] / vec[9], vec[7] / vec[9], vec[8] / vec[9]);

        let mut e = [0.0; 9];
        for (k, val) in e.iter_mut().enumerate() {
            *val = x * basis[0][k] + y * basis[1][k] + z * basis[2][k] + basis[3][k];
        }
        let norm = e.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm <= f64::EPSILON || !norm.is_finite() {
            continue;
        }
        for val in e.iter_mut() {
            *val /= norm;
        }

        solutions.push(mat3_from_rows([
            [e[0], e[1], e[2]],
            [e[3], e[4], e[5]],
            [e[6], e[7], e[8]],
        ]));
    }

    log::trace!("five point solver found {} real solutions", solutions.len());

    Ok(solutions)
}
