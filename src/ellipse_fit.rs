// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Direct least-squares ellipse fitting.
//!
//! Fits the general conic A x² + B xy + C y² + D x + E y + F = 0 to a set of
//! boundary points, minimizing algebraic distance subject to the ellipse
//! constraint 4AC - B² = 1 (Fitzgibbon, Pilu & Fisher 1999). The scatter
//! matrix is split into quadratic and linear blocks so that only a 3x3
//! eigenproblem remains (Halir & Flusser 1998); this avoids the singular
//! constraint matrix of the original 6x6 formulation.

use nalgebra::{Matrix3, Vector3};

use crate::ellipse::Ellipse;

/// Fewest boundary points for which a fit is attempted. Shorter contours
/// are skipped by callers, not reported.
pub const MIN_FIT_POINTS: usize = 5;

/// General conic coefficients [A, B, C, D, E, F].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Conic(pub [f64; 6]);

impl Conic {
    /// B² - 4AC < 0.
    pub fn is_ellipse(&self) -> bool {
        let [a, b, c, ..] = self.0;
        b * b - 4.0 * a * c < 0.0
    }

    /// Geometric parameters of the conic, or None if it is not a real,
    /// non-degenerate ellipse.
    pub fn to_ellipse(&self) -> Option<Ellipse> {
        if !self.is_ellipse() {
            return None;
        }
        let [a, b, c, d, e, f] = self.0;

        // The center is where the gradient vanishes:
        //   2A·x + B·y + D = 0
        //   B·x + 2C·y + E = 0
        let denom = 4.0 * a * c - b * b;
        let cx = (b * e - 2.0 * c * d) / denom;
        let cy = (b * d - 2.0 * a * e) / denom;

        // Conic value at the center; the curve is x'ᵀQx' = -f_center in
        // center-relative coordinates.
        let f_center = a * cx * cx + b * cx * cy + c * cy * cy + d * cx + e * cy + f;

        // Eigenvalues of Q = [[A, B/2], [B/2, C]]. The direction at angle
        // theta = atan2(B, A - C) / 2 belongs to the larger eigenvalue.
        let mean = (a + c) / 2.0;
        let radius = ((a - c) * (a - c) + b * b).sqrt() / 2.0;
        let lambda_theta = mean + radius;
        let lambda_perp = mean - radius;
        let theta = 0.5 * b.atan2(a - c);

        let semi_theta_sq = -f_center / lambda_theta;
        let semi_perp_sq = -f_center / lambda_perp;
        if !(semi_theta_sq > 0.0 && semi_perp_sq > 0.0) {
            return None;
        }
        let ellipse = Ellipse::new(cx, cy,
                                   2.0 * semi_theta_sq.sqrt(),
                                   2.0 * semi_perp_sq.sqrt(),
                                   theta.to_degrees()).canonical();
        if ellipse.is_valid() { Some(ellipse) } else { None }
    }
}

/// Fits an ellipse to `points`. Returns None when there are fewer than
/// [MIN_FIT_POINTS] points or the points do not determine an ellipse
/// (e.g. collinear points). The result is in canonical form.
pub fn fit_ellipse(points: &[[f64; 2]]) -> Option<Ellipse> {
    fit_conic(points)?.to_ellipse()
}

/// Least-squares conic through `points`, constrained to be an ellipse.
pub fn fit_conic(points: &[[f64; 2]]) -> Option<Conic> {
    if points.len() < MIN_FIT_POINTS {
        return None;
    }
    let (mean_x, mean_y, scale) = normalization(points);

    // Scatter matrix blocks for design rows [x², xy, y² | x, y, 1].
    let mut s1 = Matrix3::<f64>::zeros();
    let mut s2 = Matrix3::<f64>::zeros();
    let mut s3 = Matrix3::<f64>::zeros();
    for &[px, py] in points {
        let x = (px - mean_x) * scale;
        let y = (py - mean_y) * scale;
        let quadratic = Vector3::new(x * x, x * y, y * y);
        let linear = Vector3::new(x, y, 1.0);
        s1 += quadratic * quadratic.transpose();
        s2 += quadratic * linear.transpose();
        s3 += linear * linear.transpose();
    }

    // Collinear points leave the linear block singular.
    if s3.determinant().abs() <= 1e-12 * s3.norm().powi(3) {
        return None;
    }
    // The linear part is determined by the quadratic part: a2 = T·a1.
    let t = -s3.try_inverse()? * s2.transpose();
    let reduced = s1 + s2 * t;

    // Premultiply by the inverse of the constraint matrix
    // [[0, 0, 2], [0, -1, 0], [2, 0, 0]].
    let system = Matrix3::from_rows(&[
        reduced.row(2) / 2.0,
        -reduced.row(1),
        reduced.row(0) / 2.0,
    ]);

    // Exactly one eigenvector satisfies the ellipse constraint, and its
    // eigenvalue is real. Noise can turn the other two into a complex pair.
    let mut best: Option<(f64, Vector3<f64>)> = None;
    for eigenvalue in system.complex_eigenvalues().iter() {
        if eigenvalue.im.abs() > 1e-9 * (1.0 + eigenvalue.re.abs()) {
            continue;
        }
        let lambda = eigenvalue.re;
        let Some(v) = null_vector(&(system - Matrix3::identity() * lambda)) else {
            continue;
        };
        let constraint = 4.0 * v[0] * v[2] - v[1] * v[1];
        if constraint <= 0.0 {
            continue;
        }
        if best.map_or(true, |(best_lambda, _)| lambda.abs() < best_lambda.abs()) {
            best = Some((lambda, v));
        }
    }
    let (_, a1) = best?;
    let a2 = t * a1;

    Some(denormalize([a1[0], a1[1], a1[2], a2[0], a2[1], a2[2]],
                     mean_x, mean_y, scale))
}

// Centroid and the scale factor that brings the mean distance from the
// centroid to sqrt(2).
fn normalization(points: &[[f64; 2]]) -> (f64, f64, f64) {
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p[0]).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p[1]).sum::<f64>() / n;
    let mean_dist = points.iter()
        .map(|p| (p[0] - mean_x).hypot(p[1] - mean_y))
        .sum::<f64>() / n;
    let scale = if mean_dist > 1e-12 { std::f64::consts::SQRT_2 / mean_dist } else { 1.0 };
    (mean_x, mean_y, scale)
}

// Maps a conic fitted in normalized coordinates x' = s(x - mx),
// y' = s(y - my) back to image coordinates.
fn denormalize(c: [f64; 6], mx: f64, my: f64, s: f64) -> Conic {
    let [a, b, cc, d, e, f] = c;
    let s2 = s * s;
    Conic([
        a * s2,
        b * s2,
        cc * s2,
        -2.0 * a * s2 * mx - b * s2 * my + d * s,
        -b * s2 * mx - 2.0 * cc * s2 * my + e * s,
        a * s2 * mx * mx + b * s2 * mx * my + cc * s2 * my * my - d * s * mx - e * s * my + f,
    ])
}

// Unit vector spanning the null space of a rank-2 3x3 matrix: the largest
// cross product of two of its rows.
fn null_vector(m: &Matrix3<f64>) -> Option<Vector3<f64>> {
    let r0: Vector3<f64> = m.row(0).transpose();
    let r1: Vector3<f64> = m.row(1).transpose();
    let r2: Vector3<f64> = m.row(2).transpose();
    let best = [r0.cross(&r1), r0.cross(&r2), r1.cross(&r2)]
        .into_iter()
        .max_by(|p, q| p.norm_squared().total_cmp(&q.norm_squared()))?;
    let norm = best.norm();
    if norm < 1e-30 || !norm.is_finite() {
        return None;
    }
    Some(best / norm)
}

// mod tests.
