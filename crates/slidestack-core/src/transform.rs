//! Planar transforms and their least-squares estimation from point
//! correspondences.
//!
//! Every model is represented as a 3x3 projective matrix; translation and
//! affine fits simply leave the last row at `[0, 0, 1]`. Fitting functions
//! accept optional per-point weights so the same code serves the global fits
//! and the locally weighted fits of moving-least-squares warping.

use nalgebra::{DMatrix, Matrix3, SVD};
use serde::{Deserialize, Serialize};

use crate::consts::{EPSILON, MIN_LANDMARKS, MIN_LANDMARKS_PROJECTIVE};
use crate::geometry::Point2;

/// Degrees of freedom solved during registration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransformModel {
    #[default]
    Translation,
    Affine,
    Projective,
}

impl TransformModel {
    /// Landmarks every image must carry before a landmark run is accepted.
    pub fn min_landmarks(&self) -> usize {
        match self {
            Self::Translation | Self::Affine => MIN_LANDMARKS,
            Self::Projective => MIN_LANDMARKS_PROJECTIVE,
        }
    }

    /// Correspondences needed to determine the model exactly.
    pub fn min_correspondences(&self) -> usize {
        match self {
            Self::Translation => 1,
            Self::Affine => 3,
            Self::Projective => 4,
        }
    }
}

impl std::fmt::Display for TransformModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Translation => write!(f, "Translation"),
            Self::Affine => write!(f, "Affine"),
            Self::Projective => write!(f, "Projective"),
        }
    }
}

/// A 2D projective transform acting on column vectors `[x, y, 1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Homography {
    matrix: Matrix3<f64>,
}

impl Homography {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix3::identity(),
        }
    }

    pub fn from_translation(dx: f64, dy: f64) -> Self {
        Self {
            matrix: Matrix3::new(1.0, 0.0, dx, 0.0, 1.0, dy, 0.0, 0.0, 1.0),
        }
    }

    /// Build from a row-major 3x3 array, normalizing so that `h[2][2] == 1`
    /// when possible.
    pub fn from_rows(rows: [[f64; 3]; 3]) -> Self {
        let matrix = Matrix3::from_fn(|r, c| rows[r][c]);
        Self::from_matrix(matrix)
    }

    fn from_matrix(matrix: Matrix3<f64>) -> Self {
        let scale = matrix[(2, 2)];
        if scale.abs() > EPSILON {
            Self {
                matrix: matrix / scale,
            }
        } else {
            Self { matrix }
        }
    }

    pub fn rows(&self) -> [[f64; 3]; 3] {
        let m = &self.matrix;
        [
            [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
            [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
            [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
        ]
    }

    /// Map a point. `None` when it lands on the line at infinity.
    pub fn apply(&self, p: Point2) -> Option<Point2> {
        let m = &self.matrix;
        let w = m[(2, 0)] * p.x + m[(2, 1)] * p.y + m[(2, 2)];
        if w.abs() < EPSILON {
            return None;
        }
        let x = (m[(0, 0)] * p.x + m[(0, 1)] * p.y + m[(0, 2)]) / w;
        let y = (m[(1, 0)] * p.x + m[(1, 1)] * p.y + m[(1, 2)]) / w;
        Some(Point2::new(x, y))
    }

    pub fn inverse(&self) -> Option<Homography> {
        self.matrix.try_inverse().map(Self::from_matrix)
    }

    pub fn determinant(&self) -> f64 {
        self.matrix.determinant()
    }

    /// Translation column, i.e. where the origin is mapped for affine
    /// transforms.
    pub fn translation(&self) -> (f64, f64) {
        let w = self.matrix[(2, 2)];
        (self.matrix[(0, 2)] / w, self.matrix[(1, 2)] / w)
    }

    pub fn is_finite(&self) -> bool {
        self.matrix.iter().all(|v| v.is_finite())
    }
}

/// Fit `model` mapping `from[i]` onto `to[i]`, least squares, optionally
/// weighted. Returns `None` when the correspondences are too few or
/// geometrically degenerate for the model.
pub fn fit_model(
    model: TransformModel,
    from: &[Point2],
    to: &[Point2],
    weights: Option<&[f64]>,
) -> Option<Homography> {
    if from.len() != to.len() || from.len() < model.min_correspondences() {
        return None;
    }
    match model {
        TransformModel::Translation => fit_translation(from, to, weights),
        TransformModel::Affine => fit_affine(from, to, weights),
        TransformModel::Projective => fit_homography(from, to, weights),
    }
}

fn weight_at(weights: Option<&[f64]>, i: usize) -> f64 {
    weights.map_or(1.0, |w| w[i])
}

fn weighted_centroid(points: &[Point2], weights: Option<&[f64]>) -> Option<Point2> {
    let mut sum_w = 0.0;
    let mut sx = 0.0;
    let mut sy = 0.0;
    for (i, p) in points.iter().enumerate() {
        let w = weight_at(weights, i);
        sum_w += w;
        sx += w * p.x;
        sy += w * p.y;
    }
    if sum_w <= EPSILON {
        return None;
    }
    Some(Point2::new(sx / sum_w, sy / sum_w))
}

/// Weighted mean displacement.
pub fn fit_translation(
    from: &[Point2],
    to: &[Point2],
    weights: Option<&[f64]>,
) -> Option<Homography> {
    let p = weighted_centroid(from, weights)?;
    let q = weighted_centroid(to, weights)?;
    Some(Homography::from_translation(q.x - p.x, q.y - p.y))
}

/// Weighted affine least squares on centred coordinates.
///
/// Solves `q̂ = M p̂` for the 2x2 linear part from the normal equations, then
/// recovers the translation from the weighted centroids.
pub fn fit_affine(from: &[Point2], to: &[Point2], weights: Option<&[f64]>) -> Option<Homography> {
    let pc = weighted_centroid(from, weights)?;
    let qc = weighted_centroid(to, weights)?;

    let (mut a00, mut a01, mut a11) = (0.0, 0.0, 0.0);
    let (mut b00, mut b01, mut b10, mut b11) = (0.0, 0.0, 0.0, 0.0);
    for (i, (p, q)) in from.iter().zip(to).enumerate() {
        let w = weight_at(weights, i);
        let (px, py) = (p.x - pc.x, p.y - pc.y);
        let (qx, qy) = (q.x - qc.x, q.y - qc.y);
        a00 += w * px * px;
        a01 += w * px * py;
        a11 += w * py * py;
        b00 += w * px * qx;
        b01 += w * py * qx;
        b10 += w * px * qy;
        b11 += w * py * qy;
    }

    let det = a00 * a11 - a01 * a01;
    // Relative test: collinear points give a singular covariance regardless
    // of their spread.
    let scale = (a00 + a11).max(EPSILON);
    if det.abs() <= 1e-9 * scale * scale {
        return None;
    }
    let inv = 1.0 / det;
    let (i00, i01, i11) = (a11 * inv, -a01 * inv, a00 * inv);

    let m00 = i00 * b00 + i01 * b01;
    let m01 = i01 * b00 + i11 * b01;
    let m10 = i00 * b10 + i01 * b11;
    let m11 = i01 * b10 + i11 * b11;

    let tx = qc.x - (m00 * pc.x + m01 * pc.y);
    let ty = qc.y - (m10 * pc.x + m11 * pc.y);

    let h = Homography::from_rows([[m00, m01, tx], [m10, m11, ty], [0.0, 0.0, 1.0]]);
    h.is_finite().then_some(h)
}

/// Weighted Direct Linear Transform on Hartley-normalized points.
pub fn fit_homography(
    from: &[Point2],
    to: &[Point2],
    weights: Option<&[f64]>,
) -> Option<Homography> {
    let n = from.len();
    if n < 4 {
        return None;
    }
    let (from_n, t_from) = normalize_points(from)?;
    let (to_n, t_to) = normalize_points(to)?;

    // Each correspondence contributes two rows; weights scale rows by sqrt(w).
    let rows = (2 * n).max(9);
    let mut a = DMatrix::<f64>::zeros(rows, 9);
    for i in 0..n {
        let s = weight_at(weights, i).sqrt();
        let (x, y) = (from_n[i].x, from_n[i].y);
        let (u, v) = (to_n[i].x, to_n[i].y);
        let r0 = [-x, -y, -1.0, 0.0, 0.0, 0.0, u * x, u * y, u];
        let r1 = [0.0, 0.0, 0.0, -x, -y, -1.0, v * x, v * y, v];
        for c in 0..9 {
            a[(2 * i, c)] = s * r0[c];
            a[(2 * i + 1, c)] = s * r1[c];
        }
    }

    let svd = SVD::new(a, false, true);
    let v_t = svd.v_t?;
    let singular = &svd.singular_values;
    // A rank-deficient design (collinear points) leaves more than one
    // near-zero singular value.
    let largest = singular.max();
    if largest <= EPSILON || singular[7] / largest < 1e-10 {
        return None;
    }
    let h = v_t.row(8);
    let h_norm = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

    let t_to_inv = t_to.try_inverse()?;
    let denorm = t_to_inv * h_norm * t_from;
    if denorm[(2, 2)].abs() < EPSILON {
        return None;
    }
    let result = Homography::from_matrix(denorm);
    (result.is_finite() && result.determinant().abs() > EPSILON).then_some(result)
}

/// Translate to the centroid and scale so the mean distance is sqrt(2).
fn normalize_points(points: &[Point2]) -> Option<(Vec<Point2>, Matrix3<f64>)> {
    let c = weighted_centroid(points, None)?;
    let mean_dist = points
        .iter()
        .map(|p| p.distance_squared(&c).sqrt())
        .sum::<f64>()
        / points.len() as f64;
    if mean_dist < EPSILON {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;
    let normalized = points
        .iter()
        .map(|p| Point2::new((p.x - c.x) * s, (p.y - c.y) * s))
        .collect();
    let t = Matrix3::new(s, 0.0, -c.x * s, 0.0, s, -c.y * s, 0.0, 0.0, 1.0);
    Some((normalized, t))
}
