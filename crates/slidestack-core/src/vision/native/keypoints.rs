//! Harris corner detection and normalized patch descriptors.

use ndarray::Array2;

use crate::consts::{DESCRIPTOR_GRID, DESCRIPTOR_RADIUS, HARRIS_RELATIVE_THRESHOLD};
use crate::geometry::Point2;
use crate::vision::{Features, Keypoint};

use super::map_pixels;

/// Length of a descriptor vector.
pub const DESCRIPTOR_LEN: usize = DESCRIPTOR_GRID * DESCRIPTOR_GRID;

/// Harris corner response `det(M) - k * trace(M)^2` over a 3x3 window of the
/// structure tensor.
pub fn harris_response(plane: &Array2<f32>, k: f32) -> Array2<f32> {
    let (h, w) = plane.dim();
    let at = |r: isize, c: isize| -> f32 {
        let r = r.clamp(0, h as isize - 1) as usize;
        let c = c.clamp(0, w as isize - 1) as usize;
        plane[[r, c]]
    };

    // (Ixx, Iyy, Ixy) per pixel from central differences.
    let tensor = map_pixels(h, w, |row, col| {
        let (r, c) = (row as isize, col as isize);
        let ix = 0.5 * (at(r, c + 1) - at(r, c - 1));
        let iy = 0.5 * (at(r + 1, c) - at(r - 1, c));
        (ix * ix, iy * iy, ix * iy)
    });

    map_pixels(h, w, |row, col| {
        let (mut sxx, mut syy, mut sxy) = (0.0f32, 0.0f32, 0.0f32);
        for r in row.saturating_sub(1)..(row + 2).min(h) {
            for c in col.saturating_sub(1)..(col + 2).min(w) {
                let (xx, yy, xy) = tensor[[r, c]];
                sxx += xx;
                syy += yy;
                sxy += xy;
            }
        }
        let det = sxx * syy - sxy * sxy;
        let trace = sxx + syy;
        det - k * trace * trace
    })
}

/// Strongest Harris corners far enough from the border to be described,
/// ordered by descending response (ties broken by row, then column).
pub fn detect_harris(plane: &Array2<f32>, k: f32, max_keypoints: usize) -> Vec<Keypoint> {
    let (h, w) = plane.dim();
    let margin = DESCRIPTOR_RADIUS;
    if h <= 2 * margin || w <= 2 * margin {
        return Vec::new();
    }

    let response = harris_response(plane, k);
    let peak = response.iter().copied().fold(0.0f32, f32::max);
    if peak <= 0.0 {
        return Vec::new();
    }
    let threshold = HARRIS_RELATIVE_THRESHOLD * peak;

    let mut corners = Vec::new();
    for row in margin..h - margin {
        for col in margin..w - margin {
            let v = response[[row, col]];
            if v > threshold && is_local_max(&response, row, col) {
                corners.push(Keypoint {
                    position: Point2::new(col as f64, row as f64),
                    response: v,
                });
            }
        }
    }

    corners.sort_by(|a, b| {
        b.response
            .total_cmp(&a.response)
            .then(a.position.y.total_cmp(&b.position.y))
            .then(a.position.x.total_cmp(&b.position.x))
    });
    corners.truncate(max_keypoints);
    corners
}

/// Plateaus keep only their first pixel in raster order.
fn is_local_max(response: &Array2<f32>, row: usize, col: usize) -> bool {
    let v = response[[row, col]];
    for r in row - 1..=row + 1 {
        for c in col - 1..=col + 1 {
            if (r, c) == (row, col) {
                continue;
            }
            let n = response[[r, c]];
            let earlier = (r, c) < (row, col);
            if n > v || (earlier && n == v) {
                return false;
            }
        }
    }
    true
}

/// Describe each keypoint by its surrounding patch, box-averaged to a
/// `DESCRIPTOR_GRID`² grid, mean-subtracted and L2-normalized.
///
/// Keypoints on flat patches carry no information and are dropped, so the
/// returned keypoints may be a subset of the input.
pub fn describe(plane: &Array2<f32>, corners: &[Keypoint]) -> Features {
    let (h, w) = plane.dim();
    let cell = (2 * DESCRIPTOR_RADIUS) / DESCRIPTOR_GRID;
    let mut keypoints = Vec::with_capacity(corners.len());
    let mut rows: Vec<f32> = Vec::with_capacity(corners.len() * DESCRIPTOR_LEN);

    for kp in corners {
        let cx = kp.position.x.round() as usize;
        let cy = kp.position.y.round() as usize;
        if cx < DESCRIPTOR_RADIUS
            || cy < DESCRIPTOR_RADIUS
            || cx + DESCRIPTOR_RADIUS > w
            || cy + DESCRIPTOR_RADIUS > h
        {
            continue;
        }
        let (x0, y0) = (cx - DESCRIPTOR_RADIUS, cy - DESCRIPTOR_RADIUS);

        let mut desc = [0.0f32; DESCRIPTOR_LEN];
        for gy in 0..DESCRIPTOR_GRID {
            for gx in 0..DESCRIPTOR_GRID {
                let mut sum = 0.0;
                for dy in 0..cell {
                    for dx in 0..cell {
                        sum += plane[[y0 + gy * cell + dy, x0 + gx * cell + dx]];
                    }
                }
                desc[gy * DESCRIPTOR_GRID + gx] = sum / (cell * cell) as f32;
            }
        }

        let mean = desc.iter().sum::<f32>() / DESCRIPTOR_LEN as f32;
        desc.iter_mut().for_each(|v| *v -= mean);
        let norm = desc.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm < 1e-6 {
            continue;
        }
        rows.extend(desc.iter().map(|v| v / norm));
        keypoints.push(*kp);
    }

    let n = keypoints.len();
    match Array2::from_shape_vec((n, DESCRIPTOR_LEN), rows) {
        Ok(descriptors) => Features {
            keypoints,
            descriptors,
        },
        Err(_) => Features::empty(DESCRIPTOR_LEN),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_image() -> Array2<f32> {
        Array2::from_shape_fn((64, 64), |(r, c)| {
            if (20..44).contains(&r) && (20..44).contains(&c) {
                1.0
            } else {
                0.0
            }
        })
    }

    #[test]
    fn flat_image_has_no_corners() {
        let flat = Array2::from_elem((64, 64), 0.5f32);
        assert!(detect_harris(&flat, 0.04, 100).is_empty());
    }

    #[test]
    fn square_corners_are_found() {
        let corners = detect_harris(&square_image(), 0.04, 100);
        assert!(corners.len() >= 4, "got {}", corners.len());
        for kp in &corners[..4] {
            let near_corner = [(20.0, 20.0), (43.0, 20.0), (20.0, 43.0), (43.0, 43.0)]
                .iter()
                .any(|&(x, y)| (kp.position.x - x).abs() <= 2.0 && (kp.position.y - y).abs() <= 2.0);
            assert!(near_corner, "unexpected corner at {:?}", kp.position);
        }
    }

    #[test]
    fn descriptors_are_unit_length() {
        let img = square_image();
        let features = describe(&img, &detect_harris(&img, 0.04, 100));
        assert_eq!(features.descriptors.nrows(), features.keypoints.len());
        for row in features.descriptors.rows() {
            let norm = row.iter().map(|v| v * v).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn keypoint_cap_is_respected() {
        let corners = detect_harris(&square_image(), 0.04, 2);
        assert_eq!(corners.len(), 2);
    }
}
