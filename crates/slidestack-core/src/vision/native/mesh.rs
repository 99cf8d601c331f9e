//! Dense warping: exact inverse mapping for homographies and a
//! moving-least-squares deformation evaluated on a mesh.

use ndarray::Array2;

use crate::consts::OUTLINE_SAMPLES_PER_EDGE;
use crate::error::{Result, SlideStackError};
use crate::geometry::{CanvasBounds, Point2, Rect};
use crate::image::SlideImage;
use crate::transform::{fit_model, Homography, TransformModel};
use crate::vision::interpolation::{bicubic_sample, bilinear_sample, inside};
use crate::vision::{Interpolation, MlsModel, WarpedImage};

use super::map_pixels;

/// Points along the border of a `(w, h)` image, pixel centres, corners included.
pub fn outline(width: usize, height: usize) -> Vec<Point2> {
    let s = OUTLINE_SAMPLES_PER_EDGE;
    let (xmax, ymax) = ((width - 1) as f64, (height - 1) as f64);
    let mut points = Vec::with_capacity(4 * (s + 1));
    for t in 0..=s {
        let f = t as f64 / s as f64;
        points.push(Point2::new(f * xmax, 0.0));
        points.push(Point2::new(f * xmax, ymax));
        points.push(Point2::new(0.0, f * ymax));
        points.push(Point2::new(xmax, f * ymax));
    }
    points
}

fn mapped_bounds<F>(image: &SlideImage, forward: F) -> Result<Rect>
where
    F: Fn(Point2) -> Option<Point2>,
{
    let mapped: Option<Vec<Point2>> = outline(image.width(), image.height())
        .into_iter()
        .map(forward)
        .collect();
    let bounds = mapped
        .and_then(Rect::enclosing)
        .ok_or_else(|| SlideStackError::Warp("image outline maps to infinity".into()))?;
    // Refuse rasters the canvas could never hold before allocating them.
    CanvasBounds::new(bounds.width, bounds.height)?;
    Ok(bounds)
}

/// Sample every plane at the image-space positions in `sources`.
fn resample(
    image: &SlideImage,
    sources: &Array2<Option<Point2>>,
    bounds: Rect,
    interpolation: Interpolation,
) -> Result<WarpedImage> {
    let (h, w) = (image.height(), image.width());
    let (out_h, out_w) = sources.dim();

    let coverage = sources.mapv(|s| s.is_some_and(|p| inside(h, w, p.y, p.x)));
    let planes = image
        .planes
        .iter()
        .map(|plane| {
            map_pixels(out_h, out_w, |row, col| match sources[[row, col]] {
                Some(p) if coverage[[row, col]] => match interpolation {
                    Interpolation::Bilinear => bilinear_sample(plane, p.y, p.x),
                    Interpolation::Bicubic => bicubic_sample(plane, p.y, p.x),
                },
                _ => 0.0,
            })
        })
        .collect();

    let warped = SlideImage::from_planes(planes, image.format)?.with_name(image.name.clone());
    Ok(WarpedImage {
        image: warped,
        coverage,
        bounds,
    })
}

/// Warp through a homography mapping image coordinates into the target frame.
pub fn warp_homography(
    image: &SlideImage,
    h: &Homography,
    interpolation: Interpolation,
) -> Result<WarpedImage> {
    let inverse = h
        .inverse()
        .ok_or_else(|| SlideStackError::Warp("homography is not invertible".into()))?;
    let bounds = mapped_bounds(image, |p| h.apply(p))?;

    let sources = map_pixels(bounds.height as usize, bounds.width as usize, |row, col| {
        inverse.apply(Point2::new(
            (bounds.x + col as i64) as f64,
            (bounds.y + row as i64) as f64,
        ))
    });
    resample(image, &sources, bounds, interpolation)
}

/// Moving-least-squares deformation: at each query point the model is refit
/// with weights `1 / |p_i - v|^(2 alpha)`, so control points are
/// interpolated exactly.
struct MlsMap<'a> {
    from: &'a [Point2],
    to: &'a [Point2],
    model: TransformModel,
    alpha: f64,
    global: Homography,
}

impl<'a> MlsMap<'a> {
    fn new(from: &'a [Point2], to: &'a [Point2], model: TransformModel, alpha: f64) -> Option<Self> {
        let global = fit_model(model, from, to, None)?;
        Some(Self {
            from,
            to,
            model,
            alpha,
            global,
        })
    }

    fn apply(&self, v: Point2) -> Option<Point2> {
        let mut weights = Vec::with_capacity(self.from.len());
        for (p, q) in self.from.iter().zip(self.to) {
            let d2 = p.distance_squared(&v);
            if d2 < 1e-12 {
                return Some(*q);
            }
            weights.push(1.0 / d2.powf(self.alpha));
        }
        let max_w = weights.iter().copied().fold(0.0, f64::max);
        weights.iter_mut().for_each(|w| *w /= max_w);

        fit_model(self.model, self.from, self.to, Some(&weights))
            .and_then(|local| local.apply(v))
            .or_else(|| self.global.apply(v))
    }
}

/// Warp with a moving-least-squares deformation.
///
/// The output raster covers the forward-mapped image border. The inverse
/// deformation is evaluated on a `(res + 1)²` vertex mesh over that raster and
/// its displacement is interpolated bilinearly inside each cell.
pub fn warp_mls(
    image: &SlideImage,
    model: &MlsModel,
    interpolation: Interpolation,
) -> Result<WarpedImage> {
    let n = model.image_points.len();
    if n != model.target_points.len() || n < model.model.min_correspondences() {
        return Err(SlideStackError::Warp(format!(
            "{} control points cannot drive a {} deformation",
            n, model.model
        )));
    }
    let degenerate = || SlideStackError::Warp("control points are degenerate".into());
    let forward = MlsMap::new(
        &model.image_points,
        &model.target_points,
        model.model,
        model.alpha,
    )
    .ok_or_else(degenerate)?;
    let backward = MlsMap::new(
        &model.target_points,
        &model.image_points,
        model.model,
        model.alpha,
    )
    .ok_or_else(degenerate)?;

    let bounds = mapped_bounds(image, |p| forward.apply(p))?;
    let (out_w, out_h) = (bounds.width as usize, bounds.height as usize);
    let res = model.mesh_resolution.max(1);

    // Vertex positions in output-raster pixel units.
    let step_x = (out_w.saturating_sub(1)) as f64 / res as f64;
    let step_y = (out_h.saturating_sub(1)) as f64 / res as f64;

    let displacement = map_pixels(res + 1, res + 1, |j, i| {
        let v = Point2::new(
            bounds.x as f64 + i as f64 * step_x,
            bounds.y as f64 + j as f64 * step_y,
        );
        backward
            .apply(v)
            .map(|src| (src.x - v.x, src.y - v.y))
            .unwrap_or((f64::NAN, f64::NAN))
    });

    let cell = |pos: f64, step: f64| -> (usize, f64) {
        if step <= 0.0 {
            return (0, 0.0);
        }
        let g = pos / step;
        let i0 = (g.floor() as usize).min(res - 1);
        (i0, g - i0 as f64)
    };

    let sources = map_pixels(out_h, out_w, |row, col| {
        let (i0, tx) = cell(col as f64, step_x);
        let (j0, ty) = cell(row as f64, step_y);
        let d00 = displacement[[j0, i0]];
        let d01 = displacement[[j0, i0 + 1]];
        let d10 = displacement[[j0 + 1, i0]];
        let d11 = displacement[[j0 + 1, i0 + 1]];
        let lerp = |a: f64, b: f64, c: f64, d: f64| {
            a * (1.0 - tx) * (1.0 - ty) + b * tx * (1.0 - ty) + c * (1.0 - tx) * ty + d * tx * ty
        };
        let dx = lerp(d00.0, d01.0, d10.0, d11.0);
        let dy = lerp(d00.1, d01.1, d10.1, d11.1);
        let x = (bounds.x + col as i64) as f64;
        let y = (bounds.y + row as i64) as f64;
        (dx.is_finite() && dy.is_finite()).then(|| Point2::new(x + dx, y + dy))
    });

    resample(image, &sources, bounds, interpolation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::PixelFormat;

    fn gradient(w: usize, h: usize) -> SlideImage {
        SlideImage::gray(
            Array2::from_shape_fn((h, w), |(r, c)| ((r * 7 + c * 3) % 97) as f32 / 97.0),
            PixelFormat::Gray8,
        )
    }

    #[test]
    fn identity_homography_is_lossless() {
        let img = gradient(40, 30);
        let out = warp_homography(&img, &Homography::identity(), Interpolation::Bilinear).unwrap();
        assert_eq!(out.bounds, Rect::new(0, 0, 40, 30));
        assert_eq!(out.image.planes[0], img.planes[0]);
        assert!(out.coverage.iter().all(|&c| c));
    }

    #[test]
    fn translated_homography_moves_origin() {
        let img = gradient(20, 10);
        let h = Homography::from_translation(5.0, -3.0);
        let out = warp_homography(&img, &h, Interpolation::Bilinear).unwrap();
        assert_eq!(out.bounds, Rect::new(5, -3, 20, 10));
        assert_eq!(out.image.planes[0][[4, 7]], img.planes[0][[4, 7]]);
    }

    #[test]
    fn identity_mls_is_lossless() {
        let img = gradient(50, 40);
        let pts = vec![
            Point2::new(5.0, 5.0),
            Point2::new(45.0, 6.0),
            Point2::new(25.0, 35.0),
        ];
        let model = MlsModel {
            image_points: pts.clone(),
            target_points: pts,
            model: TransformModel::Affine,
            alpha: 1.0,
            mesh_resolution: 8,
        };
        let out = warp_mls(&img, &model, Interpolation::Bicubic).unwrap();
        assert_eq!(out.bounds, Rect::new(0, 0, 50, 40));
        assert_eq!(out.image.planes[0], img.planes[0]);
    }

    #[test]
    fn mls_interpolates_control_points() {
        let model = MlsModel {
            image_points: vec![
                Point2::new(0.0, 0.0),
                Point2::new(10.0, 0.0),
                Point2::new(0.0, 10.0),
                Point2::new(10.0, 10.0),
            ],
            target_points: vec![
                Point2::new(1.0, 0.0),
                Point2::new(11.0, 1.0),
                Point2::new(0.0, 12.0),
                Point2::new(9.0, 10.0),
            ],
            model: TransformModel::Affine,
            alpha: 1.0,
            mesh_resolution: 4,
        };
        let map = MlsMap::new(
            &model.image_points,
            &model.target_points,
            model.model,
            model.alpha,
        )
        .unwrap();
        let mapped: Vec<_> = model
            .image_points
            .iter()
            .map(|&p| map.apply(p).unwrap())
            .collect();
        assert_eq!(mapped, model.target_points);
    }

    #[test]
    fn collinear_controls_are_rejected() {
        let pts = vec![
            Point2::new(0.0, 0.0),
            Point2::new(5.0, 5.0),
            Point2::new(10.0, 10.0),
        ];
        let model = MlsModel {
            image_points: pts.clone(),
            target_points: pts,
            model: TransformModel::Affine,
            alpha: 1.0,
            mesh_resolution: 4,
        };
        assert!(warp_mls(&gradient(20, 20), &model, Interpolation::Bicubic).is_err());
    }
}
