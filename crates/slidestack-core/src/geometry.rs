use serde::{Deserialize, Serialize};

use crate::consts::MAX_CANVAS_PIXELS;
use crate::error::{ResourceError, Result};

/// A 2D point in pixel coordinates (x to the right, y down), sub-pixel precise.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_squared(&self, other: &Point2) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Point2 {
        Point2::new(self.x + dx, self.y + dy)
    }
}

/// Integer pixel displacement of one image relative to the source image.
///
/// Equivalently: where the image's top-left corner lands in the source frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetVector {
    pub dx: i64,
    pub dy: i64,
}

impl OffsetVector {
    pub const ZERO: OffsetVector = OffsetVector { dx: 0, dy: 0 };

    pub const fn new(dx: i64, dy: i64) -> Self {
        Self { dx, dy }
    }

    /// Round a sub-pixel displacement to the nearest whole pixel.
    pub fn from_subpixel(dx: f64, dy: f64) -> Self {
        Self {
            dx: dx.round() as i64,
            dy: dy.round() as i64,
        }
    }
}

/// Width and height of an image in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: usize,
    pub height: usize,
}

impl Dimensions {
    pub const fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> usize {
        self.width * self.height
    }
}

/// Integer axis-aligned rectangle; `x`/`y` may be negative.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl Rect {
    pub const fn new(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn at(offset: OffsetVector, dims: Dimensions) -> Self {
        Self::new(offset.dx, offset.dy, dims.width as i64, dims.height as i64)
    }

    /// Exclusive right edge.
    pub fn right(&self) -> i64 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> i64 {
        self.y + self.height
    }

    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(x, y, right - x, bottom - y)
    }

    /// Smallest integer rectangle that contains every point.
    ///
    /// Points are pixel centres, so the far edge is one past the largest
    /// coordinate. Returns `None` for an empty iterator.
    pub fn enclosing<I>(points: I) -> Option<Rect>
    where
        I: IntoIterator<Item = Point2>,
    {
        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        let mut any = false;
        for p in points {
            any = true;
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        if !any || !min_x.is_finite() || !max_x.is_finite() {
            return None;
        }
        // Snap values within rounding noise of an integer before flooring.
        let snap = |v: f64| {
            let r = v.round();
            if (v - r).abs() < 1e-6 {
                r
            } else {
                v
            }
        };
        let x0 = snap(min_x).floor() as i64;
        let y0 = snap(min_y).floor() as i64;
        let x1 = snap(max_x).ceil() as i64 + 1;
        let y1 = snap(max_y).ceil() as i64 + 1;
        Some(Rect::new(x0, y0, x1 - x0, y1 - y0))
    }
}

/// Size of the shared output frame.
///
/// Only constructible through [`CanvasBounds::new`], which enforces the
/// addressable-pixel limit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasBounds {
    width: usize,
    height: usize,
}

impl CanvasBounds {
    /// Validate and build canvas bounds.
    ///
    /// Fails with [`ResourceError::CanvasTooLarge`] when `width * height`
    /// exceeds `i32::MAX`; the product is taken in `f64` so it cannot overflow.
    pub fn new(width: i64, height: i64) -> Result<Self> {
        if width <= 0 || height <= 0 {
            return Err(crate::error::InputError::InvalidDimensions {
                width: width.max(0) as usize,
                height: height.max(0) as usize,
            }
            .into());
        }
        if width as f64 * height as f64 > MAX_CANVAS_PIXELS {
            return Err(ResourceError::CanvasTooLarge { width, height }.into());
        }
        Ok(Self {
            width: width as usize,
            height: height as usize,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    pub fn area(&self) -> usize {
        self.width * self.height
    }
}

impl std::fmt::Display for CanvasBounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SlideStackError;

    #[test]
    fn enclosing_rect_of_pixel_centres() {
        let r = Rect::enclosing([Point2::new(0.0, 0.0), Point2::new(99.0, 49.0)]).unwrap();
        assert_eq!(r, Rect::new(0, 0, 100, 50));
    }

    #[test]
    fn enclosing_rect_negative_fractional() {
        let r = Rect::enclosing([Point2::new(-2.5, 3.2), Point2::new(10.1, 7.0)]).unwrap();
        assert_eq!(r.x, -3);
        assert_eq!(r.y, 3);
        assert_eq!(r.right(), 12);
        assert_eq!(r.bottom(), 8);
    }

    #[test]
    fn union_covers_both() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(-5, 4, 8, 20);
        assert_eq!(a.union(&b), Rect::new(-5, 0, 15, 24));
    }

    #[test]
    fn canvas_guard_rejects_overflowing_area() {
        let err = CanvasBounds::new(50_000, 50_000).unwrap_err();
        assert!(matches!(
            err,
            SlideStackError::Resource(ResourceError::CanvasTooLarge { .. })
        ));
    }

    #[test]
    fn canvas_at_limit_is_accepted() {
        assert!(CanvasBounds::new(46_340, 46_340).is_ok());
    }
}
