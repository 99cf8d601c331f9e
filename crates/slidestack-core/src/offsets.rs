//! Placement of every image relative to the source image and the size of
//! the shared canvas.

use tracing::debug;

use crate::error::{InputError, Result};
use crate::geometry::{CanvasBounds, Dimensions, OffsetVector, Rect};
use crate::landmarks::LandmarkSet;
use crate::transform::Homography;

/// What the offsets are derived from.
#[derive(Clone, Copy, Debug)]
pub enum PlacementReference<'a> {
    /// One landmark set per image; the first landmark of each set is the
    /// translation reference.
    Landmarks(&'a [LandmarkSet]),
    /// One image-to-source transform per image plus the bounding box (in
    /// source coordinates) of each image after warping.
    Transforms {
        transforms: &'a [Homography],
        warped_bounds: &'a [Rect],
    },
}

impl PlacementReference<'_> {
    fn len(&self) -> usize {
        match self {
            Self::Landmarks(sets) => sets.len(),
            Self::Transforms { transforms, .. } => transforms.len(),
        }
    }
}

/// Result of [`compute_offsets`].
#[derive(Clone, Debug, PartialEq)]
pub struct OffsetTable {
    /// Top-left corner of each image in the source frame; the source itself
    /// sits at `(0, 0)`.
    ///
    /// With [`PlacementReference::Transforms`] these are the homographies'
    /// translation columns and only drive canvas sizing. Warped pages are
    /// placed at the origin of their warped bounds, which differs from the
    /// translation column once the transform rotates, scales or shears.
    pub offsets: Vec<OffsetVector>,
    pub canvas: CanvasBounds,
    pub source_index: usize,
    /// `max(0, max dx)`.
    pub max_offset_x: i64,
    /// Image achieving `max_offset_x`; `None` when the maximum was clamped.
    pub max_offset_x_index: Option<usize>,
    /// `max(0, max dy)`.
    pub max_offset_y: i64,
    /// Image achieving the largest `dy`. Unlike x this index is kept even
    /// when the value was clamped.
    pub max_offset_y_index: usize,
}

impl OffsetTable {
    /// `max_offset_x_index` with `-1` standing for "none".
    pub fn max_offset_x_index_raw(&self) -> i64 {
        self.max_offset_x_index.map_or(-1, |i| i as i64)
    }

    /// Rewrite the index fields from positions in the placed list to image
    /// numbers. `image_indices[k]` is the image placed at position `k`;
    /// `offsets` keeps its positional order.
    pub fn with_image_indices(mut self, image_indices: &[usize]) -> Self {
        let lookup = |k: usize| image_indices.get(k).copied().unwrap_or(k);
        self.source_index = lookup(self.source_index);
        self.max_offset_x_index = self.max_offset_x_index.map(lookup);
        self.max_offset_y_index = lookup(self.max_offset_y_index);
        self
    }
}

/// First index holding the maximum.
fn arg_max(values: impl Iterator<Item = i64>) -> (usize, i64) {
    values
        .enumerate()
        .fold((0, i64::MIN), |best, (i, v)| if v > best.1 { (i, v) } else { best })
}

/// Compute every image's offset relative to `source_index` and the canvas that
/// holds the source plus every image's overhang.
///
/// `dimensions` are the input image sizes. The y margin is only added when
/// the source is the tallest of them; warped rasters may be a pixel larger
/// than their input and must not be passed here.
///
/// Fails with `CanvasTooLarge` when the canvas would exceed the addressable
/// pixel limit.
pub fn compute_offsets(
    dimensions: &[Dimensions],
    reference: PlacementReference<'_>,
    source_index: usize,
) -> Result<OffsetTable> {
    let n = dimensions.len();
    if source_index >= n {
        return Err(InputError::SourceIndexOutOfRange {
            index: source_index,
            total: n,
        }
        .into());
    }
    if reference.len() != n {
        return Err(InputError::MissingLandmarks {
            images: n,
            sets: reference.len(),
        }
        .into());
    }

    let offsets: Vec<OffsetVector> = match reference {
        PlacementReference::Landmarks(sets) => {
            let anchor = sets[source_index]
                .first()
                .ok_or(InputError::EmptyLandmarkSet {
                    image: source_index,
                })?;
            sets.iter()
                .enumerate()
                .map(|(i, set)| -> Result<OffsetVector> {
                    if i == source_index {
                        return Ok(OffsetVector::ZERO);
                    }
                    let lm = set.first().ok_or(InputError::EmptyLandmarkSet { image: i })?;
                    Ok(OffsetVector::from_subpixel(anchor.x - lm.x, anchor.y - lm.y))
                })
                .collect::<Result<_>>()?
        }
        PlacementReference::Transforms { transforms, .. } => transforms
            .iter()
            .enumerate()
            .map(|(i, h)| {
                if i == source_index {
                    OffsetVector::ZERO
                } else {
                    let (tx, ty) = h.translation();
                    OffsetVector::from_subpixel(tx, ty)
                }
            })
            .collect(),
    };

    let (x_index, x_max) = arg_max(offsets.iter().map(|o| o.dx));
    let (max_offset_x, max_offset_x_index) = if x_max <= 0 {
        (0, None)
    } else {
        (x_max, Some(x_index))
    };
    let (max_offset_y_index, y_max) = arg_max(offsets.iter().map(|o| o.dy));
    let max_offset_y = y_max.max(0);

    let source = dimensions[source_index];
    let tallest = dimensions.iter().map(|d| d.height).max().unwrap_or(0);

    let mut width = source.width as i64 + max_offset_x;
    let mut height = source.height as i64;
    if source.height == tallest {
        height += max_offset_y;
    }

    if let PlacementReference::Transforms { warped_bounds, .. } = reference {
        if let Some(union) = warped_bounds.iter().copied().reduce(|a, b| a.union(&b)) {
            width += 2 * (union.right() - width).max(0);
            height += 2 * (union.bottom() - height).max(0);
        }
    }

    debug!(max_offset_x, max_offset_y, width, height, "computed offsets");
    let canvas = CanvasBounds::new(width, height)?;

    Ok(OffsetTable {
        offsets,
        canvas,
        source_index,
        max_offset_x,
        max_offset_x_index,
        max_offset_y,
        max_offset_y_index,
    })
}
