use serde::{Deserialize, Serialize};

use crate::consts::MIN_IMAGES;
use crate::error::{InputError, Result};
use crate::geometry::Point2;
use crate::transform::TransformModel;

/// Ordered landmarks picked on one image. Position `i` corresponds to
/// position `i` in every other image's set.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LandmarkSet {
    pub points: Vec<Point2>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Point2>) -> Self {
        Self { points }
    }

    pub fn from_pairs(pairs: &[(f64, f64)]) -> Self {
        Self {
            points: pairs.iter().map(|&(x, y)| Point2::new(x, y)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The landmark used as translation reference.
    pub fn first(&self) -> Option<Point2> {
        self.points.first().copied()
    }

    /// Express every landmark relative to a new origin.
    pub fn shifted(&self, dx: f64, dy: f64) -> LandmarkSet {
        LandmarkSet {
            points: self.points.iter().map(|p| p.translate(dx, dy)).collect(),
        }
    }
}

/// Check the landmark-mode preconditions for `images` images.
///
/// Every image must have a set, all sets must have the source set's
/// cardinality, and that cardinality must meet the model's minimum.
/// Returns the common landmark count.
pub fn validate_landmarks(
    images: usize,
    sets: &[LandmarkSet],
    source_index: usize,
    model: TransformModel,
) -> Result<usize> {
    if images < MIN_IMAGES {
        return Err(InputError::TooFewImages {
            required: MIN_IMAGES,
            found: images,
        }
        .into());
    }
    if sets.len() != images {
        return Err(InputError::MissingLandmarks {
            images,
            sets: sets.len(),
        }
        .into());
    }
    if source_index >= images {
        return Err(InputError::SourceIndexOutOfRange {
            index: source_index,
            total: images,
        }
        .into());
    }

    let expected = sets[source_index].len();
    if let Some((image, set)) = sets.iter().enumerate().find(|(_, s)| s.len() != expected) {
        return Err(InputError::UnequalLandmarkCounts {
            image,
            expected,
            found: set.len(),
        }
        .into());
    }

    let required = model.min_landmarks();
    if expected < required {
        return Err(InputError::TooFewLandmarks {
            model,
            required,
            found: expected,
        }
        .into());
    }
    Ok(expected)
}
