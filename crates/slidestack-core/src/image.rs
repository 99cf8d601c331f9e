use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::consts::{LUMINANCE_B, LUMINANCE_G, LUMINANCE_R};
use crate::error::{InputError, Result};
use crate::geometry::Dimensions;

/// Pixel layout an image was decoded from, and the layout a stack is written in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Gray8,
    Gray16,
    Gray32F,
    Rgb8,
    Rgb16,
    Rgb32F,
}

/// Sample depth of a [`PixelFormat`], ordered from narrowest to widest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SampleDepth {
    U8,
    U16,
    F32,
}

impl PixelFormat {
    pub fn channel_count(&self) -> usize {
        match self {
            Self::Gray8 | Self::Gray16 | Self::Gray32F => 1,
            Self::Rgb8 | Self::Rgb16 | Self::Rgb32F => 3,
        }
    }

    pub fn depth(&self) -> SampleDepth {
        match self {
            Self::Gray8 | Self::Rgb8 => SampleDepth::U8,
            Self::Gray16 | Self::Rgb16 => SampleDepth::U16,
            Self::Gray32F | Self::Rgb32F => SampleDepth::F32,
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        match self.depth() {
            SampleDepth::U8 => 1,
            SampleDepth::U16 => 2,
            SampleDepth::F32 => 4,
        }
    }

    fn from_parts(channels: usize, depth: SampleDepth) -> Self {
        match (channels, depth) {
            (1, SampleDepth::U8) => Self::Gray8,
            (1, SampleDepth::U16) => Self::Gray16,
            (1, SampleDepth::F32) => Self::Gray32F,
            (_, SampleDepth::U8) => Self::Rgb8,
            (_, SampleDepth::U16) => Self::Rgb16,
            (_, SampleDepth::F32) => Self::Rgb32F,
        }
    }

    /// The narrowest format that represents every input format without loss:
    /// widest channel layout, widest sample depth.
    pub fn common<I>(formats: I) -> Option<PixelFormat>
    where
        I: IntoIterator<Item = PixelFormat>,
    {
        formats.into_iter().reduce(|a, b| {
            Self::from_parts(
                a.channel_count().max(b.channel_count()),
                a.depth().max(b.depth()),
            )
        })
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gray8 => write!(f, "8-bit gray"),
            Self::Gray16 => write!(f, "16-bit gray"),
            Self::Gray32F => write!(f, "32-bit float gray"),
            Self::Rgb8 => write!(f, "8-bit RGB"),
            Self::Rgb16 => write!(f, "16-bit RGB"),
            Self::Rgb32F => write!(f, "32-bit float RGB"),
        }
    }
}

/// One slide image.
///
/// Pixel values are f32 in [0.0, 1.0], one row-major plane per channel,
/// each of shape (height, width).
#[derive(Clone, Debug)]
pub struct SlideImage {
    pub planes: Vec<Array2<f32>>,
    /// Layout the pixels were decoded from.
    pub format: PixelFormat,
    pub name: String,
}

impl SlideImage {
    /// Build a single-plane grayscale image.
    pub fn gray(data: Array2<f32>, format: PixelFormat) -> Self {
        Self {
            planes: vec![data],
            format,
            name: String::new(),
        }
    }

    /// Build an image from channel planes, checking they agree with the format
    /// and with each other.
    pub fn from_planes(planes: Vec<Array2<f32>>, format: PixelFormat) -> Result<Self> {
        if planes.len() != format.channel_count() {
            return Err(InputError::UnsupportedPixelFormat(format!(
                "{} planes for {} data",
                planes.len(),
                format
            ))
            .into());
        }
        let dim = planes[0].dim();
        if planes.iter().any(|p| p.dim() != dim) || dim.0 == 0 || dim.1 == 0 {
            return Err(InputError::InvalidDimensions {
                width: dim.1,
                height: dim.0,
            }
            .into());
        }
        Ok(Self {
            planes,
            format,
            name: String::new(),
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn width(&self) -> usize {
        self.planes[0].ncols()
    }

    pub fn height(&self) -> usize {
        self.planes[0].nrows()
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width(), self.height())
    }

    pub fn channel_count(&self) -> usize {
        self.planes.len()
    }

    /// Bytes held by the decoded f32 planes.
    pub fn decoded_bytes(&self) -> u64 {
        (self.width() * self.height() * self.channel_count() * std::mem::size_of::<f32>()) as u64
    }

    /// Luminance plane used for feature detection.
    pub fn luminance(&self) -> Array2<f32> {
        match self.planes.as_slice() {
            [r, g, b] => {
                let mut lum = r * LUMINANCE_R;
                lum.scaled_add(LUMINANCE_G, g);
                lum.scaled_add(LUMINANCE_B, b);
                lum
            }
            _ => self.planes[0].clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_format_widens_channels_and_depth() {
        let common = PixelFormat::common([PixelFormat::Gray16, PixelFormat::Rgb8]).unwrap();
        assert_eq!(common, PixelFormat::Rgb16);
    }

    #[test]
    fn common_format_of_nothing_is_none() {
        assert!(PixelFormat::common(std::iter::empty()).is_none());
    }

    #[test]
    fn from_planes_rejects_mismatched_shapes() {
        let planes = vec![
            Array2::zeros((2, 2)),
            Array2::zeros((2, 3)),
            Array2::zeros((2, 2)),
        ];
        assert!(SlideImage::from_planes(planes, PixelFormat::Rgb8).is_err());
    }
}
