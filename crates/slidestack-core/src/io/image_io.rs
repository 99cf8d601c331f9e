use std::path::Path;

use image::DynamicImage;
use ndarray::Array2;

use crate::error::{InputError, Result};
use crate::image::{PixelFormat, SlideImage};

/// Pixel format an `image` decode maps to. Alpha is discarded.
fn pixel_format(img: &DynamicImage) -> Result<PixelFormat> {
    let format = match img {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageLumaA8(_) => PixelFormat::Gray8,
        DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA16(_) => PixelFormat::Gray16,
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => PixelFormat::Rgb8,
        DynamicImage::ImageRgb16(_) | DynamicImage::ImageRgba16(_) => PixelFormat::Rgb16,
        DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => PixelFormat::Rgb32F,
        other => {
            return Err(InputError::UnsupportedPixelFormat(format!("{:?}", other.color())).into())
        }
    };
    Ok(format)
}

/// Convert a decoded image into planes normalized to [0.0, 1.0].
pub fn from_dynamic(img: &DynamicImage) -> Result<SlideImage> {
    let format = pixel_format(img)?;
    let (w, h) = (img.width() as usize, img.height() as usize);
    if w == 0 || h == 0 {
        return Err(InputError::InvalidDimensions {
            width: w,
            height: h,
        }
        .into());
    }

    let planes = if format.channel_count() == 1 {
        let gray = img.to_luma32f();
        vec![Array2::from_shape_fn((h, w), |(row, col)| {
            gray.get_pixel(col as u32, row as u32).0[0].clamp(0.0, 1.0)
        })]
    } else {
        let rgb = img.to_rgb32f();
        (0..3)
            .map(|c| {
                Array2::from_shape_fn((h, w), |(row, col)| {
                    rgb.get_pixel(col as u32, row as u32).0[c].clamp(0.0, 1.0)
                })
            })
            .collect()
    };
    SlideImage::from_planes(planes, format)
}

/// Load an image file, keeping its channel layout and depth.
pub fn load_image(path: &Path) -> Result<SlideImage> {
    let img = image::open(path)?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    Ok(from_dynamic(&img)?.with_name(name))
}
