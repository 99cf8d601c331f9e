use std::io::{Seek, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tiff::encoder::{colortype, TiffEncoder};
use tracing::info;

use crate::compositor::AlignedStack;
use crate::error::Result;
use crate::image::{PixelFormat, SlideImage};

fn quantize_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn quantize_u16(v: f32) -> u16 {
    (v.clamp(0.0, 1.0) * 65535.0).round() as u16
}

/// Row-major, channel-interleaved samples.
fn interleaved(image: &SlideImage) -> Vec<f32> {
    let (h, w, c) = (image.height(), image.width(), image.channel_count());
    let mut out = Vec::with_capacity(h * w * c);
    for row in 0..h {
        for col in 0..w {
            for plane in &image.planes {
                out.push(plane[[row, col]]);
            }
        }
    }
    out
}

fn write_page<W: Write + Seek>(encoder: &mut TiffEncoder<W>, page: &SlideImage) -> Result<()> {
    let (w, h) = (page.width() as u32, page.height() as u32);
    let samples = interleaved(page);
    match page.format {
        PixelFormat::Gray8 => {
            let data: Vec<u8> = samples.iter().map(|&v| quantize_u8(v)).collect();
            encoder.write_image::<colortype::Gray8>(w, h, &data)?;
        }
        PixelFormat::Gray16 => {
            let data: Vec<u16> = samples.iter().map(|&v| quantize_u16(v)).collect();
            encoder.write_image::<colortype::Gray16>(w, h, &data)?;
        }
        PixelFormat::Gray32F => {
            encoder.write_image::<colortype::Gray32Float>(w, h, &samples)?;
        }
        PixelFormat::Rgb8 => {
            let data: Vec<u8> = samples.iter().map(|&v| quantize_u8(v)).collect();
            encoder.write_image::<colortype::RGB8>(w, h, &data)?;
        }
        PixelFormat::Rgb16 => {
            let data: Vec<u16> = samples.iter().map(|&v| quantize_u16(v)).collect();
            encoder.write_image::<colortype::RGB16>(w, h, &data)?;
        }
        PixelFormat::Rgb32F => {
            encoder.write_image::<colortype::RGB32Float>(w, h, &samples)?;
        }
    }
    Ok(())
}

/// Write the stack as a multi-page TIFF, one page per aligned image.
///
/// The file is assembled next to `path` and moved into place only once
/// complete, so a failed run never leaves a partial artifact.
pub fn write_stack(stack: &AlignedStack, path: &Path) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut encoder = TiffEncoder::new(tmp.as_file_mut())?;
        for i in 0..stack.len() {
            let page = stack.page_image(i)?;
            write_page(&mut encoder, &page)?;
        }
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    info!(
        path = %path.display(),
        pages = stack.len(),
        canvas = %stack.canvas,
        format = %stack.format,
        "Stack written"
    );
    Ok(())
}
