//! Assembly of registered images into the output stack.

pub mod spill;

use ndarray::{s, Array2, Zip};
use tracing::{debug, info};

use crate::consts::{PARALLEL_PIXEL_THRESHOLD, SPILL_THRESHOLD_BYTES};
use crate::error::{Result, SlideStackError};
use crate::geometry::{CanvasBounds, OffsetVector, Rect};
use crate::image::{PixelFormat, SlideImage};
use crate::offsets::OffsetTable;
use crate::pipeline::config::PlaneStorage;
use crate::pipeline::Registration;

use spill::SpilledPlane;

/// One raster placed onto a page.
#[derive(Clone, Copy, Debug)]
pub struct Layer<'a> {
    pub image: &'a SlideImage,
    /// Pixels to paste; `None` pastes the whole raster.
    pub coverage: Option<&'a Array2<bool>>,
    /// Top-left in the source frame.
    pub origin: OffsetVector,
}

impl Layer<'_> {
    fn rect(&self) -> Rect {
        Rect::at(self.origin, self.image.dimensions())
    }
}

/// Layers making up one output page, bottom first.
#[derive(Clone, Debug)]
pub struct PageLayers<'a> {
    pub index: usize,
    pub name: String,
    pub layers: Vec<Layer<'a>>,
}

/// Build the pages for a registration: one page per registered image. With
/// `keep_all` the untransformed original goes underneath the warped raster.
pub fn pages_from_registration<'a>(
    registration: &'a Registration,
    originals: &'a [SlideImage],
    keep_all: bool,
) -> Vec<PageLayers<'a>> {
    registration
        .registered
        .iter()
        .map(|r| {
            let mut layers = Vec::with_capacity(2);
            if keep_all {
                if let Some(origin) = r.original_origin {
                    layers.push(Layer {
                        image: &originals[r.index],
                        coverage: None,
                        origin,
                    });
                }
            }
            layers.push(Layer {
                image: &r.warped.image,
                coverage: Some(&r.warped.coverage),
                origin: r.origin,
            });
            PageLayers {
                index: r.index,
                name: originals[r.index].name.clone(),
                layers,
            }
        })
        .collect()
}

pub enum StoredPlane {
    InMemory(Array2<f32>),
    Spilled(SpilledPlane),
}

impl StoredPlane {
    fn store(plane: Array2<f32>, spill: bool) -> Result<Self> {
        if spill {
            Ok(Self::Spilled(SpilledPlane::spill(&plane)?))
        } else {
            Ok(Self::InMemory(plane))
        }
    }

    pub fn load(&self) -> Result<Array2<f32>> {
        match self {
            Self::InMemory(a) => Ok(a.clone()),
            Self::Spilled(s) => s.load(),
        }
    }
}

impl std::fmt::Debug for StoredPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InMemory(a) => write!(f, "InMemory({:?})", a.dim()),
            Self::Spilled(s) => write!(f, "Spilled({:?})", s.dim()),
        }
    }
}

/// One composited page of the stack.
#[derive(Debug)]
pub struct StackPage {
    /// Input image this page was built from.
    pub index: usize,
    pub name: String,
    planes: Vec<StoredPlane>,
}

impl StackPage {
    pub fn channel_count(&self) -> usize {
        self.planes.len()
    }

    pub fn is_spilled(&self) -> bool {
        self.planes
            .iter()
            .any(|p| matches!(p, StoredPlane::Spilled(_)))
    }
}

/// Composited output: every page has the canvas size and the common format.
#[derive(Debug)]
pub struct AlignedStack {
    pub canvas: CanvasBounds,
    pub format: PixelFormat,
    /// Where the source frame's origin sits on the canvas.
    pub source_origin: OffsetVector,
    pages: Vec<StackPage>,
}

impl AlignedStack {
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn pages(&self) -> &[StackPage] {
        &self.pages
    }

    /// Materialize page `i` as an image.
    pub fn page_image(&self, i: usize) -> Result<SlideImage> {
        let page = &self.pages[i];
        let planes = page
            .planes
            .iter()
            .map(StoredPlane::load)
            .collect::<Result<Vec<_>>>()?;
        Ok(SlideImage::from_planes(planes, self.format)?.with_name(page.name.clone()))
    }
}

/// Canvas and shift for the requested mode.
fn plan_canvas(
    pages: &[PageLayers<'_>],
    table: &OffsetTable,
    keep_all: bool,
) -> Result<(CanvasBounds, OffsetVector)> {
    if !keep_all {
        return Ok((table.canvas, OffsetVector::ZERO));
    }
    let base = Rect::new(
        0,
        0,
        table.canvas.width() as i64,
        table.canvas.height() as i64,
    );
    let union = pages
        .iter()
        .flat_map(|p| p.layers.iter().map(Layer::rect))
        .fold(base, |acc, r| acc.union(&r));
    let canvas = CanvasBounds::new(union.width, union.height)?;
    Ok((canvas, OffsetVector::new(-union.x, -union.y)))
}

fn paste(canvas: &mut Array2<f32>, plane: &Array2<f32>, coverage: Option<&Array2<bool>>, at: OffsetVector) {
    let (ch, cw) = (canvas.nrows() as i64, canvas.ncols() as i64);
    let (lh, lw) = (plane.nrows() as i64, plane.ncols() as i64);
    let (x0, y0) = (at.dx.max(0), at.dy.max(0));
    let (x1, y1) = ((at.dx + lw).min(cw), (at.dy + lh).min(ch));
    if x0 >= x1 || y0 >= y1 {
        return;
    }
    let (sy0, sy1) = ((y0 - at.dy) as usize, (y1 - at.dy) as usize);
    let (sx0, sx1) = ((x0 - at.dx) as usize, (x1 - at.dx) as usize);
    let src = plane.slice(s![sy0..sy1, sx0..sx1]);
    let mut dst = canvas.slice_mut(s![y0 as usize..y1 as usize, x0 as usize..x1 as usize]);
    let large = ((x1 - x0) * (y1 - y0)) as usize >= PARALLEL_PIXEL_THRESHOLD;
    match coverage {
        Some(mask) => {
            let zip = Zip::from(dst).and(src).and(mask.slice(s![sy0..sy1, sx0..sx1]));
            if large {
                zip.par_for_each(|d, &v, &m| {
                    if m {
                        *d = v
                    }
                });
            } else {
                zip.for_each(|d, &v, &m| {
                    if m {
                        *d = v
                    }
                });
            }
        }
        None => dst.assign(&src),
    }
}

/// Composite every page onto a shared canvas.
///
/// In the default mode the canvas is `table.canvas` with the source frame at
/// its top-left and layers are clipped to it. With `keep_all` the canvas grows
/// to contain every layer. Heterogeneous formats are normalized to the common
/// format first.
pub fn composite(
    pages: &[PageLayers<'_>],
    table: &OffsetTable,
    keep_all: bool,
    storage: PlaneStorage,
) -> Result<AlignedStack> {
    let format = PixelFormat::common(
        pages
            .iter()
            .flat_map(|p| p.layers.iter().map(|l| l.image.format)),
    )
    .ok_or_else(|| SlideStackError::EmptyResult("nothing to composite".into()))?;
    let (canvas, shift) = plan_canvas(pages, table, keep_all)?;
    let channels = format.channel_count();

    let stack_bytes = pages.len() * channels * canvas.area() * std::mem::size_of::<f32>();
    let spill = match storage {
        PlaneStorage::InMemory => false,
        PlaneStorage::Disk => true,
        PlaneStorage::Auto => stack_bytes > SPILL_THRESHOLD_BYTES,
    };
    info!(
        pages = pages.len(),
        canvas = %canvas,
        %format,
        spill,
        "Compositing"
    );

    let mut out = Vec::with_capacity(pages.len());
    for page in pages {
        let mut planes = Vec::with_capacity(channels);
        for c in 0..channels {
            let mut plane = Array2::<f32>::zeros((canvas.height(), canvas.width()));
            for layer in &page.layers {
                // Gray layers are replicated into every colour channel.
                let src = &layer.image.planes[c.min(layer.image.channel_count() - 1)];
                let at = OffsetVector::new(layer.origin.dx + shift.dx, layer.origin.dy + shift.dy);
                paste(&mut plane, src, layer.coverage, at);
            }
            planes.push(StoredPlane::store(plane, spill)?);
        }
        debug!(index = page.index, layers = page.layers.len(), "page composited");
        out.push(StackPage {
            index: page.index,
            name: page.name.clone(),
            planes,
        });
    }

    Ok(AlignedStack {
        canvas,
        format,
        source_origin: shift,
        pages: out,
    })
}
