use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::error::Result;
use crate::geometry::Dimensions;
use crate::image::SlideImage;
use crate::io::image_io::load_image;
use crate::landmarks::LandmarkSet;
use crate::vision::{NativeBackend, VisionBackend};

use super::config::AlignmentConfig;

/// Everything one alignment run works on: the ordered images, their
/// landmarks, the configuration and the vision backend.
///
/// Runs take the session explicitly; nothing is tracked globally.
#[derive(Clone)]
pub struct AlignmentSession {
    images: Vec<SlideImage>,
    landmarks: Vec<LandmarkSet>,
    pub config: AlignmentConfig,
    backend: Arc<dyn VisionBackend>,
}

impl AlignmentSession {
    /// New session using the native backend tuned by `config.features`.
    pub fn new(images: Vec<SlideImage>, config: AlignmentConfig) -> Self {
        let backend = Arc::new(NativeBackend::from(&config.features));
        let landmarks = vec![LandmarkSet::default(); images.len()];
        Self {
            images,
            landmarks,
            config,
            backend,
        }
    }

    /// Decode every path into a session, in order.
    pub fn load<P: AsRef<Path>>(paths: &[P], config: AlignmentConfig) -> Result<Self> {
        let images = paths
            .iter()
            .map(|p| load_image(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        info!(count = images.len(), "Loaded images");
        Ok(Self::new(images, config))
    }

    pub fn with_landmarks(mut self, landmarks: Vec<LandmarkSet>) -> Self {
        self.landmarks = landmarks;
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn VisionBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn images(&self) -> &[SlideImage] {
        &self.images
    }

    pub fn landmarks(&self) -> &[LandmarkSet] {
        &self.landmarks
    }

    pub fn backend(&self) -> &dyn VisionBackend {
        self.backend.as_ref()
    }

    pub fn dimensions(&self) -> Vec<Dimensions> {
        self.images.iter().map(SlideImage::dimensions).collect()
    }

    /// Index of the image every other image is registered onto.
    pub fn source_index(&self) -> Result<usize> {
        self.config.source.resolve(&self.dimensions())
    }
}

impl std::fmt::Debug for AlignmentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignmentSession")
            .field("images", &self.images.len())
            .field("landmarks", &self.landmarks)
            .field("config", &self.config)
            .field("backend", &self.backend.name())
            .finish()
    }
}
