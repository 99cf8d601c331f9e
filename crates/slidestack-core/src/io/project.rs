//! TOML project manifest: the ordered image list, the landmarks picked on
//! them and optionally the alignment settings.
//!
//! ```toml
//! images = ["slide_01.png", "slide_02.png"]
//!
//! [[landmarks]]
//! x = 120.5
//! y = 88.0
//! image = 0
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SlideStackError};
use crate::geometry::Point2;
use crate::landmarks::LandmarkSet;
use crate::pipeline::config::AlignmentConfig;

/// One landmark and the image it was picked on.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LandmarkEntry {
    pub x: f64,
    pub y: f64,
    pub image: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectManifest {
    pub images: Vec<PathBuf>,
    /// Flat landmark list; per image, order of appearance is landmark order.
    #[serde(default)]
    pub landmarks: Vec<LandmarkEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<AlignmentConfig>,
}

impl ProjectManifest {
    /// Parse a manifest; relative image and output paths are resolved
    /// against the manifest's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut manifest: ProjectManifest =
            toml::from_str(&text).map_err(|e| SlideStackError::Project(e.to_string()))?;
        if let Some(base) = path.parent() {
            let resolve = |p: &PathBuf| {
                if p.is_relative() {
                    base.join(p)
                } else {
                    p.clone()
                }
            };
            manifest.images = manifest.images.iter().map(resolve).collect();
            manifest.output = manifest.output.as_ref().map(resolve);
        }
        manifest.landmark_sets()?;
        Ok(manifest)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text =
            toml::to_string_pretty(self).map_err(|e| SlideStackError::Project(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Group the flat landmark list into one ordered set per image.
    pub fn landmark_sets(&self) -> Result<Vec<LandmarkSet>> {
        let mut sets = vec![LandmarkSet::default(); self.images.len()];
        for (n, entry) in self.landmarks.iter().enumerate() {
            let set = sets.get_mut(entry.image).ok_or_else(|| {
                SlideStackError::Project(format!(
                    "landmark #{n} refers to image {} but only {} images are listed",
                    entry.image,
                    self.images.len()
                ))
            })?;
            set.points.push(Point2::new(entry.x, entry.y));
        }
        Ok(sets)
    }

    /// Flatten per-image sets back into manifest entries.
    pub fn set_landmarks(&mut self, sets: &[LandmarkSet]) {
        self.landmarks = sets
            .iter()
            .enumerate()
            .flat_map(|(image, set)| {
                set.points.iter().map(move |p| LandmarkEntry {
                    x: p.x,
                    y: p.y,
                    image,
                })
            })
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landmarks_group_by_image_in_order() {
        let manifest = ProjectManifest {
            images: vec!["a.png".into(), "b.png".into()],
            landmarks: vec![
                LandmarkEntry { x: 1.0, y: 1.0, image: 1 },
                LandmarkEntry { x: 2.0, y: 2.0, image: 0 },
                LandmarkEntry { x: 3.0, y: 3.0, image: 1 },
            ],
            ..Default::default()
        };
        let sets = manifest.landmark_sets().unwrap();
        assert_eq!(sets[0].len(), 1);
        assert_eq!(sets[1].points, vec![Point2::new(1.0, 1.0), Point2::new(3.0, 3.0)]);
    }

    #[test]
    fn landmark_on_unknown_image_is_rejected() {
        let manifest = ProjectManifest {
            images: vec!["a.png".into()],
            landmarks: vec![LandmarkEntry { x: 0.0, y: 0.0, image: 3 }],
            ..Default::default()
        };
        assert!(matches!(
            manifest.landmark_sets(),
            Err(SlideStackError::Project(_))
        ));
    }
}
