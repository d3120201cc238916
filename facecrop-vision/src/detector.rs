use anyhow::Result;
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::ParamsError;
use crate::geometry::Rect;

/// Pluggable face detection backend.
///
/// Implementations return face rectangles in the pixel space of `image`.
/// The order of the returned rectangles is kept by every consumer.
pub trait FaceDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Rect>>;
}

impl<D: FaceDetector + ?Sized> FaceDetector for Box<D> {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Rect>> {
        (**self).detect(image)
    }
}

/// Tuning knobs handed to the detector unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorParams {
    /// Step between search scales; must be greater than 1.
    pub scale_factor: f64,
    /// Overlapping candidates a detection needs before it is reported.
    pub min_neighbors: u32,
    pub score_threshold: f32,
    /// IoU above which two candidates are treated as the same face.
    pub nms_threshold: f32,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.1,
            min_neighbors: 3,
            score_threshold: 0.6,
            nms_threshold: 0.3,
        }
    }
}

impl DetectorParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        if !self.scale_factor.is_finite() {
            return Err(ParamsError::NotFinite {
                name: "scale_factor",
                value: self.scale_factor,
            });
        }
        if self.scale_factor <= 1.0 {
            return Err(ParamsError::ScaleFactor(self.scale_factor));
        }
        for (name, value) in [
            ("score_threshold", self.score_threshold),
            ("nms_threshold", self.nms_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ParamsError::Threshold { name, value });
            }
        }
        Ok(())
    }
}
