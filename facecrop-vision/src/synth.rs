//! Randomized crop synthesis around detected faces.
//!
//! Each detection is enlarged by a random padding, shifted by a random
//! jitter, clamped to the image and finally size-tested. The order
//! randomize → clamp → test matters: boxes near the frame edge shrink during
//! clamping and are rejected more often.

use image::{imageops, RgbImage};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ParamsError;
use crate::geometry::Rect;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisParams {
    /// Lower bound of the padding factor, relative to the box width.
    pub resize_min: f64,
    /// Upper bound of the padding factor, relative to the box width.
    pub resize_max: f64,
    /// Bound of the fractional position jitter, drawn from `[-offset_max, offset_max]`.
    pub offset_max: f64,
    /// A crop is kept only if both sides are strictly larger than this.
    pub min_crop_size: u32,
}

impl Default for SynthesisParams {
    fn default() -> Self {
        Self {
            resize_min: 0.75,
            resize_max: 1.5,
            offset_max: 0.5,
            min_crop_size: 128,
        }
    }
}

impl SynthesisParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        for (name, value) in [
            ("resize_min", self.resize_min),
            ("resize_max", self.resize_max),
            ("offset_max", self.offset_max),
        ] {
            if !value.is_finite() {
                return Err(ParamsError::NotFinite { name, value });
            }
        }
        if self.resize_min < 0.0 {
            return Err(ParamsError::NegativeResize(self.resize_min));
        }
        if self.resize_min > self.resize_max {
            return Err(ParamsError::ResizeRange {
                min: self.resize_min,
                max: self.resize_max,
            });
        }
        if self.offset_max < 0.0 {
            return Err(ParamsError::NegativeOffset(self.offset_max));
        }
        Ok(())
    }
}

/// Random draws for a single detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Perturbation {
    pub resize_factor: f64,
    pub jitter_x: f64,
    pub jitter_y: f64,
}

impl Perturbation {
    pub const fn new(resize_factor: f64, jitter_x: f64, jitter_y: f64) -> Self {
        Self {
            resize_factor,
            jitter_x,
            jitter_y,
        }
    }
}

/// Source of per-detection perturbations.
pub trait Sampler {
    fn sample(&mut self, params: &SynthesisParams) -> Perturbation;
}

/// A fixed perturbation, returned for every detection.
impl Sampler for Perturbation {
    fn sample(&mut self, _params: &SynthesisParams) -> Perturbation {
        *self
    }
}

/// Draws perturbations uniformly from the ranges in [`SynthesisParams`].
pub struct RandomSampler<R> {
    rng: R,
}

impl<R: Rng> RandomSampler<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> Sampler for RandomSampler<R> {
    fn sample(&mut self, params: &SynthesisParams) -> Perturbation {
        // draw order: resize, x jitter, y jitter
        let resize_factor = self.rng.gen_range(params.resize_min..=params.resize_max);
        let jitter_x = self
            .rng
            .gen_range(-params.offset_max..=params.offset_max);
        let jitter_y = self
            .rng
            .gen_range(-params.offset_max..=params.offset_max);
        Perturbation::new(resize_factor, jitter_x, jitter_y)
    }
}

/// Clamped crop box for one detection together with its accept decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub rect: Rect,
    pub accepted: bool,
}

#[derive(Debug, Clone)]
pub struct Crop {
    pub rect: Rect,
    pub image: RgbImage,
}

/// Enlarges and shifts `rect` before any clamping.
///
/// Fractional amounts are truncated toward zero. The vertical jitter is
/// scaled by the box's `y` coordinate while the horizontal jitter is scaled
/// by its width.
///
/// Float-to-int conversions and the additions saturate at the `i32` range,
/// so huge factors yield an oversized box that clamping cuts back down.
pub fn expand(rect: Rect, p: Perturbation) -> Rect {
    let padding = (rect.width as f64 * p.resize_factor) as i32;

    let x = rect
        .x
        .saturating_add((rect.width as f64 * p.jitter_x) as i32)
        .saturating_sub(padding / 2);
    let y = rect
        .y
        .saturating_add((rect.y as f64 * p.jitter_y) as i32)
        .saturating_sub(padding / 2);

    Rect {
        x,
        y,
        width: rect.width.saturating_add(padding),
        height: rect.height.saturating_add(padding),
    }
}

/// Expands, clamps and size-tests a detection without touching pixels.
pub fn place(
    rect: Rect,
    image_dims: (u32, u32),
    params: &SynthesisParams,
    p: Perturbation,
) -> Placement {
    let (image_width, image_height) = image_dims;
    let clamped = expand(rect, p).clamp_to(image_width, image_height);
    let min = params.min_crop_size as i64;
    Placement {
        rect: clamped,
        accepted: clamped.width as i64 > min && clamped.height as i64 > min,
    }
}

/// Copies the pixels of an accepted placement out of `image`.
pub fn extract(image: &RgbImage, placement: &Placement) -> Option<Crop> {
    if !placement.accepted || !placement.rect.is_within(image.width(), image.height()) {
        return None;
    }
    let r = placement.rect;
    let pixels = imageops::crop_imm(
        image,
        r.x as u32,
        r.y as u32,
        r.width as u32,
        r.height as u32,
    )
    .to_image();
    Some(Crop {
        rect: r,
        image: pixels,
    })
}

/// Produces zero or one crop for a detection. Rejection is not an error.
pub fn synthesize<S: Sampler + ?Sized>(
    image: &RgbImage,
    rect: Rect,
    params: &SynthesisParams,
    sampler: &mut S,
) -> Option<Crop> {
    let p = sampler.sample(params);
    let placement = place(rect, image.dimensions(), params, p);
    extract(image, &placement)
}
