use anyhow::{Context, Result};
use image::{imageops, RgbImage};

use crate::detector::FaceDetector;
use crate::synth::{self, Crop, Placement, Sampler, SynthesisParams};

/// Downscales `image` so its longer side equals `target`.
///
/// Images with both sides below `target` are returned unchanged.
pub fn normalize(image: RgbImage, target: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    let longest = width.max(height);
    if target == 0 || longest <= target {
        return image;
    }

    let scale = target as f64 / longest as f64;
    let new_width = ((width as f64 * scale) as u32).max(1);
    let new_height = ((height as f64 * scale) as u32).max(1);
    imageops::resize(
        &image,
        new_width,
        new_height,
        imageops::FilterType::Triangle,
    )
}

/// Everything produced for one image.
#[derive(Debug, Default)]
pub struct ImageOutcome {
    /// Accepted crops, in detection order.
    pub crops: Vec<Crop>,
    /// One placement per detection, accepted or not.
    pub placements: Vec<Placement>,
}

impl ImageOutcome {
    /// Detections whose crop failed the size test.
    pub fn rejected(&self) -> usize {
        self.placements.len() - self.crops.len()
    }
}

/// Detect → synthesize for single images.
pub struct Pipeline<D> {
    detector: D,
    params: SynthesisParams,
}

impl<D: FaceDetector> Pipeline<D> {
    pub fn new(detector: D, params: SynthesisParams) -> Self {
        Self { detector, params }
    }

    /// Runs the detector on `image` and synthesizes at most one crop per
    /// detection, keeping detection order.
    pub fn process<S: Sampler + ?Sized>(
        &mut self,
        image: &RgbImage,
        sampler: &mut S,
    ) -> Result<ImageOutcome> {
        let detections = self.detector.detect(image).context("detecting faces")?;

        let mut outcome = ImageOutcome::default();
        for rect in detections {
            let p = sampler.sample(&self.params);
            let placement = synth::place(rect, image.dimensions(), &self.params, p);
            if let Some(crop) = synth::extract(image, &placement) {
                outcome.crops.push(crop);
            } else {
                log::debug!("rejected {:?} from detection {:?}", placement.rect, rect);
            }
            outcome.placements.push(placement);
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::synth::Perturbation;

    struct Fixed(Vec<Rect>);

    impl FaceDetector for Fixed {
        fn detect(&mut self, _image: &RgbImage) -> Result<Vec<Rect>> {
            Ok(self.0.clone())
        }
    }

    struct Failing;

    impl FaceDetector for Failing {
        fn detect(&mut self, _image: &RgbImage) -> Result<Vec<Rect>> {
            anyhow::bail!("model exploded")
        }
    }

    #[test]
    fn normalize_downscales_longer_side() {
        let out = normalize(RgbImage::new(1000, 600), 500);
        assert_eq!(out.dimensions(), (500, 300));

        let out = normalize(RgbImage::new(600, 1200), 500);
        assert_eq!(out.dimensions(), (250, 500));
    }

    #[test]
    fn normalize_keeps_small_images() {
        let out = normalize(RgbImage::new(499, 320), 500);
        assert_eq!(out.dimensions(), (499, 320));
        let out = normalize(RgbImage::new(500, 320), 500);
        assert_eq!(out.dimensions(), (500, 320));
    }

    #[test]
    fn process_keeps_detection_order() {
        let image = RgbImage::new(400, 400);
        let detections = vec![
            Rect::new(150, 150, 100, 100),
            Rect::new(0, 390, 5, 5),
            Rect::new(40, 40, 80, 80),
        ];
        let params = SynthesisParams {
            min_crop_size: 50,
            ..Default::default()
        };
        let mut pipeline = Pipeline::new(Fixed(detections), params);
        let mut sampler = Perturbation::new(1.0, 0.0, 0.0);

        let outcome = pipeline.process(&image, &mut sampler).unwrap();
        assert_eq!(outcome.placements.len(), 3);
        assert_eq!(outcome.crops.len(), 2);
        assert_eq!(outcome.rejected(), 1);
        assert_eq!(outcome.crops[0].rect, Rect::new(100, 100, 200, 200));
        assert_eq!(outcome.crops[1].rect, Rect::new(0, 0, 160, 160));
        assert!(!outcome.placements[1].accepted);
    }

    #[test]
    fn detector_errors_propagate() {
        let mut pipeline = Pipeline::new(Failing, SynthesisParams::default());
        let err = pipeline
            .process(&RgbImage::new(10, 10), &mut Perturbation::new(1.0, 0.0, 0.0))
            .unwrap_err();
        assert!(format!("{:#}", err).contains("model exploded"));
    }
}
