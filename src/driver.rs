use anyhow::{Context, Result};
use facecrop_vision::{overlay, pipeline::normalize, FaceDetector, Pipeline, Sampler};
use image::RgbImage;
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::{Config, ErrorPolicy};
use crate::corpus;
use crate::storage::CropSink;

/// Counters owned by the driver for the duration of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunState {
    pub images_processed: usize,
    pub crops_accepted: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every image in the corpus was processed.
    Exhausted,
    /// More than `max_total_crops` crops were written.
    CapReached,
    /// The interrupt flag was raised.
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub state: RunState,
    pub total_images: usize,
    pub stop: StopReason,
}

/// Walks a corpus one image at a time: normalize, detect, synthesize, save.
pub struct BatchDriver<D, S> {
    pipeline: Pipeline<D>,
    sampler: S,
    max_total_crops: u64,
    sampling_frequency: usize,
    normalize_size: u32,
    on_decode_error: ErrorPolicy,
    interrupted: Arc<AtomicBool>,
}

impl<D: FaceDetector, S: Sampler> BatchDriver<D, S> {
    pub fn new(detector: D, sampler: S, cfg: &Config) -> Self {
        Self {
            pipeline: Pipeline::new(detector, cfg.synthesis),
            sampler,
            max_total_crops: cfg.max_total_crops,
            sampling_frequency: cfg.sampling_frequency.max(1) as usize,
            normalize_size: cfg.normalize_size,
            on_decode_error: cfg.on_decode_error,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Uses `flag` as the interrupt signal; the batch stops before the next
    /// image once it is set.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupted = flag;
        self
    }

    /// Processes the image files in the given order.
    pub fn run<K: CropSink>(&mut self, paths: &[PathBuf], sink: &mut K) -> Result<Summary> {
        self.run_images(
            paths.len(),
            paths.iter().map(|path| corpus::load_image(path)),
            sink,
        )
    }

    /// Processes already-loaded images. `total` is only used for progress.
    pub fn run_images<I, K>(&mut self, total: usize, images: I, sink: &mut K) -> Result<Summary>
    where
        I: IntoIterator<Item = Result<RgbImage>>,
        K: CropSink,
    {
        let mut state = RunState::default();
        let summary = |state: RunState, stop| Summary {
            state,
            total_images: total,
            stop,
        };

        for (i, loaded) in images.into_iter().enumerate() {
            if self.interrupted.load(Ordering::SeqCst) {
                return Ok(summary(state, StopReason::Interrupted));
            }

            let image_index = i + 1;
            state.images_processed += 1;

            let created = match loaded {
                Ok(image) => self.process_image(image_index, image, sink)?,
                Err(err) => match self.on_decode_error {
                    ErrorPolicy::Skip => {
                        warn!("skipping image {}: {:#}", image_index, err);
                        0
                    }
                    ErrorPolicy::Abort => {
                        return Err(err.context(format!("loading image {}", image_index)))
                    }
                },
            };
            state.crops_accepted += created;

            if state.crops_accepted > self.max_total_crops {
                info!("Reached max. Crops created: {}", state.crops_accepted);
                return Ok(summary(state, StopReason::CapReached));
            }

            if self.progress_due(state.images_processed) {
                info!("Images processed: {}/{}", state.images_processed, total);
                info!("Crops created: {}", state.crops_accepted);
            }
        }

        Ok(summary(state, StopReason::Exhausted))
    }

    fn progress_due(&self, images_processed: usize) -> bool {
        images_processed % self.sampling_frequency == 0
    }

    fn process_image<K: CropSink>(
        &mut self,
        image_index: usize,
        image: RgbImage,
        sink: &mut K,
    ) -> Result<u64> {
        let image = normalize(image, self.normalize_size);
        let outcome = self
            .pipeline
            .process(&image, &mut self.sampler)
            .with_context(|| format!("processing image {}", image_index))?;

        debug!(
            "image {}: {} detections, {} accepted, {} rejected",
            image_index,
            outcome.placements.len(),
            outcome.crops.len(),
            outcome.rejected()
        );

        for (n, crop) in outcome.crops.iter().enumerate() {
            sink.save_crop(image_index, n + 1, &crop.image)?;
        }

        if sink.wants_debug() && !outcome.placements.is_empty() {
            let annotated = overlay::draw_placements(&image, &outcome.placements);
            sink.save_debug(image_index, &annotated)?;
        }

        Ok(outcome.crops.len() as u64)
    }
}
