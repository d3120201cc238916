use std::path::Path;

use anyhow::{Context, Result};
use image::{imageops, RgbImage};
use ndarray::Array4;
use ort::{session::Session, value::Value};

use crate::detector::{DetectorParams, FaceDetector};
use crate::geometry::Rect;
use crate::yunet::{self, Candidate, INPUT_SIZE};

/// Upper bound on search scales per image.
const MAX_PYRAMID_LEVELS: i32 = 4;
/// Scaled images whose longer side falls below this are not searched.
const MIN_PYRAMID_SIDE: f64 = 64.0;

/// Face detector backed by the YuNet ONNX model.
///
/// Every image is searched at several scales (`scale_factor` apart); raw
/// candidates from all scales are grouped and a group is reported only when
/// it collected at least `min_neighbors` overlapping candidates.
pub struct YunetDetector {
    session: Session,
    params: DetectorParams,
}

impl YunetDetector {
    pub fn new(session: Session, params: DetectorParams) -> Self {
        Self { session, params }
    }

    pub fn from_file(path: &Path, params: DetectorParams) -> Result<Self> {
        let session = crate::model::detector_session(path)?;
        Ok(Self::new(session, params))
    }

    fn detect_at_scale(&mut self, image: &RgbImage, scale: f32) -> Result<Vec<Candidate>> {
        let (tensor, mapping) = letterbox(image, scale);
        let input_tensor = Value::from_array(tensor)?;

        let outputs = self.session.run(ort::inputs![input_tensor])?;

        let mut output_data: Vec<(Vec<i64>, Vec<f32>)> = Vec::new();
        for (_name, output) in outputs.iter() {
            let (shape, data) = output.try_extract_tensor::<f32>()?;
            output_data.push((shape.iter().copied().collect(), data.to_vec()));
        }
        let output_refs: Vec<(&[i64], &[f32])> = output_data
            .iter()
            .map(|(s, d)| (s.as_slice(), d.as_slice()))
            .collect();

        let (scores, boxes) = yunet::parse_outputs(&output_refs, INPUT_SIZE)?;
        let raw = yunet::decode(&scores, &boxes, self.params.score_threshold, INPUT_SIZE)?;

        Ok(raw
            .into_iter()
            .map(|c| mapping.to_source(c))
            .collect())
    }
}

impl FaceDetector for YunetDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Rect>> {
        let (width, height) = image.dimensions();
        let mut candidates = Vec::new();

        for scale in pyramid_scales(width, height, self.params.scale_factor) {
            let found = self
                .detect_at_scale(image, scale)
                .with_context(|| format!("running detector at scale {:.3}", scale))?;
            log::debug!("scale {:.3}: {} raw candidates", scale, found.len());
            candidates.extend(found);
        }

        let grouped = group_candidates(
            &candidates,
            self.params.nms_threshold,
            self.params.min_neighbors,
        );

        Ok(grouped.iter().filter_map(to_rect).collect())
    }
}

/// Maps canvas coordinates back to the source image.
#[derive(Debug, Clone, Copy)]
struct CanvasMapping {
    scale: f32,
    offset_x: f32,
    offset_y: f32,
}

impl CanvasMapping {
    fn to_source(&self, c: Candidate) -> Candidate {
        let [x, y, w, h] = c.bbox;
        Candidate {
            bbox: [
                (x - self.offset_x) / self.scale,
                (y - self.offset_y) / self.scale,
                w / self.scale,
                h / self.scale,
            ],
            score: c.score,
        }
    }
}

/// Scales `image` by `scale`, centers it on a black square canvas and packs
/// it as a `[1, 3, S, S]` BGR tensor with values in `[0, 255]`.
fn letterbox(image: &RgbImage, scale: f32) -> (Array4<f32>, CanvasMapping) {
    let (width, height) = image.dimensions();
    let new_width = ((width as f32 * scale).round() as u32).clamp(1, INPUT_SIZE as u32);
    let new_height = ((height as f32 * scale).round() as u32).clamp(1, INPUT_SIZE as u32);

    let resized;
    let placed = if (new_width, new_height) == (width, height) {
        image
    } else {
        resized = imageops::resize(image, new_width, new_height, imageops::FilterType::Triangle);
        &resized
    };

    let offset_x = (INPUT_SIZE as u32 - new_width) / 2;
    let offset_y = (INPUT_SIZE as u32 - new_height) / 2;

    let mut tensor = Array4::<f32>::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));
    for (x, y, pixel) in placed.enumerate_pixels() {
        let cx = (x + offset_x) as usize;
        let cy = (y + offset_y) as usize;
        tensor[[0, 0, cy, cx]] = pixel[2] as f32;
        tensor[[0, 1, cy, cx]] = pixel[1] as f32;
        tensor[[0, 2, cy, cx]] = pixel[0] as f32;
    }

    let mapping = CanvasMapping {
        scale: new_width as f32 / width as f32,
        offset_x: offset_x as f32,
        offset_y: offset_y as f32,
    };
    (tensor, mapping)
}

/// Search scales for an image, largest first.
///
/// The first scale fits the image on the model input without upscaling; each
/// following one is `scale_factor` times smaller.
pub fn pyramid_scales(width: u32, height: u32, scale_factor: f64) -> Vec<f32> {
    let longest = width.max(height).max(1) as f64;
    let base = (INPUT_SIZE as f64 / longest).min(1.0);

    let mut scales = vec![base as f32];
    for level in 1..MAX_PYRAMID_LEVELS {
        let scale = base / scale_factor.powi(level);
        if longest * scale < MIN_PYRAMID_SIDE {
            break;
        }
        scales.push(scale as f32);
    }
    scales
}

/// Greedy grouping of overlapping candidates.
///
/// The strongest remaining candidate absorbs every other candidate whose IoU
/// with it exceeds `iou_threshold`; it is kept only if it absorbed at least
/// `min_neighbors` of them. Result is ordered by descending score.
pub fn group_candidates(
    candidates: &[Candidate],
    iou_threshold: f32,
    min_neighbors: u32,
) -> Vec<Candidate> {
    let mut sorted = candidates.to_vec();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep = Vec::new();
    let mut suppressed = vec![false; sorted.len()];

    for i in 0..sorted.len() {
        if suppressed[i] {
            continue;
        }
        let mut neighbors = 0u32;
        for j in (i + 1)..sorted.len() {
            if suppressed[j] {
                continue;
            }
            if compute_iou(&sorted[i].bbox, &sorted[j].bbox) > iou_threshold {
                suppressed[j] = true;
                neighbors += 1;
            }
        }
        if neighbors >= min_neighbors {
            keep.push(sorted[i]);
        }
    }

    keep
}

fn compute_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = (a[0] + a[2]).min(b[0] + b[2]);
    let y2 = (a[1] + a[3]).min(b[1] + b[3]);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let inter = (x2 - x1) * (y2 - y1);
    let area_a = a[2] * a[3];
    let area_b = b[2] * b[3];
    inter / (area_a + area_b - inter)
}

fn to_rect(c: &Candidate) -> Option<Rect> {
    let [x, y, w, h] = c.bbox;
    let rect = Rect::new(
        x.round() as i32,
        y.round() as i32,
        w.round() as i32,
        h.round() as i32,
    );
    (rect.width > 0 && rect.height > 0).then_some(rect)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(x: f32, y: f32, size: f32, score: f32) -> Candidate {
        Candidate {
            bbox: [x, y, size, size],
            score,
        }
    }

    #[test]
    fn test_iou() {
        let a = [10.0, 10.0, 20.0, 20.0];
        let b = [15.0, 15.0, 20.0, 20.0];
        let iou = compute_iou(&a, &b);
        assert!(iou > 0.0 && iou < 1.0);

        let c = [100.0, 100.0, 10.0, 10.0];
        assert_eq!(compute_iou(&a, &c), 0.0);
    }

    #[test]
    fn grouping_without_neighbor_requirement_is_nms() {
        let candidates = vec![
            cand(10.0, 10.0, 20.0, 0.9),
            cand(12.0, 12.0, 20.0, 0.8),
            cand(100.0, 100.0, 20.0, 0.85),
        ];

        let result = group_candidates(&candidates, 0.3, 0);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].score, 0.9);
        assert_eq!(result[1].score, 0.85);
    }

    #[test]
    fn grouping_drops_unsupported_detections() {
        let candidates = vec![
            cand(10.0, 10.0, 40.0, 0.9),
            cand(11.0, 10.0, 40.0, 0.7),
            cand(10.0, 12.0, 40.0, 0.75),
            cand(200.0, 200.0, 40.0, 0.95),
        ];

        let result = group_candidates(&candidates, 0.3, 2);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].bbox[0], 10.0);
    }

    #[test]
    fn pyramid_never_upscales() {
        let scales = pyramid_scales(500, 375, 1.25);
        assert_eq!(scales.len(), 4);
        assert_eq!(scales[0], 1.0);
        assert!((scales[1] - 0.8).abs() < 1e-6);
        assert!(scales.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn pyramid_fits_large_images_and_stops_when_small() {
        let scales = pyramid_scales(1280, 720, 1.1);
        assert!((scales[0] - 0.5).abs() < 1e-6);

        let scales = pyramid_scales(70, 70, 2.0);
        assert_eq!(scales, vec![1.0]);
    }

    #[test]
    fn letterbox_centers_bgr_pixels() {
        let mut image = RgbImage::new(100, 50);
        image.put_pixel(0, 0, image::Rgb([10, 20, 30]));

        let (tensor, mapping) = letterbox(&image, 1.0);
        let (ox, oy) = (270, 295);
        assert_eq!(mapping.offset_x, ox as f32);
        assert_eq!(mapping.offset_y, oy as f32);
        assert_eq!(tensor[[0, 0, oy, ox]], 30.0);
        assert_eq!(tensor[[0, 1, oy, ox]], 20.0);
        assert_eq!(tensor[[0, 2, oy, ox]], 10.0);
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);

        let back = mapping.to_source(cand(280.0, 305.0, 20.0, 1.0));
        assert_eq!(back.bbox, [10.0, 10.0, 20.0, 20.0]);
    }

    #[test]
    fn letterbox_maps_scaled_boxes_back() {
        let image = RgbImage::new(400, 400);
        let (_, mapping) = letterbox(&image, 0.5);
        // 200x200 placed at (220, 220)
        let back = mapping.to_source(cand(230.0, 240.0, 50.0, 1.0));
        assert_eq!(back.bbox, [20.0, 40.0, 100.0, 100.0]);
    }

    #[test]
    fn rounds_and_filters_rects() {
        assert_eq!(
            to_rect(&Candidate {
                bbox: [1.4, 2.6, 30.5, 29.2],
                score: 1.0
            }),
            Some(Rect::new(1, 3, 31, 29))
        );
        assert_eq!(
            to_rect(&Candidate {
                bbox: [5.0, 5.0, 0.2, 10.0],
                score: 1.0
            }),
            None
        );
    }
}
