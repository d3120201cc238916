//! YuNet output decoding.
//!
//! YuNet is an anchor-free detector. For each stride (8, 16, 32) it emits
//! four tensors over an `(S/stride)²` grid:
//! - cls: `[1, H*W, 1]` classification probability
//! - obj: `[1, H*W, 1]` objectness probability
//! - bbox: `[1, H*W, 4]` offsets `(dx, dy)` and log-sizes `(dw, dh)` in stride units
//! - kps: `[1, H*W, 10]` landmark deltas (unused here)
//!
//! Output order: cls_8, cls_16, cls_32, obj_8, obj_16, obj_32,
//! bbox_8, bbox_16, bbox_32, kps_8, kps_16, kps_32.

use anyhow::{bail, Result};
use ndarray::{Array2, ArrayView2};

pub const STRIDES: [usize; 3] = [8, 16, 32];

/// Square input edge the bundled model was exported with.
pub const INPUT_SIZE: usize = 640;

/// A decoded box in canvas pixels, before grouping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// x, y, w, h
    pub bbox: [f32; 4],
    pub score: f32,
}

/// Face confidence of one grid cell: `sqrt(cls * obj)` with both clamped to `[0, 1]`.
pub fn cell_score(cls: f32, obj: f32) -> f32 {
    (cls.clamp(0.0, 1.0) * obj.clamp(0.0, 1.0)).sqrt()
}

fn grid_cells(input_size: usize, stride: usize) -> usize {
    (input_size / stride) * (input_size / stride)
}

fn tensor_at<'a>(
    outputs: &'a [(&'a [i64], &'a [f32])],
    index: usize,
    cells: usize,
    channels: usize,
) -> Result<ArrayView2<'a, f32>> {
    let Some((shape, data)) = outputs.get(index) else {
        bail!("missing YuNet output at index {}", index);
    };
    if shape.len() != 3 || shape[0] != 1 || shape[1] as usize != cells || shape[2] as usize != channels
    {
        bail!(
            "unexpected shape at index {}: {:?}, expected [1, {}, {}]",
            index,
            shape,
            cells,
            channels
        );
    }
    Ok(ArrayView2::from_shape((cells, channels), *data)?)
}

/// Split the raw outputs into per-stride score and box matrices.
///
/// Scores are combined with [`cell_score`].
pub fn parse_outputs(
    outputs: &[(&[i64], &[f32])],
    input_size: usize,
) -> Result<(Vec<Array2<f32>>, Vec<Array2<f32>>)> {
    if outputs.len() < 9 {
        bail!("expected 12 YuNet outputs, got {}", outputs.len());
    }

    let mut scores = Vec::with_capacity(STRIDES.len());
    let mut boxes = Vec::with_capacity(STRIDES.len());

    for (level, &stride) in STRIDES.iter().enumerate() {
        let cells = grid_cells(input_size, stride);
        let cls = tensor_at(outputs, level, cells, 1)?;
        let obj = tensor_at(outputs, level + 3, cells, 1)?;
        let bbox = tensor_at(outputs, level + 6, cells, 4)?;

        let mut combined = cls.to_owned();
        combined.zip_mut_with(&obj, |c, &o| *c = cell_score(*c, o));
        scores.push(combined);
        boxes.push(bbox.to_owned());
    }

    Ok((scores, boxes))
}

/// Grid-based decoding of every cell scoring at least `score_threshold`.
///
/// `cx = (col + dx) * stride`, `cy = (row + dy) * stride`,
/// `w = exp(dw) * stride`, `h = exp(dh) * stride`, all in canvas pixels.
pub fn decode(
    scores: &[Array2<f32>],
    boxes: &[Array2<f32>],
    score_threshold: f32,
    input_size: usize,
) -> Result<Vec<Candidate>> {
    let mut candidates = Vec::new();

    for (level, &stride) in STRIDES.iter().enumerate() {
        let (Some(level_scores), Some(level_boxes)) = (scores.get(level), boxes.get(level)) else {
            bail!("missing decoded tensors for stride {}", stride);
        };
        let side = input_size / stride;
        if level_scores.nrows() != side * side || level_boxes.nrows() != side * side {
            bail!(
                "stride {} expects {} cells, got {} scores and {} boxes",
                stride,
                side * side,
                level_scores.nrows(),
                level_boxes.nrows()
            );
        }

        let s = stride as f32;
        for row in 0..side {
            for col in 0..side {
                let idx = row * side + col;
                let score = level_scores[[idx, 0]];
                if score < score_threshold {
                    continue;
                }

                let cx = (col as f32 + level_boxes[[idx, 0]]) * s;
                let cy = (row as f32 + level_boxes[[idx, 1]]) * s;
                let w = level_boxes[[idx, 2]].exp() * s;
                let h = level_boxes[[idx, 3]].exp() * s;

                candidates.push(Candidate {
                    bbox: [cx - w / 2.0, cy - h / 2.0, w, h],
                    score,
                });
            }
        }
    }

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_score() {
        assert!((cell_score(0.64, 0.25) - 0.4).abs() < 1e-6);
        assert_eq!(cell_score(-0.2, 0.9), 0.0);
        assert!((cell_score(1.3, 1.0) - 1.0).abs() < 1e-6);
    }

    fn empty_level(stride: usize, channels: usize) -> Array2<f32> {
        Array2::zeros((grid_cells(INPUT_SIZE, stride), channels))
    }

    #[test]
    fn decodes_single_cell() {
        let mut scores: Vec<_> = STRIDES.iter().map(|&s| empty_level(s, 1)).collect();
        let mut boxes: Vec<_> = STRIDES.iter().map(|&s| empty_level(s, 4)).collect();

        // stride 32, 20x20 grid, cell (row 10, col 10)
        let idx = 10 * 20 + 10;
        scores[2][[idx, 0]] = 0.9;
        boxes[2][[idx, 0]] = 0.5;
        boxes[2][[idx, 1]] = 0.25;
        boxes[2][[idx, 2]] = 4f32.ln();
        boxes[2][[idx, 3]] = 4f32.ln();

        let found = decode(&scores, &boxes, 0.5, INPUT_SIZE).unwrap();
        assert_eq!(found.len(), 1);

        // cx = 10.5 * 32 = 336, cy = 10.25 * 32 = 328, w = h = 128
        let c = found[0];
        assert!((c.bbox[0] - 272.0).abs() < 1e-3);
        assert!((c.bbox[1] - 264.0).abs() < 1e-3);
        assert!((c.bbox[2] - 128.0).abs() < 1e-3);
        assert!((c.bbox[3] - 128.0).abs() < 1e-3);
        assert!((c.score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn parse_combines_cls_and_obj() {
        let mut owned: Vec<(Vec<i64>, Vec<f32>)> = Vec::new();
        for (channels, fill) in [(1usize, 0.64f32), (1, 0.25), (4, 0.0), (10, 0.0)] {
            for &stride in &STRIDES {
                let cells = grid_cells(INPUT_SIZE, stride);
                owned.push((
                    vec![1, cells as i64, channels as i64],
                    vec![fill; cells * channels],
                ));
            }
        }
        let refs: Vec<(&[i64], &[f32])> = owned
            .iter()
            .map(|(s, d)| (s.as_slice(), d.as_slice()))
            .collect();

        let (scores, boxes) = parse_outputs(&refs, INPUT_SIZE).unwrap();
        assert_eq!(scores.len(), 3);
        assert_eq!(boxes[0].dim(), (6400, 4));
        assert!((scores[1][[0, 0]] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn parse_rejects_wrong_shape() {
        let cells = grid_cells(INPUT_SIZE, 8);
        let shape = [1i64, cells as i64, 2];
        let data = vec![0.0f32; cells * 2];
        let refs = vec![(&shape[..], &data[..]); 12];
        assert!(parse_outputs(&refs, INPUT_SIZE).is_err());
    }
}
