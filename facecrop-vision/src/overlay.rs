//! Diagnostic drawing of crop placements.
//!
//! Purely visual; nothing here feeds back into which crops are kept.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;

use crate::synth::Placement;

pub const ACCEPTED_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
pub const REJECTED_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const THICKNESS: i32 = 2;

/// Returns a copy of `image` with one outline per placement.
pub fn draw_placements(image: &RgbImage, placements: &[Placement]) -> RgbImage {
    let mut canvas = image.clone();
    for placement in placements {
        let color = if placement.accepted {
            ACCEPTED_COLOR
        } else {
            REJECTED_COLOR
        };
        draw_outline(&mut canvas, placement, color);
    }
    canvas
}

fn draw_outline(canvas: &mut RgbImage, placement: &Placement, color: Rgb<u8>) {
    let r = placement.rect;
    for t in 0..THICKNESS {
        let (w, h) = (r.width - 2 * t, r.height - 2 * t);
        if w <= 0 || h <= 0 {
            break;
        }
        let outline = imageproc::rect::Rect::at(r.x + t, r.y + t).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(canvas, outline, color);
    }
}
