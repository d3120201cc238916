/// Axis-aligned rectangle in integer pixel coordinates, origin top-left.
///
/// Intermediate values may be out of frame or have a non-positive size;
/// [`Rect::clamp_to`] brings a rectangle back inside image bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    /// Shrinks the rectangle so it does not extend past an image of the given size.
    ///
    /// A negative origin is moved to zero and the size reduced by the overflow;
    /// the far edges are then cut at the image border. The result can still have
    /// a non-positive size when the rectangle lies mostly outside the frame.
    pub fn clamp_to(self, image_width: u32, image_height: u32) -> Self {
        let (mut x, mut y) = (self.x as i64, self.y as i64);
        let (mut width, mut height) = (self.width as i64, self.height as i64);
        let (w, h) = (image_width as i64, image_height as i64);

        if x < 0 {
            width += x;
            x = 0;
        }
        if y < 0 {
            height += y;
            y = 0;
        }
        if x + width > w {
            width = w - x;
        }
        if y + height > h {
            height = h - y;
        }

        Rect {
            x: saturate(x),
            y: saturate(y),
            width: saturate(width),
            height: saturate(height),
        }
    }

    /// True when the rectangle has positive size and lies inside `[0, w) × [0, h)`.
    pub fn is_within(&self, image_width: u32, image_height: u32) -> bool {
        self.x >= 0
            && self.y >= 0
            && self.width > 0
            && self.height > 0
            && self.right() as i64 <= image_width as i64
            && self.bottom() as i64 <= image_height as i64
    }
}

fn saturate(v: i64) -> i32 {
    v.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}
