use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    /// Builds a box from OCR corner coordinates; inverted corners collapse to zero size.
    pub fn from_corners(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x: x0,
            y: y0,
            width: (x1 - x0).max(0.0),
            height: (y1 - y0).max(0.0),
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkingSize {
    pub width: u32,
    pub height: u32,
    pub scale: f32,
}

/// Pixel-aligned rectangle, `x1`/`y1` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl PixelRect {
    pub fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }
}

/// Downscale factor that fits an image inside `max_width` x `max_height`.
/// Never exceeds 1, so images already within bounds are not upscaled.
pub fn compute_scale(width: u32, height: u32, max_width: u32, max_height: u32) -> f32 {
    if width == 0 || height == 0 {
        return 1.0;
    }
    let width_ratio = max_width as f32 / width as f32;
    let height_ratio = max_height as f32 / height as f32;
    width_ratio.min(height_ratio).min(1.0)
}

pub fn working_size(width: u32, height: u32, max_width: u32, max_height: u32) -> WorkingSize {
    let scale = compute_scale(width, height, max_width, max_height);
    if scale >= 1.0 {
        return WorkingSize {
            width,
            height,
            scale: 1.0,
        };
    }
    WorkingSize {
        width: ((width as f32 * scale).round() as u32).max(1),
        height: ((height as f32 * scale).round() as u32).max(1),
        scale,
    }
}

/// Maps a box measured on the working image back to original-image pixels.
pub fn to_original(bbox: &BoundingBox, scale: f32) -> BoundingBox {
    if scale <= 0.0 || scale == 1.0 {
        return *bbox;
    }
    BoundingBox {
        x: bbox.x / scale,
        y: bbox.y / scale,
        width: bbox.width / scale,
        height: bbox.height / scale,
    }
}

/// Rounds a box outward to whole pixels and clamps it to the canvas.
pub fn to_pixel_rect(bbox: &BoundingBox, canvas_width: u32, canvas_height: u32) -> Option<PixelRect> {
    let x0 = bbox.x.floor().clamp(0.0, canvas_width as f32) as u32;
    let y0 = bbox.y.floor().clamp(0.0, canvas_height as f32) as u32;
    let x1 = bbox.right().ceil().clamp(0.0, canvas_width as f32) as u32;
    let y1 = bbox.bottom().ceil().clamp(0.0, canvas_height as f32) as u32;
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(PixelRect { x0, y0, x1, y1 })
}
