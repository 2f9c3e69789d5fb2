//! In-memory canvas raster.

use image::imageops::{self, FilterType};
use image::RgbaImage;

/// Width of the pen in backing pixels.
pub const DEFAULT_STROKE_WIDTH: f32 = 4.0;

/// A position in either screen or backing pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// The size the canvas is displayed at on screen.
///
/// Pointer coordinates arrive in this space and are rescaled to the backing
/// resolution before anything is drawn, so strokes land in the right place
/// however the canvas is stretched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// A viewport showing the surface at its native size.
    pub fn native(surface: &Surface) -> Self {
        Self::new(surface.width() as f32, surface.height() as f32)
    }

    /// Maps an on-screen point to backing pixel coordinates.
    pub fn to_backing(&self, point: Point, surface: &Surface) -> Point {
        let scale = |screen: f32, displayed: f32, backing: u32| {
            if displayed > 0.0 {
                screen * backing as f32 / displayed
            } else {
                screen
            }
        };

        Point::new(
            scale(point.x, self.width, surface.width()),
            scale(point.y, self.height, surface.height()),
        )
    }
}

/// Pen settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stroke {
    pub width: f32,
    pub color: [u8; 4],
}

impl Default for Stroke {
    fn default() -> Self {
        Self {
            width: DEFAULT_STROKE_WIDTH,
            color: [0, 0, 0, 255],
        }
    }
}

/// An RGBA8 raster, initially fully transparent.
#[derive(Clone, PartialEq, Eq)]
pub struct Surface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    /// Wraps raw RGBA8 pixels. Returns `None` if the buffer length does not
    /// match the dimensions.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        if pixels.len() != width as usize * height as usize * 4 {
            return None;
        }
        Some(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = self.offset(x, y);
        Some([
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ])
    }

    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    /// Draws a straight pen segment between two backing-space points.
    pub fn draw_segment(&mut self, from: Point, to: Point, stroke: &Stroke) {
        let half = stroke.width / 2.0;

        let x0 = (from.x.min(to.x) - half).floor().max(0.0);
        let x1 = (from.x.max(to.x) + half).ceil().min(self.width as f32 - 1.0);
        let y0 = (from.y.min(to.y) - half).floor().max(0.0);
        let y1 = (from.y.max(to.y) + half).ceil().min(self.height as f32 - 1.0);
        if x0 > x1 || y0 > y1 {
            return;
        }

        for y in y0 as u32..=y1 as u32 {
            for x in x0 as u32..=x1 as u32 {
                let center = Point::new(x as f32 + 0.5, y as f32 + 0.5);
                if distance_to_segment(center, from, to) <= half {
                    self.blend(x, y, stroke.color);
                }
            }
        }
    }

    /// Replaces all content with `image`, stretched to fill the surface.
    pub fn replace_with(&mut self, image: &RgbaImage) {
        if image.width() == self.width && image.height() == self.height {
            self.pixels.copy_from_slice(image.as_raw());
            return;
        }

        let scaled = imageops::resize(image, self.width, self.height, FilterType::Triangle);
        self.pixels.copy_from_slice(scaled.as_raw());
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    /// Source-over composite of one pixel.
    fn blend(&mut self, x: u32, y: u32, color: [u8; 4]) {
        let i = self.offset(x, y);
        let dst = &mut self.pixels[i..i + 4];

        if color[3] == 255 {
            dst.copy_from_slice(&color);
            return;
        }

        let src_a = color[3] as f32 / 255.0;
        let dst_a = dst[3] as f32 / 255.0;
        let out_a = src_a + dst_a * (1.0 - src_a);
        if out_a <= 0.0 {
            return;
        }

        for c in 0..3 {
            let src = color[c] as f32 * src_a;
            let below = dst[c] as f32 * dst_a * (1.0 - src_a);
            dst[c] = ((src + below) / out_a).round() as u8;
        }
        dst[3] = (out_a * 255.0).round() as u8;
    }
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

fn distance_to_segment(p: Point, a: Point, b: Point) -> f32 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len2 = dx * dx + dy * dy;
    let t = if len2 > 0.0 {
        (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let (cx, cy) = (a.x + t * dx, a.y + t * dy);
    ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt()
}
