//! Frame encoding and decoding.
//!
//! Frames on the wire are PNG images of the whole surface. PNG is lossless,
//! so a frame decoded onto a surface of the same size reproduces every
//! pixel exactly.

use image::RgbaImage;
use thiserror::Error;

use super::surface::Surface;
use crate::sync::Frame;

/// Errors converting between surfaces and frames.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("PNG encoding failed: {0}")]
    Encode(#[from] png::EncodingError),

    #[error("Malformed frame: {0}")]
    Decode(#[from] image::ImageError),
}

/// Encodes the full surface as a PNG frame.
pub fn encode(surface: &Surface) -> Result<Frame, CodecError> {
    let mut png_data = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut png_data, surface.width(), surface.height());
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);

        let mut writer = encoder.write_header()?;
        writer.write_image_data(surface.pixels())?;
        writer.finish()?;
    }

    Ok(Frame::from(png_data))
}

/// Decodes a frame into an RGBA image of whatever size it carries.
///
/// Any image format the `image` crate was built with is accepted; the caller
/// rescales on draw.
pub fn decode(frame: &Frame) -> Result<RgbaImage, CodecError> {
    let decoded = image::load_from_memory(frame.as_bytes())?;
    Ok(decoded.to_rgba8())
}
