//! Base64 image intake.
//!
//! Turns the `image_data` field into validated raster bytes the vision model
//! accepts. The image is fully decoded, not just sniffed, so truncated or
//! corrupt uploads are rejected here rather than by the provider.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use thiserror::Error;

/// Standard alphabet, padding optional.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("image data is not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("image data is empty")]
    Empty,

    #[error("unrecognised image format: {0}")]
    UnsupportedFormat(String),

    #[error("image could not be decoded: {0}")]
    Corrupt(String),
}

/// A validated image, ready to attach to a provider request.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    /// Bytes in `mime_type` encoding.
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
}

impl DecodedImage {
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }
}

/// Decode `image_data` into a validated image.
///
/// Accepts an optional `data:<mime>;base64,` prefix and ignores ASCII
/// whitespace. PNG, JPEG and WebP are forwarded as received; other raster
/// formats are re-encoded as PNG.
pub fn decode_image(image_data: &str) -> Result<DecodedImage, ImageError> {
    let payload = strip_data_url(image_data.trim());
    let compact: String = payload
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    let bytes = LENIENT_BASE64.decode(compact.as_bytes())?;
    if bytes.is_empty() {
        return Err(ImageError::Empty);
    }

    let format =
        image::guess_format(&bytes).map_err(|e| ImageError::UnsupportedFormat(e.to_string()))?;
    let decoded = image::load_from_memory_with_format(&bytes, format)
        .map_err(|e| ImageError::Corrupt(e.to_string()))?;

    let (width, height) = (decoded.width(), decoded.height());

    match format {
        ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::WebP => Ok(DecodedImage {
            bytes,
            mime_type: format.to_mime_type(),
            width,
            height,
        }),
        _ => Ok(DecodedImage {
            bytes: encode_png(&decoded)?,
            mime_type: ImageFormat::Png.to_mime_type(),
            width,
            height,
        }),
    }
}

fn strip_data_url(input: &str) -> &str {
    if !input.starts_with("data:") {
        return input;
    }
    match input.find(";base64,") {
        Some(idx) => &input[idx + ";base64,".len()..],
        None => input,
    }
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, ImageError> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| ImageError::Corrupt(e.to_string()))?;
    Ok(buffer.into_inner())
}
