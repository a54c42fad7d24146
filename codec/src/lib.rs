//! JPEG codec producing `data:image/jpeg;base64,…` payloads.
//!
//! Input is anything the `image` crate can decode with the enabled formats
//! (JPEG, PNG), raw or wrapped in a base64 data URL. Output is always a
//! baseline JPEG: downscaled to fit the profile's bounds (never upscaled),
//! transparency flattened onto white, quality stepped down until the
//! estimated size fits or the quality floor is reached.

#![deny(clippy::print_stdout, clippy::print_stderr)]

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use servicedesk_core::codec::{CodecError, CompressionProfile, ImageCodec, estimate_size_kb};

pub const DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// Quality decrement between encode attempts.
const QUALITY_STEP: f32 = 0.1;

#[derive(Debug, Clone, Copy, Default)]
pub struct JpegDataUrlCodec;

impl JpegDataUrlCodec {
    pub fn new() -> Self {
        Self
    }

    fn encode_within(
        &self,
        image: DynamicImage,
        profile: &CompressionProfile,
    ) -> Result<String, CodecError> {
        let image = fit_within(image, profile.max_width, profile.max_height);
        let rgb = flatten_onto_white(&image);

        let mut quality = profile.initial_quality;
        loop {
            let data_url = to_data_url(&encode_jpeg(&rgb, quality)?);
            let size_kb = estimate_size_kb(&data_url);
            if size_kb <= u64::from(profile.max_size_kb) || quality <= profile.min_quality + 1e-3 {
                tracing::debug!(
                    width = rgb.width(),
                    height = rgb.height(),
                    quality,
                    size_kb,
                    "photo encoded"
                );
                return Ok(data_url);
            }
            quality = (quality - QUALITY_STEP).max(profile.min_quality);
        }
    }
}

impl ImageCodec for JpegDataUrlCodec {
    fn compress(&self, raw: &[u8], profile: &CompressionProfile) -> Result<String, CodecError> {
        let image = image::load_from_memory(raw).map_err(|e| CodecError::Decode(e.to_string()))?;
        self.encode_within(image, profile)
    }

    fn recompress(
        &self,
        encoded: &str,
        profile: &CompressionProfile,
    ) -> Result<String, CodecError> {
        let raw = decode_data_url(encoded)?;
        self.compress(&raw, profile)
    }
}

/// Downscale preserving aspect ratio so both sides fit. Never upscales.
fn fit_within(image: DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    if width <= max_width && height <= max_height {
        return image;
    }
    image.resize(max_width, max_height, FilterType::Triangle)
}

fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let blend = |c: u8| -> u8 {
            let alpha = u32::from(a);
            ((u32::from(c) * alpha + 255 * (255 - alpha)) / 255) as u8
        };
        Rgb([blend(r), blend(g), blend(b)])
    })
}

fn encode_jpeg(rgb: &RgbImage, quality: f32) -> Result<Vec<u8>, CodecError> {
    let quality = (quality * 100.0).round().clamp(1.0, 100.0) as u8;
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(rgb)
        .map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(out)
}

fn to_data_url(jpeg: &[u8]) -> String {
    format!("{DATA_URL_PREFIX}{}", STANDARD.encode(jpeg))
}

/// Bytes of a base64 data URL. Bare base64 is accepted too.
pub fn decode_data_url(encoded: &str) -> Result<Vec<u8>, CodecError> {
    let body = match encoded.split_once(',') {
        Some((header, body)) => {
            if !header.starts_with("data:") || !header.ends_with(";base64") {
                return Err(CodecError::InvalidPayload(format!(
                    "unsupported data URL header: {header}"
                )));
            }
            body
        }
        None => encoded,
    };
    STANDARD
        .decode(body.trim())
        .map_err(|e| CodecError::InvalidPayload(e.to_string()))
}
