//! Image codec seam.
//!
//! The core never decodes pixels. It hands raw uploads to
//! [`ImageCodec::compress`] and old photos to [`ImageCodec::recompress`],
//! and stores whatever encoded string comes back.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("failed to encode image: {0}")]
    Encode(String),

    #[error("invalid encoded payload: {0}")]
    InvalidPayload(String),
}

/// Size and quality bounds for one compression pass.
///
/// Quality is stepped down from `initial_quality` while the output is over
/// `max_size_kb` and quality is still above `min_quality`. The size cap is
/// soft: the floor wins.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CompressionProfile {
    pub max_width: u32,
    pub max_height: u32,
    pub initial_quality: f32,
    pub max_size_kb: u32,
    #[serde(default = "default_min_quality")]
    pub min_quality: f32,
}

fn default_min_quality() -> f32 {
    0.3
}

impl CompressionProfile {
    /// Bounds for freshly captured photos.
    pub fn capture() -> Self {
        Self {
            max_width: 800,
            max_height: 800,
            initial_quality: 0.7,
            max_size_kb: 150,
            min_quality: default_min_quality(),
        }
    }

    /// Tighter bounds used when archiving photos of long-closed cases.
    pub fn archive() -> Self {
        Self {
            max_width: 480,
            max_height: 480,
            initial_quality: 0.5,
            max_size_kb: 40,
            min_quality: default_min_quality(),
        }
    }
}

pub trait ImageCodec: Send + Sync {
    /// Encode a raw upload (any supported file format) within `profile`.
    fn compress(&self, raw: &[u8], profile: &CompressionProfile) -> Result<String, CodecError>;

    /// Re-encode an already encoded payload within `profile`.
    fn recompress(
        &self,
        encoded: &str,
        profile: &CompressionProfile,
    ) -> Result<String, CodecError>;
}

/// Approximate decoded size in KB of a base64 payload (data URI or bare).
///
/// Pure length arithmetic; the payload is not decoded.
pub fn estimate_size_kb(encoded: &str) -> u64 {
    let body = match encoded.find(',') {
        Some(comma) => &encoded[comma + 1..],
        None => encoded,
    };
    let bytes = (body.len() as f64) * 3.0 / 4.0;
    (bytes / 1024.0).round() as u64
}
