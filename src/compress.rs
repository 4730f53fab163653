use std::io::Cursor;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::{DynamicImage, ImageEncoder as _, RgbaImage, imageops};

use crate::{
    error::{GiftboxError, GiftboxResult},
    surface::Surface,
};

/// Target encoding for a committed crop. Portraits go to JPEG, the gift
/// item keeps its transparency and goes to PNG.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum EncodeKind {
    Png,
    Jpeg,
}

impl EncodeKind {
    pub fn mime(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }

    /// Whether the encoder exposes a quality knob.
    pub fn lossy(self) -> bool {
        matches!(self, Self::Jpeg)
    }
}

/// Immutable encoded byte buffer plus its MIME tag. Always whole-buffer,
/// never streamed.
#[derive(Clone, Debug)]
pub struct EncodedBlob {
    pub kind: EncodeKind,
    pub bytes: Vec<u8>,
}

impl EncodedBlob {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Text-safe form for the session record.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.kind.mime(), BASE64.encode(&self.bytes))
    }
}

/// Decodes a `data:<mime>;base64,<payload>` URL back into raw bytes.
pub fn decode_data_url(url: &str) -> GiftboxResult<Vec<u8>> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| GiftboxError::serde("not a data url"))?;
    let (_, payload) = rest
        .split_once(";base64,")
        .ok_or_else(|| GiftboxError::serde("data url is not base64-encoded"))?;
    BASE64
        .decode(payload)
        .map_err(|e| GiftboxError::serde(format!("invalid base64 payload: {e}")))
}

/// Initial quality for lossy kinds, in percent.
const INITIAL_LOSSY_QUALITY: u8 = 90;
/// Quality decrements stop once this floor is reached; below it the loop
/// shrinks resolution instead.
const QUALITY_FLOOR: u8 = 50;
const QUALITY_STEP: u8 = 10;
/// Per-axis shrink applied on each resolution step.
const SHRINK_FACTOR: f64 = 0.9;
/// The loop gives up and accepts the current result once the cumulative
/// resolution scale drops below this bound.
const MIN_CUMULATIVE_SCALE: f64 = 0.4;

/// Encodes `surface` at or under `max_bytes`, degrading quality first and
/// resolution second. Never fails for being over budget: once the cumulative
/// scale factor passes below 0.4 the current result is returned as-is.
/// Errors only when the underlying encoder cannot produce output at all.
#[tracing::instrument(skip(surface), fields(width = surface.width, height = surface.height))]
pub fn compress(surface: &Surface, kind: EncodeKind, max_bytes: usize) -> GiftboxResult<EncodedBlob> {
    let mut working = surface.to_rgba_image()?;
    let mut quality = if kind.lossy() { INITIAL_LOSSY_QUALITY } else { 100 };
    let mut scale = 1.0f64;

    let mut bytes = encode_rgba(&working, kind, quality)?;
    while bytes.len() > max_bytes {
        if kind.lossy() && quality > QUALITY_FLOOR {
            quality -= QUALITY_STEP;
            bytes = encode_rgba(&working, kind, quality)?;
            continue;
        }
        scale *= SHRINK_FACTOR;
        working = shrink(&working, SHRINK_FACTOR);
        bytes = encode_rgba(&working, kind, quality)?;
        if scale < MIN_CUMULATIVE_SCALE {
            tracing::debug!(
                size = bytes.len(),
                max_bytes,
                "accepting over-budget result at minimum scale"
            );
            break;
        }
    }

    tracing::debug!(size = bytes.len(), quality, scale, "compressed");
    Ok(EncodedBlob { kind, bytes })
}

fn shrink(img: &RgbaImage, factor: f64) -> RgbaImage {
    let width = ((f64::from(img.width()) * factor).round() as u32).max(1);
    let height = ((f64::from(img.height()) * factor).round() as u32).max(1);
    imageops::resize(img, width, height, imageops::FilterType::Triangle)
}

fn encode_rgba(img: &RgbaImage, kind: EncodeKind, quality: u8) -> GiftboxResult<Vec<u8>> {
    let mut buf = Vec::new();
    match kind {
        EncodeKind::Png => {
            image::codecs::png::PngEncoder::new(Cursor::new(&mut buf))
                .write_image(
                    img.as_raw(),
                    img.width(),
                    img.height(),
                    image::ExtendedColorType::Rgba8,
                )
                .map_err(|e| GiftboxError::encode(format!("png encode failed: {e}")))?;
        }
        EncodeKind::Jpeg => {
            // JPEG carries no alpha channel; flatten to RGB first.
            let rgb = DynamicImage::ImageRgba8(img.clone()).into_rgb8();
            image::codecs::jpeg::JpegEncoder::new_with_quality(Cursor::new(&mut buf), quality)
                .write_image(
                    rgb.as_raw(),
                    rgb.width(),
                    rgb.height(),
                    image::ExtendedColorType::Rgb8,
                )
                .map_err(|e| GiftboxError::encode(format!("jpeg encode failed: {e}")))?;
        }
    }
    Ok(buf)
}
