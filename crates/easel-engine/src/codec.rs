use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use easel_contracts::{EaselError, Result};
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, RgbaImage};
use serde_json::Value;

use crate::http::HttpClient;

/// Response schema a provider answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    /// `data[0].b64_json` or `data[0].url`.
    OpenAiData,
    /// `artifacts[0].base64`.
    StabilityArtifacts,
    /// `images[0]` as base64.
    LocalImages,
    /// Asynchronous prediction record with `id`, `status` and `output`.
    Prediction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Image(Vec<u8>),
    Url(String),
    Pending { prediction_id: String },
}

pub fn decode_envelope(kind: EnvelopeKind, payload: &Value) -> Result<Decoded> {
    match kind {
        EnvelopeKind::OpenAiData => {
            let first = first_item(payload, "data")?;
            if let Some(encoded) = first.get("b64_json").and_then(Value::as_str) {
                return decode_base64(encoded).map(Decoded::Image);
            }
            first
                .get("url")
                .and_then(Value::as_str)
                .map(|url| Decoded::Url(url.to_string()))
                .ok_or_else(|| missing("data[0].b64_json or data[0].url"))
        }
        EnvelopeKind::StabilityArtifacts => {
            let first = first_item(payload, "artifacts")?;
            if first.get("finishReason").and_then(Value::as_str) == Some("CONTENT_FILTERED") {
                tracing::warn!("provider flagged the artifact as content filtered");
            }
            let encoded = first
                .get("base64")
                .and_then(Value::as_str)
                .ok_or_else(|| missing("artifacts[0].base64"))?;
            decode_base64(encoded).map(Decoded::Image)
        }
        EnvelopeKind::LocalImages => {
            let encoded = first_item(payload, "images")?
                .as_str()
                .ok_or_else(|| missing("images[0]"))?;
            decode_base64(encoded).map(Decoded::Image)
        }
        EnvelopeKind::Prediction => {
            let status = payload.get("status").and_then(Value::as_str);
            if status == Some("succeeded") {
                let output = payload.get("output");
                let url = output
                    .and_then(Value::as_array)
                    .and_then(|rows| rows.first())
                    .or(output)
                    .and_then(Value::as_str);
                if let Some(url) = url {
                    return Ok(Decoded::Url(url.to_string()));
                }
            }
            payload
                .get("id")
                .and_then(Value::as_str)
                .filter(|id| !id.trim().is_empty())
                .map(|id| Decoded::Pending {
                    prediction_id: id.to_string(),
                })
                .ok_or_else(|| missing("id"))
        }
    }
}

fn first_item<'a>(payload: &'a Value, key: &str) -> Result<&'a Value> {
    payload
        .get(key)
        .and_then(Value::as_array)
        .and_then(|rows| rows.first())
        .ok_or_else(|| missing(&format!("{key}[0]")))
}

fn missing(field: &str) -> EaselError {
    EaselError::Decode(format!("response has no {field}"))
}

pub fn decode_base64(encoded: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(encoded.trim())
        .map_err(|err| EaselError::Decode(format!("invalid base64 image: {err}")))
}

pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

pub fn png_data_uri(bytes: &[u8]) -> String {
    format!("data:image/png;base64,{}", encode_base64(bytes))
}

pub fn encode_png(image: RgbaImage) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image)
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|err| EaselError::Image(format!("png encoding failed: {err}")))?;
    Ok(out.into_inner())
}

pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes)
        .map_err(|err| EaselError::Image(format!("unreadable source image: {err}")))
}

/// Fits the image inside an `edge`x`edge` transparent canvas, centered, with
/// its aspect ratio kept, and returns it as an RGBA PNG. Larger sources are
/// shrunk; smaller ones keep their size and are padded.
pub fn normalize_to_square_rgba(bytes: &[u8], edge: u32) -> Result<Vec<u8>> {
    if edge == 0 {
        return Err(EaselError::Image("target edge must be positive".to_string()));
    }
    let rgba = decode_image(bytes)?.to_rgba8();
    let (width, height) = rgba.dimensions();
    if width == edge && height == edge {
        return encode_png(rgba);
    }

    let scale = (edge as f64 / width.max(height) as f64).min(1.0);
    let scaled_width = ((width as f64 * scale).round() as u32).clamp(1, edge);
    let scaled_height = ((height as f64 * scale).round() as u32).clamp(1, edge);
    let resized = imageops::resize(&rgba, scaled_width, scaled_height, FilterType::Lanczos3);

    let mut canvas = RgbaImage::new(edge, edge);
    let x = (edge - scaled_width) / 2;
    let y = (edge - scaled_height) / 2;
    imageops::overlay(&mut canvas, &resized, i64::from(x), i64::from(y));
    encode_png(canvas)
}

/// Reads image bytes from a data URI, a `file://` URI, a filesystem path or
/// an http(s) URL.
pub fn load_image_source(locator: &str, http: &HttpClient) -> Result<Vec<u8>> {
    let locator = locator.trim();
    if locator.is_empty() {
        return Err(EaselError::Validation(
            "Could not load image data: empty image reference.".to_string(),
        ));
    }
    if let Some(rest) = locator.strip_prefix("data:") {
        let (header, encoded) = rest
            .split_once(',')
            .ok_or_else(|| EaselError::Decode("malformed data URI".to_string()))?;
        if !header.ends_with(";base64") {
            return Err(EaselError::Decode(
                "only base64 data URIs are supported".to_string(),
            ));
        }
        return decode_base64(encoded);
    }
    if locator.starts_with("http://") || locator.starts_with("https://") {
        return http.download(locator);
    }
    let path = locator
        .strip_prefix("file://")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(locator));
    read_file(&path)
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|err| {
        EaselError::Io(std::io::Error::new(
            err.kind(),
            format!("{}: {err}", path.display()),
        ))
    })
}
