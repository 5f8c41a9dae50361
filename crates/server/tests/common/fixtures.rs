//! Test fixtures: generated images and multipart batch bodies.

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::{Value, json};
use std::io::Cursor;

/// Encode a small image whose pixels depend on `seed`.
fn encode(seed: u8, format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_fn(16, 16, |x, y| {
        Rgb([
            seed,
            (x as u8).wrapping_mul(16).wrapping_add(seed),
            (y as u8).wrapping_mul(16),
        ])
    });
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, format)
        .expect("Failed to encode test image");
    buf.into_inner()
}

/// A JPEG that decodes; different seeds give different bytes.
#[allow(dead_code)]
pub fn test_jpeg(seed: u8) -> Vec<u8> {
    encode(seed, ImageFormat::Jpeg)
}

/// A PNG that decodes; different seeds give different bytes.
#[allow(dead_code)]
pub fn test_png(seed: u8) -> Vec<u8> {
    encode(seed, ImageFormat::Png)
}

/// Bytes that look like a JPEG header but do not decode.
#[allow(dead_code)]
pub fn corrupt_jpeg() -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0];
    data.extend_from_slice(b"this is not really image data");
    data
}

/// `file_info_<i>` for a project-level photo.
#[allow(dead_code)]
pub fn project_info() -> Value {
    json!({ "type": "project" })
}

/// `file_info_<i>` for a vehicle photo.
#[allow(dead_code)]
pub fn vehicle_info(vehicle: &str) -> Value {
    json!({ "type": "vehicle", "vehicle_id": vehicle })
}

/// `file_info_<i>` for a track photo.
#[allow(dead_code)]
pub fn track_info(vehicle: &str, track: &str) -> Value {
    json!({ "type": "track", "vehicle_id": vehicle, "track_id": track })
}

const BOUNDARY: &str = "----fieldsync-test-boundary-7MA4YWxkTrZu0gW";

/// Hand-built `multipart/form-data` body.
#[derive(Default)]
pub struct MultipartBody {
    body: Vec<u8>,
    files: usize,
}

#[allow(dead_code)]
impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Batch fields for upload type `site`, value `42`.
    pub fn batch(batch_number: u32, total_batches: u32, project: &str) -> Self {
        Self::new()
            .text("batch_number", &batch_number.to_string())
            .text("total_batches", &total_batches.to_string())
            .text("type", "site")
            .text("value", "42")
            .text("project", &json!({ "name": project }).to_string())
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn session(self, session_id: &str) -> Self {
        self.text("session_id", session_id)
    }

    /// Add a file part with optional metadata and unique id, numbered in order.
    pub fn file(
        mut self,
        file_name: &str,
        data: &[u8],
        info: Option<Value>,
        unique_id: Option<&str>,
    ) -> Self {
        let index = self.files;
        self.files += 1;
        if let Some(info) = info {
            self = self.text(&format!("file_info_{index}"), &info.to_string());
        }
        if let Some(id) = unique_id {
            self = self.text(&format!("file_unique_id_{index}"), id);
        }
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file_{index}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// Raw metadata string instead of JSON (for malformed metadata tests).
    pub fn raw_info(self, index: usize, raw: &str) -> Self {
        self.text(&format!("file_info_{index}"), raw)
    }

    /// Content type header and the finished body.
    pub fn finish(mut self) -> (String, Vec<u8>) {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        (
            format!("multipart/form-data; boundary={BOUNDARY}"),
            self.body,
        )
    }
}
