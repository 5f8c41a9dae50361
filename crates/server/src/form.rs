//! Multipart decoding of a batch request.

use crate::error::{ApiError, ApiResult};
use axum::extract::Multipart;
use bytes::{Bytes, BytesMut};
use fieldsync_core::{BatchHeader, ContentHash, ProjectDescription};
use std::collections::HashMap;
use tracing::debug;

/// A file part, read fully into memory and hashed while streaming.
#[derive(Clone, Debug)]
pub struct UploadedPart {
    /// Position among the file parts, `0..`.
    pub index: usize,
    /// File name as sent by the client.
    pub file_name: String,
    pub data: Bytes,
    pub digest: ContentHash,
}

/// A decoded batch request: scalar fields plus file parts in request order.
#[derive(Debug, Default)]
pub struct BatchForm {
    fields: HashMap<String, String>,
    pub parts: Vec<UploadedPart>,
}

impl BatchForm {
    /// Read every part of the request.
    ///
    /// Any part carrying a filename is a file; everything else is a text
    /// field. More than `max_files` file parts rejects the whole request.
    pub async fn read(multipart: &mut Multipart, max_files: usize) -> ApiResult<Self> {
        let mut form = Self::default();

        while let Some(mut field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();

            let Some(file_name) = field.file_name().map(str::to_string) else {
                let value = field.text().await?;
                form.fields.insert(name, value);
                continue;
            };

            if form.parts.len() >= max_files {
                return Err(ApiError::BadRequest(format!(
                    "too many files in batch (max {max_files})"
                )));
            }

            let mut hasher = ContentHash::hasher();
            let mut data = BytesMut::new();
            while let Some(chunk) = field.chunk().await? {
                hasher.update(&chunk);
                data.extend_from_slice(&chunk);
            }
            let part = UploadedPart {
                index: form.parts.len(),
                file_name,
                data: data.freeze(),
                digest: hasher.finalize(),
            };
            debug!(
                index = part.index,
                file = %part.file_name,
                size = part.data.len(),
                "received file part"
            );
            form.parts.push(part);
        }

        Ok(form)
    }

    /// Build a form from already decoded parts.
    pub fn from_parts(fields: HashMap<String, String>, parts: Vec<UploadedPart>) -> Self {
        Self { fields, parts }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Scalar batch fields.
    pub fn header(&self) -> ApiResult<BatchHeader> {
        Ok(BatchHeader::from_fields(|name| self.field(name))?)
    }

    /// Project description from `project`, falling back to `project_name`.
    pub fn project(&self) -> ApiResult<ProjectDescription> {
        if let Some(raw) = self.field("project").filter(|v| !v.trim().is_empty()) {
            return Ok(ProjectDescription::from_json(raw)?);
        }
        match self.field("project_name").filter(|v| !v.trim().is_empty()) {
            Some(name) => Ok(ProjectDescription::named(name)?),
            None => Err(ApiError::BadRequest(
                "missing field: project or project_name".to_string(),
            )),
        }
    }

    /// Raw `file_info_<index>` metadata.
    pub fn file_info(&self, index: usize) -> Option<&str> {
        self.field(&format!("file_info_{index}"))
    }

    /// Client-supplied `file_unique_id_<index>`, if non-blank.
    pub fn unique_id(&self, index: usize) -> Option<&str> {
        self.field(&format!("file_unique_id_{index}"))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}
