//! Multipart form collection for the image endpoints

use axum::extract::Multipart;
use std::collections::HashMap;
use std::str::FromStr;

use crate::error::{AppError, Result};

/// An uploaded file part
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// All parts of a multipart request, split into files and text fields
#[derive(Debug, Default)]
pub struct FormData {
    files: HashMap<String, UploadedFile>,
    fields: HashMap<String, String>,
}

impl FormData {
    /// Drain a multipart body. A part with a file name is treated as a file.
    pub async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            if field.file_name().is_some() {
                let filename = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await?.to_vec();
                form.files.insert(
                    name,
                    UploadedFile {
                        filename,
                        content_type,
                        data,
                    },
                );
            } else {
                form.fields.insert(name, field.text().await?);
            }
        }

        Ok(form)
    }

    /// Remove and return a required file part
    pub fn take_file(&mut self, name: &str) -> Result<UploadedFile> {
        let file = self
            .files
            .remove(name)
            .ok_or_else(|| AppError::InvalidRequest(format!("Missing file field '{}'", name)))?;
        if file.data.is_empty() {
            return Err(AppError::InvalidRequest(format!("File field '{}' is empty", name)));
        }
        if let Some(content_type) = file.content_type.as_deref() {
            if !content_type.starts_with("image/") && content_type != "application/octet-stream" {
                return Err(AppError::InvalidRequest("File must be an image".to_string()));
            }
        }
        Ok(file)
    }

    /// Trimmed text value; blank values count as absent
    pub fn text(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    pub fn require_text(&self, name: &str) -> Result<String> {
        self.text(name)
            .ok_or_else(|| AppError::InvalidRequest(format!("Missing form field '{}'", name)))
    }

    /// Parse an optional field, rejecting malformed values
    pub fn parse<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.text(name)
            .map(|raw| {
                raw.parse::<T>().map_err(|e| {
                    AppError::InvalidRequest(format!("Invalid value for '{}': {}", name, e))
                })
            })
            .transpose()
    }

    /// Boolean switch; absent means off
    pub fn flag(&self, name: &str) -> Result<bool> {
        match self.text(name).map(|v| v.to_lowercase()).as_deref() {
            None | Some("false" | "0" | "off" | "no") => Ok(false),
            Some("true" | "1" | "on" | "yes") => Ok(true),
            Some(other) => Err(AppError::InvalidRequest(format!(
                "Invalid value for '{}': expected true or false, got '{}'",
                name, other
            ))),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_field(mut self, name: &str, value: &str) -> Self {
        self.fields.insert(name.to_string(), value.to_string());
        self
    }
}
