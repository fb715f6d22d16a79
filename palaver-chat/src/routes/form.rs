//! Request body helpers that keep extractor failures inside the error envelope.

use std::collections::HashMap;

use axum::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use axum::extract::rejection::{FormRejection, JsonRejection};
use axum::http::StatusCode;
use axum::{Form, Json};

use palaver_shared::errors::{AppError, AppResult, ErrorCode};

use crate::services::Upload;

/// Text fields and file parts of a multipart form.
#[derive(Debug, Default)]
pub struct FormData {
    fields: HashMap<String, Vec<String>>,
    files: HashMap<String, Upload>,
}

impl FormData {
    pub fn text(&self, name: &str) -> Option<String> {
        self.fields.get(name).and_then(|v| v.first()).cloned()
    }

    pub fn text_or_default(&self, name: &str) -> String {
        self.text(name).unwrap_or_default()
    }

    /// Every value under `name` or `name[]`.
    pub fn list(&self, name: &str) -> Vec<String> {
        let bracketed = format!("{name}[]");
        [name, bracketed.as_str()]
            .iter()
            .filter_map(|key| self.fields.get(*key))
            .flatten()
            .cloned()
            .collect()
    }

    /// A file part, if one was sent with a non-empty file name.
    pub fn take_file(&mut self, name: &str) -> Option<Upload> {
        self.files.remove(name)
    }
}

pub async fn read_multipart(multipart: Result<Multipart, MultipartRejection>) -> AppResult<FormData> {
    let mut multipart = multipart
        .map_err(|e| AppError::new(ErrorCode::ValidationError, format!("expected a multipart form: {e}")))?;
    let mut form = FormData::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("multipart error", e))?
    {
        let name = field.name().unwrap_or("").to_string();
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error("failed to read file", e))?;
                if !file_name.is_empty() {
                    form.files.insert(name, Upload { file_name, bytes: data.to_vec() });
                }
            }
            None => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| multipart_error("failed to read field", e))?;
                form.fields.entry(name).or_default().push(value);
            }
        }
    }

    Ok(form)
}

fn multipart_error(context: &str, e: MultipartError) -> AppError {
    let code = if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ErrorCode::PayloadTooLarge
    } else {
        ErrorCode::ValidationError
    };
    AppError::new(code, format!("{context}: {e}"))
}

pub fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    body.map(|Json(value)| value)
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.body_text()))
}

pub fn form_body<T>(body: Result<Form<T>, FormRejection>) -> AppResult<T> {
    body.map(|Form(value)| value)
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.body_text()))
}
