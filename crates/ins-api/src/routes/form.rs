//! Request bodies that arrive either as JSON or as multipart forms

use crate::error::ApiError;
use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A file part of a multipart form.
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Bytes,
}

/// Named fields plus any uploaded files. JSON bodies carry no files.
#[derive(Default)]
pub struct FormData {
    fields: Map<String, Value>,
    files: HashMap<String, UploadedFile>,
}

impl FormData {
    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        self.files.remove(name)
    }

    /// Drop null and blank fields so they read as absent.
    pub fn without_blank(mut self) -> Self {
        self.fields.retain(|_, value| match value {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            _ => true,
        });
        self
    }

    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        Ok(serde_json::from_value(Value::Object(self.fields.clone()))?)
    }
}

#[async_trait]
impl<S> FromRequest<S> for FormData
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("multipart/form-data"))
            .unwrap_or(false);

        if !is_multipart {
            let bytes = Bytes::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            if bytes.is_empty() {
                return Ok(FormData::default());
            }
            return Ok(FormData {
                fields: serde_json::from_slice(&bytes)?,
                files: HashMap::new(),
            });
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;

        let mut form = FormData::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let bytes = field.bytes().await?;
                    if !bytes.is_empty() {
                        form.files.insert(name, UploadedFile { file_name, bytes });
                    }
                }
                None => {
                    let text = field.text().await?;
                    form.fields.insert(name, Value::String(text));
                }
            }
        }
        Ok(form)
    }
}
