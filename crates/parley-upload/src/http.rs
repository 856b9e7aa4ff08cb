//! HTTP object store backed by the generic upload/delete endpoints.

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use parley_core::error::{ParleyError, Result};

use crate::{LocalFile, ObjectStore, StoredObject, UploadKind};

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    files: Vec<StoredObject>,
}

/// Object store talking to `POST /api/upload` and `DELETE /api/delete`.
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: Client,
    base_url: String,
}

impl HttpObjectStore {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { client, base_url }
    }
}

impl ObjectStore for HttpObjectStore {
    async fn upload(&self, kind: UploadKind, files: Vec<LocalFile>) -> Result<Vec<StoredObject>> {
        let mut form = Form::new();
        for file in files {
            let part = Part::bytes(file.bytes).file_name(file.name);
            form = form.part(kind.field_name(), part);
        }

        let response = self
            .client
            .post(format!("{}/api/upload", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ParleyError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ParleyError::Remote(format!(
                "upload failed with status {}",
                response.status()
            )));
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| ParleyError::Serialization(e.to_string()))?;
        debug!(accepted = body.files.len(), kind = %kind, "Upload accepted");
        Ok(body.files)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/api/delete", self.base_url))
            .query(&[("path", path)])
            .send()
            .await
            .map_err(|e| ParleyError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ParleyError::Remote(format!(
                "delete of {} failed with status {}",
                path,
                response.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let store = HttpObjectStore::new(Client::new(), "http://localhost:8000/");
        assert_eq!(store.base_url, "http://localhost:8000");
    }

    #[test]
    fn test_upload_response_parses_server_shape() {
        let body = r#"{"files":[{"name":"a.png","path":"images/u1.png","url":"http://h/static/upload/images/u1.png","size":123}]}"#;
        let parsed: UploadResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.files.len(), 1);
        assert_eq!(parsed.files[0].name, "a.png");
        assert_eq!(parsed.files[0].path, "images/u1.png");
    }
}
