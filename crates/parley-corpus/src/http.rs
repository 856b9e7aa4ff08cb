//! HTTP corpus API backed by the backend's rag endpoints.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use parley_core::error::{ParleyError, Result};

use crate::api::{BuildOutcome, Corpus, CorpusApi};

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    rags: Vec<Corpus>,
}

#[derive(Debug, Deserialize)]
struct BuildResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    skipped: bool,
}

#[derive(Debug, Serialize)]
struct BuildRequest<'a> {
    files: &'a [String],
    rag_name: &'a str,
}

/// Corpus API client for `/api/rags` and its mutation endpoints.
#[derive(Debug, Clone)]
pub struct HttpCorpusApi {
    client: Client,
    base_url: String,
}

impl HttpCorpusApi {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { client, base_url }
    }

    async fn post_json(&self, path: &str, body: serde_json::Value, what: &str) -> Result<()> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(&body)
            .send()
            .await
            .map_err(|e| ParleyError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ParleyError::Remote(format!(
                "{} failed with status {}",
                what,
                response.status()
            )));
        }
        Ok(())
    }
}

impl CorpusApi for HttpCorpusApi {
    async fn list(&self) -> Result<Vec<Corpus>> {
        let response = self
            .client
            .get(format!("{}/api/rags", self.base_url))
            .send()
            .await
            .map_err(|e| ParleyError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ParleyError::Remote(format!(
                "corpus list failed with status {}",
                response.status()
            )));
        }
        let body: ListResponse = response
            .json()
            .await
            .map_err(|e| ParleyError::Serialization(e.to_string()))?;
        Ok(body.rags)
    }

    async fn build(&self, name: &str, files: &[String]) -> Result<BuildOutcome> {
        let response = self
            .client
            .post(format!("{}/api/rags/build", self.base_url))
            .json(&BuildRequest {
                files,
                rag_name: name,
            })
            .send()
            .await
            .map_err(|e| ParleyError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ParleyError::Remote(format!(
                "corpus build failed with status {}",
                response.status()
            )));
        }
        let body: BuildResponse = response
            .json()
            .await
            .map_err(|e| ParleyError::Serialization(e.to_string()))?;
        debug!(name, success = body.success, skipped = body.skipped, "Corpus build reply");
        if !body.success {
            return Err(ParleyError::Remote(format!(
                "backend rejected build of corpus \"{}\"",
                name
            )));
        }
        Ok(BuildOutcome {
            success: body.success,
            skipped: body.skipped,
        })
    }

    async fn rename(&self, old_name: &str, new_name: &str) -> Result<()> {
        self.post_json(
            "/api/rags/rename",
            json!({ "old_name": old_name, "new_name": new_name }),
            "corpus rename",
        )
        .await
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.post_json(
            "/api/rags/delete",
            json!({ "rag_name": name }),
            "corpus delete",
        )
        .await
    }
}
