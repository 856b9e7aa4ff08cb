//! HTTP history API backed by the chat-history endpoints.

use reqwest::Client;
use serde::Deserialize;

use parley_core::error::{ParleyError, Result};

use crate::{ConversationSummary, HistoryApi, MetadataPatch};

/// History client for `/api/chat/history`.
#[derive(Debug, Clone)]
pub struct HttpHistoryApi {
    client: Client,
    base_url: String,
}

impl HttpHistoryApi {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { client, base_url }
    }
}

impl HistoryApi for HttpHistoryApi {
    async fn list(&self) -> Result<Vec<ConversationSummary>> {
        let response = self
            .client
            .get(format!("{}/api/chat/history", self.base_url))
            .send()
            .await
            .map_err(|e| ParleyError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ParleyError::Remote(format!(
                "history list failed with status {}",
                response.status()
            )));
        }
        let rows: Vec<ConversationSummary> = response
            .json()
            .await
            .map_err(|e| ParleyError::Serialization(e.to_string()))?;
        Ok(rows)
    }

    async fn patch(&self, conversation_id: &str, updates: &MetadataPatch) -> Result<()> {
        let response = self
            .client
            .patch(format!(
                "{}/api/chat/history/{}",
                self.base_url, conversation_id
            ))
            .json(updates)
            .send()
            .await
            .map_err(|e| ParleyError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ParleyError::Remote(format!(
                "history patch failed with status {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn delete(&self, conversation_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!(
                "{}/api/chat/history/{}",
                self.base_url, conversation_id
            ))
            .send()
            .await
            .map_err(|e| ParleyError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ParleyError::Remote(format!(
                "history delete failed with status {}",
                response.status()
            )));
        }
        // The body carries a success flag; a 2xx without one is still fine.
        #[derive(Debug, Deserialize)]
        struct DeleteResponse {
            #[serde(default)]
            success: Option<bool>,
        }
        if let Ok(body) = response.json::<DeleteResponse>().await {
            if body.success == Some(false) {
                return Err(ParleyError::Remote(
                    "backend reported the deletion did not happen".to_string(),
                ));
            }
        }
        Ok(())
    }
}
