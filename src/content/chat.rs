//! Chat API Client
//! Mission: Thin typed client for the portfolio chat service

use anyhow::{bail, Context, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatResponse {
    pub response: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub used_web_search: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub connected: bool,
}

pub struct ChatClient {
    client: Client,
    base_url: String,
}

impl ChatClient {
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Ask the chat service a question about the portfolio.
    pub async fn send_message(&self, message: &str) -> Result<ChatResponse> {
        debug!("Forwarding chat message ({} chars)", message.len());

        let response = self
            .client
            .post(format!("{}/chat", self.base_url))
            .json(&ChatRequest { message })
            .send()
            .await
            .context("Chat service unreachable")?;

        if response.status() != StatusCode::OK {
            warn!("Chat service returned {}", response.status());
            bail!("Chat service returned {}", response.status());
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("Failed to parse chat response")?;

        info!(
            "Chat reply received ({} sources, web search: {})",
            parsed.sources.len(),
            parsed.used_web_search
        );
        Ok(parsed)
    }

    /// Liveness probe against the chat service.
    pub async fn health(&self) -> Result<HealthResponse> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .context("Chat service unreachable")?;

        if response.status() != StatusCode::OK {
            bail!("Chat service health check returned {}", response.status());
        }

        response
            .json()
            .await
            .context("Failed to parse health response")
    }

    /// Direct knowledge-base search, bypassing the conversational layer.
    pub async fn search(&self, query: &str) -> Result<serde_json::Value> {
        let response = self
            .client
            .get(format!("{}/search/{}", self.base_url, query))
            .send()
            .await
            .context("Chat service unreachable")?;

        if response.status() != StatusCode::OK {
            bail!("Chat search returned {}", response.status());
        }

        response
            .json()
            .await
            .context("Failed to parse search response")
    }

    /// Ask the chat service to rebuild its knowledge base.
    pub async fn retrain(&self) -> Result<serde_json::Value> {
        info!("Requesting chat knowledge-base retrain");

        let response = self
            .client
            .get(format!("{}/retrain", self.base_url))
            .send()
            .await
            .context("Chat service unreachable")?;

        if response.status() != StatusCode::OK {
            bail!("Chat retrain returned {}", response.status());
        }

        response
            .json()
            .await
            .context("Failed to parse retrain response")
    }
}
