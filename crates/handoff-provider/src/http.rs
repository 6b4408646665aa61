use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::{Answer, AnswerEngine, AnswerRequest};

/// Answer engine reached over HTTP: `POST {base}/generate`.
#[derive(Debug, Clone)]
pub struct HttpAnswerEngine {
    client: reqwest::Client,
    api_key: Option<String>,
    api_base: String,
}

impl HttpAnswerEngine {
    pub fn new(api_base: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl AnswerEngine for HttpAnswerEngine {
    async fn generate(&self, request: AnswerRequest) -> Result<Answer> {
        let url = format!("{}/generate", self.api_base);
        let mut req = self.client.post(url).json(&request);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if status != StatusCode::OK {
            let text = resp.text().await?;
            let parsed = serde_json::from_str::<ApiError>(&text).ok();
            return Err(format_api_error(status, parsed));
        }

        let answer: Answer = resp.json().await?;
        answer.validated()
    }

    async fn health(&self) -> Result<()> {
        let resp = self
            .client
            .get(format!("{}/health", self.api_base))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(anyhow!("answer engine unhealthy ({})", resp.status()));
        }
        Ok(())
    }
}

fn format_api_error(status: StatusCode, parsed: Option<ApiError>) -> anyhow::Error {
    match parsed {
        Some(api_error) => anyhow!("answer engine error ({status}): {}", api_error.error),
        None => anyhow!("answer engine error ({status})"),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiError {
    pub error: String,
}
