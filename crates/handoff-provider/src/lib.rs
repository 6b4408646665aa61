pub mod http;
pub mod stub;

use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use http::HttpAnswerEngine;
pub use stub::StubAnswerEngine;

/// The answer-generation collaborator: produces a draft reply with a
/// confidence score and the passages it was grounded on.
#[async_trait]
pub trait AnswerEngine: Send + Sync {
    async fn generate(&self, request: AnswerRequest) -> Result<Answer>;

    async fn health(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================
// Request / Response
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryTurn {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerRequest {
    pub tenant: String,
    pub message: String,
    #[serde(default)]
    pub history: Vec<HistoryTurn>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Passage {
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    pub answer: String,
    pub confidence: f64,
    #[serde(default)]
    pub passages: Vec<Passage>,
}

impl Answer {
    /// Reject non-finite confidence and clamp the rest into `[0, 1]`.
    pub fn validated(mut self) -> Result<Self> {
        if !self.confidence.is_finite() {
            bail!("answer engine returned non-finite confidence: {}", self.confidence);
        }
        self.confidence = self.confidence.clamp(0.0, 1.0);
        Ok(self)
    }
}

// ============================================================
// Engine Configuration
// ============================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Http,
    #[default]
    Stub,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnswerEngineConfig {
    #[serde(default)]
    pub kind: EngineKind,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Confidence reported by the stub engine.
    #[serde(default)]
    pub stub_confidence: Option<f64>,
}

impl AnswerEngineConfig {
    pub fn http(base_url: impl Into<String>) -> Self {
        Self {
            kind: EngineKind::Http,
            base_url: Some(base_url.into()),
            ..Default::default()
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

/// Create an answer engine from configuration.
pub fn create_answer_engine(config: &AnswerEngineConfig) -> Result<Arc<dyn AnswerEngine>> {
    let engine: Arc<dyn AnswerEngine> = match config.kind {
        EngineKind::Http => {
            let base_url = config
                .base_url
                .as_deref()
                .ok_or_else(|| anyhow!("http answer engine requires base_url"))?;
            Arc::new(HttpAnswerEngine::new(base_url, config.api_key.clone()))
        }
        EngineKind::Stub => {
            let confidence = config.stub_confidence.unwrap_or(0.9);
            Arc::new(StubAnswerEngine::new().with_confidence(confidence))
        }
    };
    tracing::info!(kind = ?config.kind, "answer engine configured");
    Ok(engine)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validated_clamps_out_of_range() {
        let a = Answer {
            answer: "ok".into(),
            confidence: 1.7,
            passages: vec![],
        };
        assert_eq!(a.validated().unwrap().confidence, 1.0);

        let a = Answer {
            answer: "ok".into(),
            confidence: -0.2,
            passages: vec![],
        };
        assert_eq!(a.validated().unwrap().confidence, 0.0);
    }

    #[test]
    fn validated_rejects_nan() {
        let a = Answer {
            answer: "ok".into(),
            confidence: f64::NAN,
            passages: vec![],
        };
        assert!(a.validated().is_err());
    }

    #[test]
    fn http_engine_requires_base_url() {
        let config = AnswerEngineConfig {
            kind: EngineKind::Http,
            ..Default::default()
        };
        let err = create_answer_engine(&config).err().unwrap();
        assert!(err.to_string().contains("requires base_url"));
    }

    #[test]
    fn engine_config_parses_from_yaml_shape() {
        let config: AnswerEngineConfig = serde_json::from_value(serde_json::json!({
            "kind": "http",
            "base_url": "http://rag.internal:8080",
            "api_key": "secret"
        }))
        .unwrap();
        assert_eq!(config.kind, EngineKind::Http);
        assert!(create_answer_engine(&config).is_ok());
    }
}
