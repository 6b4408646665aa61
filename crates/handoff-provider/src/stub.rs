use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::{Answer, AnswerEngine, AnswerRequest, Passage};

/// Canned engine for local runs and tests.
#[derive(Debug, Clone)]
pub struct StubAnswerEngine {
    confidence: f64,
    passages: Vec<Passage>,
    delay: Option<Duration>,
    fail: bool,
}

impl Default for StubAnswerEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StubAnswerEngine {
    pub fn new() -> Self {
        Self {
            confidence: 0.9,
            passages: Vec::new(),
            delay: None,
            fail: false,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_passages(mut self, passages: Vec<Passage>) -> Self {
        self.passages = passages;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }
}

#[async_trait]
impl AnswerEngine for StubAnswerEngine {
    async fn generate(&self, request: AnswerRequest) -> Result<Answer> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            bail!("stub answer engine configured to fail");
        }
        Answer {
            answer: format!("[stub:{}] {}", request.tenant, request.message),
            confidence: self.confidence,
            passages: self.passages.clone(),
        }
        .validated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(text: &str) -> AnswerRequest {
        AnswerRequest {
            tenant: "heine".into(),
            message: text.into(),
            history: vec![],
        }
    }

    #[tokio::test]
    async fn echoes_message_with_configured_confidence() {
        let engine = StubAnswerEngine::new().with_confidence(0.42);
        let answer = engine.generate(request("Hallo")).await.unwrap();
        assert_eq!(answer.answer, "[stub:heine] Hallo");
        assert_eq!(answer.confidence, 0.42);
    }

    #[tokio::test]
    async fn failing_stub_errors() {
        assert!(StubAnswerEngine::failing()
            .generate(request("Hallo"))
            .await
            .is_err());
    }
}
