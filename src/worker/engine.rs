//! Execution engine boundary.
//!
//! The engine does the expensive work the triage pipeline protects. It is
//! invoked without a timeout and may suspend for as long as it likes.

use crate::config::EngineConfig;
use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;

/// Downstream executor for admitted requests.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Run one request to completion. `Ok` carries the result text recorded
    /// on the queue record; `Err` is recorded as the failure message.
    async fn execute(&self, request_id: &str, payload: &str) -> anyhow::Result<String>;
}

/// Maximum number of response-body bytes quoted in an error message.
const ERROR_BODY_PREVIEW: usize = 512;

#[derive(Debug, Serialize)]
struct ExecuteRequest<'a> {
    request_id: &'a str,
    payload: &'a str,
}

/// Posts each request as JSON to an HTTP endpoint and returns the response body.
pub struct HttpEngine {
    url: String,
    bearer_token: Option<String>,
    client: reqwest::Client,
}

impl HttpEngine {
    pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
        // No request timeout: engine calls may run arbitrarily long.
        let client = reqwest::Client::builder()
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            url: url.into(),
            bearer_token: None,
            client,
        })
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Build from `[engine]`. Fails when no URL is configured.
    pub fn from_config(config: &EngineConfig) -> anyhow::Result<Self> {
        let url = config
            .url
            .as_deref()
            .context("no execution engine configured (set [engine] url)")?;
        let engine = Self::new(url)?;
        Ok(match &config.bearer_token {
            Some(token) => engine.with_bearer_token(token.clone()),
            None => engine,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ExecutionEngine for HttpEngine {
    async fn execute(&self, request_id: &str, payload: &str) -> anyhow::Result<String> {
        let mut req = self.client.post(&self.url).json(&ExecuteRequest {
            request_id,
            payload,
        });
        if let Some(token) = &self.bearer_token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .with_context(|| format!("engine request to {} failed", self.url))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .context("failed to read engine response body")?;

        if !status.is_success() {
            let preview = truncate_on_char_boundary(&body, ERROR_BODY_PREVIEW);
            anyhow::bail!("engine returned status {status}: {preview}");
        }
        Ok(body)
    }
}

fn truncate_on_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let end = s
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= max)
        .last()
        .unwrap_or(0);
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn posts_request_and_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/execute"))
            .and(body_json(serde_json::json!({
                "request_id": "r-1",
                "payload": "export the ledger",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string("ledger exported"))
            .expect(1)
            .mount(&server)
            .await;

        let engine = HttpEngine::new(format!("{}/execute", server.uri())).unwrap();
        let out = engine.execute("r-1", "export the ledger").await.unwrap();
        assert_eq!(out, "ledger exported");
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let engine = HttpEngine::new(server.uri()).unwrap();
        let err = engine.execute("r-2", "archive logs").await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("503"), "{msg}");
        assert!(msg.contains("overloaded"), "{msg}");
    }

    #[tokio::test]
    async fn sends_bearer_token_from_config() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer s3cret"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let engine = HttpEngine::from_config(&EngineConfig {
            url: Some(server.uri()),
            bearer_token: Some("s3cret".into()),
        })
        .unwrap();
        assert_eq!(engine.execute("r-3", "batch run").await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn unreachable_engine_is_an_error() {
        let engine = HttpEngine::new("http://127.0.0.1:1/execute").unwrap();
        assert!(engine.execute("r-4", "x").await.is_err());
    }

    #[test]
    fn from_config_requires_url() {
        assert!(HttpEngine::from_config(&EngineConfig::default()).is_err());
    }

    #[test]
    fn preview_truncation_respects_char_boundaries() {
        assert_eq!(truncate_on_char_boundary("short", 10), "short");
        let s = "ééééé";
        let cut = truncate_on_char_boundary(s, 3);
        assert_eq!(cut, "é");
    }
}
