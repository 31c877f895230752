//! Embedding router client.
//!
//! Every file-processing attempt makes two calls against the router:
//!
//! 1. `POST {base}/v1/token` with `{"api_key": ...}` → `{"access_token": ...}`
//! 2. `POST {base}/v1/embeddings` with `Authorization: Bearer <token>` and
//!    `{"input": [...]}` → `{"data": [{"embedding": [...]}, ...]}`
//!
//! Tokens are never cached; each attempt fetches its own. The two calls have
//! separate timeouts and separate error types ([`AuthError`], [`EmbedError`])
//! so failures can be told apart in the logs. There is no retry: a failed
//! call fails the file.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::config::RouterConfig;
use crate::error::{AuthError, EmbedError};

/// Longest response body kept in an error message.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Remote embedding capability used by the file processor.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Obtain a short-lived bearer token.
    async fn authenticate(&self) -> Result<String, AuthError>;

    /// Embed `texts` in order. Returns exactly one vector per input.
    async fn embed(&self, texts: &[String], token: &str) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// HTTP client for the embedding router.
pub struct RouterClient {
    http: reqwest::Client,
    token_url: String,
    embed_url: String,
    api_key: String,
    token_timeout: Duration,
    embed_timeout: Duration,
}

impl RouterClient {
    /// Build a client from configuration. Fails if no API key is configured.
    pub fn new(config: &RouterConfig) -> Result<Self> {
        let api_key = config.require_api_key()?.to_string();
        let base = normalize_base_url(&config.base_url);
        let http = reqwest::Client::builder().build()?;

        Ok(Self {
            http,
            token_url: format!("{}/v1/token", base),
            embed_url: format!("{}/v1/embeddings", base),
            api_key,
            token_timeout: config.token_timeout(),
            embed_timeout: config.embed_timeout(),
        })
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    pub fn embed_url(&self) -> &str {
        &self.embed_url
    }
}

#[async_trait]
impl EmbeddingService for RouterClient {
    async fn authenticate(&self) -> Result<String, AuthError> {
        let response = self
            .http
            .post(&self.token_url)
            .timeout(self.token_timeout)
            .json(&serde_json::json!({ "api_key": self.api_key }))
            .send()
            .await
            .map_err(AuthError::Transport)?;

        let status = response.status();
        let body = response.text().await.map_err(AuthError::Transport)?;

        if !status.is_success() {
            return Err(AuthError::Status {
                status,
                body: truncate_body(&body),
            });
        }

        parse_token_response(&body)
    }

    async fn embed(&self, texts: &[String], token: &str) -> Result<Vec<Vec<f32>>, EmbedError> {
        tracing::debug!(inputs = texts.len(), "requesting embeddings");

        let response = self
            .http
            .post(&self.embed_url)
            .timeout(self.embed_timeout)
            .bearer_auth(token)
            .json(&serde_json::json!({ "input": texts }))
            .send()
            .await
            .map_err(EmbedError::Transport)?;

        let status = response.status();
        let body = response.text().await.map_err(EmbedError::Transport)?;

        if !status.is_success() {
            return Err(EmbedError::Status {
                status,
                body: truncate_body(&body),
            });
        }

        parse_embedding_response(&body, texts.len())
    }
}

/// Reduce a configured router URL to its base.
///
/// Accepts both the base (`http://router:8080`) and the full embeddings
/// endpoint (`http://router:8080/v1/embeddings`).
pub fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    trimmed
        .strip_suffix("/v1/embeddings")
        .unwrap_or(trimmed)
        .to_string()
}

/// Extract a non-empty `access_token` from a token endpoint body.
pub fn parse_token_response(body: &str) -> Result<String, AuthError> {
    let json: Value = serde_json::from_str(body).map_err(|_| AuthError::MissingToken {
        body: truncate_body(body),
    })?;

    match json.get("access_token").and_then(|t| t.as_str()) {
        Some(token) if !token.is_empty() => Ok(token.to_string()),
        _ => Err(AuthError::MissingToken {
            body: truncate_body(body),
        }),
    }
}

/// Extract `data[].embedding` arrays and check there is one per input.
pub fn parse_embedding_response(body: &str, expected: usize) -> Result<Vec<Vec<f32>>, EmbedError> {
    let malformed = |reason: &str| EmbedError::Malformed {
        reason: reason.to_string(),
        body: truncate_body(body),
    };

    let json: Value = serde_json::from_str(body).map_err(|_| malformed("body is not JSON"))?;

    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| malformed("missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());

    for item in data {
        let values = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| malformed("item missing embedding array"))?;

        let vector = values
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32))
            .collect::<Option<Vec<f32>>>()
            .ok_or_else(|| malformed("embedding contains a non-numeric value"))?;

        embeddings.push(vector);
    }

    if embeddings.len() != expected {
        return Err(EmbedError::CountMismatch {
            expected,
            actual: embeddings.len(),
        });
    }

    Ok(embeddings)
}

fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        return body.to_string();
    }
    let mut out: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("http://r:8080"), "http://r:8080");
        assert_eq!(normalize_base_url("http://r:8080/"), "http://r:8080");
        assert_eq!(normalize_base_url("http://r:8080/v1/embeddings"), "http://r:8080");
        assert_eq!(normalize_base_url("http://r:8080/v1/embeddings/"), "http://r:8080");
        assert_eq!(normalize_base_url("http://r/llm"), "http://r/llm");
    }

    #[test]
    fn test_client_urls() {
        let config = RouterConfig {
            base_url: "http://router:8080/v1/embeddings".to_string(),
            api_key: Some("k".to_string()),
            ..RouterConfig::default()
        };
        let client = RouterClient::new(&config).unwrap();
        assert_eq!(client.token_url(), "http://router:8080/v1/token");
        assert_eq!(client.embed_url(), "http://router:8080/v1/embeddings");
    }

    #[test]
    fn test_client_requires_api_key() {
        assert!(RouterClient::new(&RouterConfig::default()).is_err());
    }

    #[test]
    fn test_parse_token() {
        assert_eq!(parse_token_response(r#"{"access_token":"abc"}"#).unwrap(), "abc");
        assert!(matches!(
            parse_token_response(r#"{"access_token":""}"#),
            Err(AuthError::MissingToken { .. })
        ));
        assert!(matches!(
            parse_token_response(r#"{"token":"abc"}"#),
            Err(AuthError::MissingToken { .. })
        ));
        assert!(matches!(
            parse_token_response("<html>"),
            Err(AuthError::MissingToken { .. })
        ));
    }

    #[test]
    fn test_parse_embeddings_in_order() {
        let body = r#"{"data":[{"embedding":[0.1,0.2]},{"embedding":[0.3,0.4]}]}"#;
        let vectors = parse_embedding_response(body, 2).unwrap();
        assert_eq!(vectors, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
    }

    #[test]
    fn test_parse_embeddings_missing_data() {
        let err = parse_embedding_response(r#"{"error":"nope"}"#, 1).unwrap_err();
        assert!(matches!(err, EmbedError::Malformed { ref body, .. } if body.contains("nope")));
    }

    #[test]
    fn test_parse_embeddings_missing_embedding() {
        let err = parse_embedding_response(r#"{"data":[{"vector":[1]}]}"#, 1).unwrap_err();
        assert!(matches!(err, EmbedError::Malformed { .. }));
    }

    #[test]
    fn test_parse_embeddings_non_numeric() {
        let err = parse_embedding_response(r#"{"data":[{"embedding":[1,"x"]}]}"#, 1).unwrap_err();
        assert!(matches!(err, EmbedError::Malformed { .. }));
    }

    #[test]
    fn test_parse_embeddings_count_mismatch() {
        let body = r#"{"data":[{"embedding":[1.0]}]}"#;
        let err = parse_embedding_response(body, 2).unwrap_err();
        assert!(matches!(
            err,
            EmbedError::CountMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(2000);
        let t = truncate_body(&long);
        assert_eq!(t.chars().count(), MAX_ERROR_BODY_CHARS + 1);
        assert_eq!(truncate_body("short"), "short");
    }
}
