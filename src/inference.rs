//! HTTP client for the embedding inference endpoint
//!
//! This module wraps the single inference operation the pipeline depends on:
//! `POST {base}/api/embeddings` with `{model, prompt}`, answered by
//! `{embedding: [float]}`. A missing or empty `embedding` field is a
//! protocol error and is surfaced the same way as a transport failure so the
//! caller's retry loop treats both identically.

use std::time::Duration;

use reqwest::Client as ReqwestClient;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};

/// Default timeout for inference requests in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Attempts made by the startup warm-up call
const WARMUP_ATTEMPTS: u32 = 3;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

/// Client for a single embedding inference endpoint.
#[derive(Clone)]
pub struct InferenceClient {
    client: ReqwestClient,
    embed_url: String,
    model: String,
}

impl InferenceClient {
    /// Create a client for `{base_url}/api/embeddings`.
    pub fn new(base_url: &str, model: &str) -> Result<Self> {
        let client = ReqwestClient::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(Error::Http)?;

        Ok(Self {
            client,
            embed_url: format!("{}/api/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
        })
    }

    /// Model identifier sent with every request.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Issue one inference call. No retries at this layer; the embedding
    /// engine owns the retry loop.
    #[instrument(skip(self, prompt), level = "debug")]
    pub async fn embed_once(&self, prompt: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.model,
            prompt,
        };

        debug!(prompt_len = prompt.len(), "sending embedding request");
        let response = self
            .client
            .post(&self.embed_url)
            .json(&request)
            .send()
            .await
            .map_err(Error::Http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status_code: status.as_u16(),
                message: body,
            });
        }

        let payload: EmbeddingResponse = response.json().await.map_err(Error::Http)?;
        if payload.embedding.is_empty() {
            return Err(Error::UnexpectedResponse(
                "response missing or empty embedding field".to_string(),
            ));
        }

        Ok(payload.embedding)
    }

    /// Health-check the endpoint and discover the vector dimensionality.
    ///
    /// Makes up to three attempts with exponential backoff; failure is fatal
    /// to the run. The discovered dimensionality is expected to stay constant
    /// for the life of the process.
    pub async fn warm_up(&self) -> Result<usize> {
        let mut last_err = None;

        for attempt in 0..WARMUP_ATTEMPTS {
            match self.embed_once("test warmup").await {
                Ok(vector) => {
                    info!(
                        model = %self.model,
                        dimensions = vector.len(),
                        "inference endpoint healthy"
                    );
                    return Ok(vector.len());
                }
                Err(e) => {
                    warn!(
                        attempt = attempt + 1,
                        error = %e,
                        "inference warm-up attempt failed"
                    );
                    last_err = Some(e);
                    if attempt + 1 < WARMUP_ATTEMPTS {
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                    }
                }
            }
        }

        Err(Error::Init(format!(
            "inference endpoint unreachable after {} attempts: {}",
            WARMUP_ATTEMPTS,
            last_err.map(|e| e.to_string()).unwrap_or_default()
        )))
    }
}
