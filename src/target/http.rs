//! HTTP target collaborator backend.
//!
//! Wraps `reqwest` against an OpenAI-compatible `/v1/completions`
//! endpoint (Cerebras and most self-hosted inference servers implement
//! this shape). Temperature is pinned near zero so the returned
//! logprobs reflect the model's actual distribution while still
//! satisfying providers that reject an exact `0.0` alongside
//! `logprobs`.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{TargetCollaborator, TargetPosition, VerificationResult};
use crate::utils::error::{Result, SpecError};
use async_trait::async_trait;

const VERIFY_TEMPERATURE: f32 = 0.01;
const TOP_LOGPROBS: u32 = 20;

pub struct HttpTargetCollaborator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl HttpTargetCollaborator {
    pub fn new(base_url: String, model: String, api_key: String, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("reqwest client configuration is always valid");

        Self {
            client,
            base_url,
            model,
            api_key,
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    prompt: String,
    logprobs: u32,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    logprobs: Option<CompletionLogprobs>,
}

#[derive(Debug, Deserialize)]
struct CompletionLogprobs {
    tokens: Vec<String>,
    token_logprobs: Vec<Option<f32>>,
    top_logprobs: Vec<Option<HashMap<String, f32>>>,
}

#[async_trait]
impl TargetCollaborator for HttpTargetCollaborator {
    async fn verify(
        &self,
        prompt: &str,
        generated_text: &str,
        k: usize,
    ) -> Result<VerificationResult> {
        let full_prompt = format!("{prompt}{generated_text}");

        let request = CompletionRequest {
            model: self.model.clone(),
            prompt: full_prompt,
            logprobs: TOP_LOGPROBS,
            max_tokens: k + 1,
            temperature: VERIFY_TEMPERATURE,
        };

        let response = self
            .client
            .post(format!("{}/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SpecError::TargetFailure(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SpecError::TargetFailure(format!(
                "target returned {status}: {body}"
            )));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| SpecError::TargetFailure(format!("failed to decode response: {e}")))?;

        let choice =
            parsed.choices.into_iter().next().ok_or_else(|| {
                SpecError::TargetFailure("target returned no choices".to_string())
            })?;

        let logprobs = choice
            .logprobs
            .ok_or_else(|| SpecError::TargetFailure("target returned no logprobs".to_string()))?;

        let positions = logprobs
            .tokens
            .into_iter()
            .zip(logprobs.token_logprobs)
            .zip(logprobs.top_logprobs)
            .map(|((text, token_logprob), top)| TargetPosition {
                text,
                token_logprob: token_logprob.unwrap_or(f32::NEG_INFINITY),
                top_logprobs: top.unwrap_or_default(),
            })
            .collect();

        Ok(VerificationResult { positions })
    }
}
