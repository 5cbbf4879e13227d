//! The target collaborator: the large reference model whose output
//! distribution the draft tokens are being verified against.
//!
//! Defined purely by capability — a single verification call per round,
//! returning per-position chosen tokens plus top-N logprobs — with one
//! concrete backend shipped against an OpenAI-compatible completions API.

pub mod http;

use async_trait::async_trait;
use std::collections::HashMap;

use crate::sampler::entropy_of;
use crate::utils::error::Result;

/// One verified position returned by the target collaborator.
#[derive(Debug, Clone)]
pub struct TargetPosition {
    pub text: String,
    pub token_logprob: f32,
    /// token text -> logprob, at most 20 entries.
    pub top_logprobs: HashMap<String, f32>,
}

impl TargetPosition {
    /// Shannon entropy approximated over the returned top-N
    /// sub-distribution; the true full-vocabulary entropy is never
    /// available from an API-only target.
    pub fn entropy(&self) -> f32 {
        let logprobs: Vec<f32> = self.top_logprobs.values().copied().collect();
        entropy_of(&logprobs)
    }
}

/// Result of one verification call, covering up to `k + 1` positions.
#[derive(Debug, Clone)]
pub struct VerificationResult {
    pub positions: Vec<TargetPosition>,
}

/// Capability set required of any target-model backend.
#[async_trait]
pub trait TargetCollaborator: Send + Sync {
    /// Verify up to `k + 1` continuation positions for `prompt +
    /// generated_text`. The returned `positions` are ordered and at
    /// most `k + 1` long.
    async fn verify(
        &self,
        prompt: &str,
        generated_text: &str,
        k: usize,
    ) -> Result<VerificationResult>;
}
