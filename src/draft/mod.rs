//! The draft collaborator: a local, cheap model that proposes K
//! candidate continuation tokens per round.
//!
//! Real GPU/CPU model loading is explicitly out of scope for this
//! engine (and blocked in constrained build environments that lack a
//! native toolchain); this module defines the capability set any
//! concrete backend must satisfy and ships one pure-Rust reference
//! implementation behind it.

pub mod reference;
pub mod template;

use async_trait::async_trait;

use crate::utils::error::Result;

/// One token proposed by the draft collaborator at a given position.
#[derive(Debug, Clone)]
pub struct DraftToken {
    pub id: u32,
    pub text: String,
    pub logprob: f32,
    pub entropy: f32,
    /// Up to 10 alternative (text, logprob) pairs, most likely first.
    pub top_k: Vec<(String, f32)>,
}

/// Capability set required of any draft-model backend.
#[async_trait]
pub trait DraftCollaborator: Send + Sync {
    /// Render a user prompt into the model's native prompt string. The
    /// target collaborator's verify call is built on top of this same
    /// rendered text plus the canonical generated-text continuation, so
    /// both collaborators agree on what "the prompt" looks like.
    fn render_prompt(&self, prompt: &str) -> String;

    /// Render and tokenise a user prompt; the result becomes the
    /// immutable context prefix.
    fn apply_chat_template(&self, prompt: &str) -> Vec<u32> {
        self.tokenise(&self.render_prompt(prompt))
    }

    /// Propose `k` tokens continuing `context_ids`. Implementations MUST
    /// reset any internal KV cache before each call, since the full
    /// context is passed explicitly every round. `temperature == 0.0`
    /// means greedy decoding.
    async fn generate(
        &self,
        context_ids: &[u32],
        k: usize,
        temperature: f32,
    ) -> Result<Vec<DraftToken>>;

    /// Tokenise arbitrary text with no special tokens added.
    fn tokenise(&self, text: &str) -> Vec<u32>;

    /// Detokenise an ID sequence back to text. This is the only
    /// sanctioned way to derive `generated_text`; never splice token
    /// strings together, since vocabularies are not guaranteed to be
    /// whitespace-separable.
    fn decode(&self, ids: &[u32]) -> String;
}
