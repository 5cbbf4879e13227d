//! The event schema streamed to the visualisation client.
//!
//! A closed tagged union serialised as `{"type": "...", ...}`. Every
//! session's stream consists of zero or more rounds of `DraftToken` /
//! `VerifyResult` events followed by exactly one of `Done` or `Error`.

use serde::Serialize;

use crate::sampler::OutcomeStatus;

#[derive(Debug, Clone, Serialize)]
pub struct TopToken {
    pub token: String,
    pub logprob: f32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    DraftToken {
        round: u32,
        position: usize,
        token: String,
        token_id: u32,
        logprob: f32,
        entropy: f32,
        top_tokens: Vec<TopToken>,
        draft_time_ms: u64,
    },
    VerifyResult {
        round: u32,
        position: usize,
        token: String,
        token_id: Option<u32>,
        status: OutcomeStatus,
        draft_logprob: f32,
        #[serde(skip_serializing_if = "Option::is_none")]
        target_logprob: Option<f32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        acceptance_prob: Option<f32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        target_entropy: Option<f32>,
        target_top_tokens: Vec<TopToken>,
        verify_time_ms: u64,
    },
    Metrics {
        round: u32,
        acceptance_rate: f32,
        round_accepted: usize,
        round_total: usize,
        effective_tps: f32,
        baseline_tps: f32,
        speedup: f32,
        draft_latency_ms: u64,
        verify_latency_ms: u64,
        total_tokens_generated: usize,
    },
    Done {
        total_tokens: usize,
        total_rounds: u32,
        final_acceptance_rate: f32,
        average_speedup: f32,
        generated_text: String,
    },
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        round: Option<u32>,
    },
}
