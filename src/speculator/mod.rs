//! The speculation orchestrator.
//!
//! Drives one generation session end to end: draft K tokens, verify
//! them in a single remote call, run modified rejection sampling,
//! commit the surviving tokens, and emit the resulting event stream.
//! Owns the only mutable state in the system, [`GenerationState`], and
//! is the sole place the context-integrity invariant (`generated_text`
//! is always a fresh decode of `generated_ids`, never a string splice)
//! is enforced.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_stream::stream;
use rand::SeedableRng;
use rand_isaac::Isaac64Rng;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::draft::DraftCollaborator;
use crate::events::{Event, TopToken};
use crate::metrics::{RoundStats, SharedMetrics};
use crate::sampler::{sample_round, DraftInput, OutcomeStatus, TargetInput};
use crate::target::TargetCollaborator;

/// Generation state for a single session. Exclusively owned by the
/// round loop driving it; never shared or mutated concurrently.
struct GenerationState {
    context_ids: Vec<u32>,
    generated_ids: Vec<u32>,
    generated_text: String,
    round: u32,
}

pub struct SpeculationParams {
    pub prompt: String,
    pub max_tokens: usize,
    pub temperature: f32,
    pub k: usize,
    pub eos_tokens: Vec<String>,
    pub draft_pacing_ms: u64,
    pub verify_pacing_ms: u64,
    /// Fixed seed for the sampler's acceptance draw; `None` seeds from
    /// OS entropy.
    pub seed: Option<u64>,
    /// Cancelled when the transport detects the client is gone (e.g. a
    /// closed WebSocket). Checked between rounds and raced against the
    /// draft/target calls so a session doesn't keep drafting or paying
    /// for target verification for a client that already left.
    pub cancellation: CancellationToken,
}

pub struct Speculator {
    draft: Arc<dyn DraftCollaborator>,
    target: Arc<dyn TargetCollaborator>,
    metrics: SharedMetrics,
}

impl Speculator {
    pub fn new(
        draft: Arc<dyn DraftCollaborator>,
        target: Arc<dyn TargetCollaborator>,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            draft,
            target,
            metrics,
        }
    }

    /// Drive one generation session, yielding events as each round
    /// completes. The stream always ends with exactly one `Done` or
    /// `Error` event.
    pub fn generate(
        self: Arc<Self>,
        params: SpeculationParams,
    ) -> impl Stream<Item = Event> + Send + 'static {
        stream! {
            self.metrics.session_start();
            let _guard = SessionGuard { metrics: self.metrics.clone() };

            let mut rng = match params.seed {
                Some(seed) => Isaac64Rng::seed_from_u64(seed),
                None => Isaac64Rng::from_entropy(),
            };

            let context_ids = self.draft.apply_chat_template(&params.prompt);
            let rendered_prompt = self.draft.render_prompt(&params.prompt);
            let mut state = GenerationState {
                context_ids,
                generated_ids: Vec::new(),
                generated_text: String::new(),
                round: 0,
            };

            let mut total_accepted: usize = 0;
            let mut total_drafted: usize = 0;
            let mut total_produced: usize = 0;
            let mut speedup_sum: f32 = 0.0;
            let mut rounds_completed: u32 = 0;

            loop {
                if params.cancellation.is_cancelled() {
                    info!(round = state.round, "session cancelled, client gone");
                    return;
                }

                state.round += 1;
                let round = state.round;

                let full_ctx: Vec<u32> = state
                    .context_ids
                    .iter()
                    .chain(state.generated_ids.iter())
                    .copied()
                    .collect();

                let draft_start = Instant::now();
                let drafts = tokio::select! {
                    res = self.draft.generate(&full_ctx, params.k, params.temperature) => match res {
                        Ok(d) => d,
                        Err(e) => {
                            yield Event::Error { message: e.to_string(), round: Some(round) };
                            return;
                        }
                    },
                    _ = params.cancellation.cancelled() => {
                        info!(round, "session cancelled during drafting");
                        return;
                    }
                };
                let draft_latency_ms = draft_start.elapsed().as_millis() as u64;

                for (position, token) in drafts.iter().enumerate() {
                    yield Event::DraftToken {
                        round,
                        position,
                        token: token.text.clone(),
                        token_id: token.id,
                        logprob: token.logprob,
                        entropy: token.entropy,
                        top_tokens: token
                            .top_k
                            .iter()
                            .map(|(t, p)| TopToken { token: t.clone(), logprob: *p })
                            .collect(),
                        draft_time_ms: draft_latency_ms,
                    };
                    if params.draft_pacing_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(params.draft_pacing_ms)).await;
                    }
                }

                let verify_start = Instant::now();
                let verification = tokio::select! {
                    res = self.target.verify(&rendered_prompt, &state.generated_text, params.k) => match res {
                        Ok(v) => v,
                        Err(e) => {
                            yield Event::Error { message: e.to_string(), round: Some(round) };
                            return;
                        }
                    },
                    _ = params.cancellation.cancelled() => {
                        info!(round, "session cancelled during verification");
                        return;
                    }
                };
                let verify_latency_ms = verify_start.elapsed().as_millis() as u64;

                if verification.positions.len() < drafts.len() {
                    yield Event::Error {
                        message: "target returned fewer positions than drafted".to_string(),
                        round: Some(round),
                    };
                    return;
                }

                let draft_inputs: Vec<DraftInput> = drafts
                    .iter()
                    .map(|t| DraftInput { id: t.id, text: t.text.clone(), logprob: t.logprob })
                    .collect();
                let target_inputs: Vec<TargetInput> = verification
                    .positions
                    .iter()
                    .map(|p| TargetInput {
                        text: p.text.clone(),
                        top_logprobs: p.top_logprobs.clone(),
                    })
                    .collect();

                let round_result = sample_round(&draft_inputs, &target_inputs, &mut rng);
                total_drafted += drafts.len();
                total_accepted += round_result.accepted_count;

                for outcome in &round_result.comparisons {
                    match outcome.status {
                        OutcomeStatus::Rejected => {
                            // Always immediately followed by its Resampled
                            // pair; only the merged Resampled event below is
                            // sent to the client.
                            continue;
                        }
                        OutcomeStatus::Accepted => {
                            state
                                .generated_ids
                                .push(outcome.final_id.expect("accepted outcome always carries an id"));
                        }
                        OutcomeStatus::Resampled | OutcomeStatus::Bonus => {
                            let ids = self.draft.tokenise(&outcome.final_text);
                            if ids.is_empty() {
                                warn!(round, position = outcome.position, "resampled text tokenised to zero ids, dropping");
                            } else {
                                state.generated_ids.extend(ids);
                            }
                        }
                    }

                    let target_position = &verification.positions[outcome.position.min(verification.positions.len() - 1)];
                    yield Event::VerifyResult {
                        round,
                        position: outcome.position,
                        token: outcome.final_text.clone(),
                        token_id: outcome.final_id,
                        status: outcome.status,
                        draft_logprob: outcome.draft_logprob,
                        target_logprob: outcome.target_logprob,
                        acceptance_prob: outcome.acceptance_prob,
                        target_entropy: Some(target_position.entropy()),
                        target_top_tokens: top_n_tokens(&target_position.top_logprobs, 5),
                        verify_time_ms: verify_latency_ms,
                    };
                    if params.verify_pacing_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(params.verify_pacing_ms)).await;
                    }
                }

                state.generated_text = self.draft.decode(&state.generated_ids);

                let produced_this_round = round_result.accepted_count
                    + round_result.comparisons.iter().filter(|c| c.status == OutcomeStatus::Resampled).count()
                    + round_result.comparisons.iter().filter(|c| c.status == OutcomeStatus::Bonus).count();
                total_produced += produced_this_round;

                let round_time_ms = draft_latency_ms + verify_latency_ms;
                let stats = RoundStats {
                    accepted: round_result.accepted_count,
                    drafted: drafts.len(),
                    produced: produced_this_round,
                    draft_latency_ms,
                    verify_latency_ms,
                    round_time_ms,
                    k: params.k,
                };
                let kpis = self.metrics.record_round(stats).await;
                rounds_completed += 1;
                speedup_sum += kpis.speedup;

                yield Event::Metrics {
                    round,
                    acceptance_rate: kpis.acceptance_rate,
                    round_accepted: round_result.accepted_count,
                    round_total: drafts.len(),
                    effective_tps: kpis.effective_tps,
                    baseline_tps: kpis.baseline_tps,
                    speedup: kpis.speedup,
                    draft_latency_ms,
                    verify_latency_ms,
                    total_tokens_generated: total_produced,
                };

                let eos_hit = params
                    .eos_tokens
                    .iter()
                    .any(|marker| state.generated_text.contains(marker.as_str()));
                let length_hit = total_produced >= params.max_tokens;

                if eos_hit || length_hit {
                    info!(round, produced = total_produced, eos_hit, length_hit, "session terminating");
                    let final_acceptance_rate = if total_drafted == 0 {
                        0.0
                    } else {
                        total_accepted as f32 / total_drafted as f32
                    };
                    let average_speedup = if rounds_completed == 0 {
                        1.0
                    } else {
                        speedup_sum / rounds_completed as f32
                    };
                    yield Event::Done {
                        total_tokens: total_produced,
                        total_rounds: state.round,
                        final_acceptance_rate,
                        average_speedup,
                        generated_text: state.generated_text.clone(),
                    };
                    return;
                }
            }
        }
    }
}

/// Drops active-session accounting when the stream is dropped, whether
/// it ran to completion or was cancelled mid-round.
struct SessionGuard {
    metrics: SharedMetrics,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.metrics.session_end();
    }
}

fn top_n_tokens(top_logprobs: &HashMap<String, f32>, n: usize) -> Vec<TopToken> {
    let mut entries: Vec<(&String, &f32)> = top_logprobs.iter().collect();
    entries.sort_by(|a, b| b.1.partial_cmp(a.1).unwrap());
    entries
        .into_iter()
        .take(n)
        .map(|(t, p)| TopToken {
            token: t.clone(),
            logprob: *p,
        })
        .collect()
}
