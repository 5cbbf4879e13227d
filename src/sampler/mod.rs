//! Modified rejection sampling for speculative decoding.
//!
//! Pure decision logic: given the draft model's proposed tokens and the
//! target model's verification distributions for the same positions,
//! decide which draft tokens survive, which get replaced, and whether a
//! bonus token is available. Contains no I/O and no async; the only
//! external input is an injected `rand::Rng` so the decision is
//! reproducible under a fixed seed.

use std::collections::HashMap;

use rand::Rng;
use serde::Serialize;

/// One drafted token position, as produced by the draft collaborator.
#[derive(Debug, Clone)]
pub struct DraftInput {
    pub id: u32,
    pub text: String,
    pub logprob: f32,
}

/// One verified position, as returned by the target collaborator.
#[derive(Debug, Clone)]
pub struct TargetInput {
    pub text: String,
    /// token text -> logprob, as reported by the target (top-N only)
    pub top_logprobs: HashMap<String, f32>,
}

impl TargetInput {
    fn logprob_of(&self, text: &str) -> Option<f32> {
        self.top_logprobs.get(text).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Accepted,
    Rejected,
    Resampled,
    Bonus,
}

/// The sampler's verdict for a single position.
#[derive(Debug, Clone)]
pub struct ComparisonOutcome {
    pub position: usize,
    pub status: OutcomeStatus,
    pub draft_text: String,
    pub final_text: String,
    /// Token id to commit to generated_ids; None when the final text must
    /// be re-tokenised by the caller (resampled / bonus positions).
    pub final_id: Option<u32>,
    pub draft_logprob: f32,
    pub target_logprob: Option<f32>,
    pub acceptance_prob: Option<f32>,
}

/// The accumulated result of verifying one round of drafts.
#[derive(Debug, Clone, Default)]
pub struct RoundResult {
    pub comparisons: Vec<ComparisonOutcome>,
    pub accepted_count: usize,
    pub bonus_text: Option<String>,
    pub bonus_id: Option<u32>,
}

/// Run modified rejection sampling over one round's drafts and targets.
///
/// `targets` must cover at least `drafts.len()` positions; when it covers
/// exactly one more, the extra position is available as a bonus token if
/// every draft was accepted.
pub fn sample_round<R: Rng + ?Sized>(
    drafts: &[DraftInput],
    targets: &[TargetInput],
    rng: &mut R,
) -> RoundResult {
    let mut comparisons = Vec::with_capacity(drafts.len() + 1);
    let mut accepted_count = 0;

    for (i, draft) in drafts.iter().enumerate() {
        let target = &targets[i];

        // Case 1: exact textual match — always accepted.
        if draft.text == target.text {
            comparisons.push(ComparisonOutcome {
                position: i,
                status: OutcomeStatus::Accepted,
                draft_text: draft.text.clone(),
                final_text: draft.text.clone(),
                final_id: Some(draft.id),
                draft_logprob: draft.logprob,
                target_logprob: target.logprob_of(&draft.text),
                acceptance_prob: Some(1.0),
            });
            accepted_count += 1;
            continue;
        }

        match target.logprob_of(&draft.text) {
            // Case 2: draft token is in the target's top-N — accept with
            // probability alpha = min(1, p/q), else reject and resample.
            Some(target_logprob) => {
                let alpha = (target_logprob - draft.logprob).exp().min(1.0);
                let u: f32 = rng.gen();
                if u < alpha {
                    comparisons.push(ComparisonOutcome {
                        position: i,
                        status: OutcomeStatus::Accepted,
                        draft_text: draft.text.clone(),
                        final_text: draft.text.clone(),
                        final_id: Some(draft.id),
                        draft_logprob: draft.logprob,
                        target_logprob: Some(target_logprob),
                        acceptance_prob: Some(alpha),
                    });
                    accepted_count += 1;
                    continue;
                }

                comparisons.push(ComparisonOutcome {
                    position: i,
                    status: OutcomeStatus::Rejected,
                    draft_text: draft.text.clone(),
                    final_text: target.text.clone(),
                    final_id: Some(draft.id),
                    draft_logprob: draft.logprob,
                    target_logprob: Some(target_logprob),
                    acceptance_prob: Some(alpha),
                });
                comparisons.push(ComparisonOutcome {
                    position: i,
                    status: OutcomeStatus::Resampled,
                    draft_text: draft.text.clone(),
                    final_text: target.text.clone(),
                    final_id: None,
                    draft_logprob: draft.logprob,
                    target_logprob: Some(target_logprob),
                    acceptance_prob: Some(0.0),
                });
                break;
            }
            // Case 3: draft token absent from the target's top-N — treat
            // its target probability as zero, reject and resample.
            None => {
                comparisons.push(ComparisonOutcome {
                    position: i,
                    status: OutcomeStatus::Rejected,
                    draft_text: draft.text.clone(),
                    final_text: target.text.clone(),
                    final_id: Some(draft.id),
                    draft_logprob: draft.logprob,
                    target_logprob: None,
                    acceptance_prob: Some(0.0),
                });
                comparisons.push(ComparisonOutcome {
                    position: i,
                    status: OutcomeStatus::Resampled,
                    draft_text: draft.text.clone(),
                    final_text: target.text.clone(),
                    final_id: None,
                    draft_logprob: draft.logprob,
                    target_logprob: None,
                    acceptance_prob: Some(0.0),
                });
                break;
            }
        }
    }

    let mut bonus_text = None;
    let mut bonus_id = None;
    if accepted_count == drafts.len() && targets.len() > drafts.len() {
        let bonus = &targets[drafts.len()];
        comparisons.push(ComparisonOutcome {
            position: drafts.len(),
            status: OutcomeStatus::Bonus,
            draft_text: String::new(),
            final_text: bonus.text.clone(),
            final_id: None,
            draft_logprob: 0.0,
            target_logprob: bonus.logprob_of(&bonus.text),
            acceptance_prob: Some(1.0),
        });
        bonus_text = Some(bonus.text.clone());
        bonus_id = None;
    }

    RoundResult {
        comparisons,
        accepted_count,
        bonus_text,
        bonus_id,
    }
}

/// Shannon entropy (in nats) of a log-probability distribution already
/// expressed as `(text, logprob)` pairs. Used both by the draft
/// collaborator (over its full softmax) and the target collaborator
/// (approximated over its top-N, since the full distribution is never
/// returned by the API).
pub fn entropy_of(logprobs: &[f32]) -> f32 {
    if logprobs.is_empty() {
        return 0.0;
    }
    // Renormalise so the provided slice (which may only be a top-N
    // truncation) sums to 1 before computing entropy.
    let max_lp = logprobs.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let sum: f32 = logprobs.iter().map(|lp| (lp - max_lp).exp()).sum();
    let log_z = max_lp + sum.ln();
    logprobs
        .iter()
        .map(|lp| {
            let p = (lp - log_z).exp();
            if p > 0.0 {
                -p * (lp - log_z)
            } else {
                0.0
            }
        })
        .sum()
}
