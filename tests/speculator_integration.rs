//! End-to-end tests driving the `Speculator` round loop against scripted
//! draft/target collaborators, exercising the testable properties from
//! the design: event ordering, the rejected+resampled pairing, and both
//! termination paths.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use spectra_engine::draft::{DraftCollaborator, DraftToken};
use spectra_engine::metrics::create_metrics;
use spectra_engine::sampler::OutcomeStatus;
use spectra_engine::target::{TargetCollaborator, TargetPosition, VerificationResult};
use spectra_engine::{Event, SpeculationParams, Speculator};
use tokio_util::sync::CancellationToken;

fn vocab() -> HashMap<&'static str, u32> {
    [
        ("stop", 0),
        ("foo", 1),
        ("bar", 2),
        ("alpha", 3),
        ("beta", 4),
    ]
    .into_iter()
    .collect()
}

struct ScriptedDraft {
    vocab: HashMap<&'static str, u32>,
    rounds: Mutex<std::collections::VecDeque<Vec<(&'static str, f32)>>>,
}

impl ScriptedDraft {
    fn new(rounds: Vec<Vec<(&'static str, f32)>>) -> Self {
        Self {
            vocab: vocab(),
            rounds: Mutex::new(rounds.into()),
        }
    }
}

#[async_trait]
impl DraftCollaborator for ScriptedDraft {
    fn render_prompt(&self, prompt: &str) -> String {
        prompt.to_string()
    }

    async fn generate(
        &self,
        _context_ids: &[u32],
        _k: usize,
        _temperature: f32,
    ) -> spectra_engine::Result<Vec<DraftToken>> {
        let round = self
            .rounds
            .lock()
            .unwrap()
            .pop_front()
            .expect("script exhausted");
        Ok(round
            .into_iter()
            .map(|(text, logprob)| DraftToken {
                id: self.vocab[text],
                text: text.to_string(),
                logprob,
                entropy: 0.0,
                top_k: vec![],
            })
            .collect())
    }

    fn tokenise(&self, text: &str) -> Vec<u32> {
        text.split_whitespace()
            .filter_map(|w| self.vocab.get(w).copied())
            .collect()
    }

    fn decode(&self, ids: &[u32]) -> String {
        let rev: HashMap<u32, &str> = self.vocab.iter().map(|(k, v)| (*v, *k)).collect();
        ids.iter()
            .map(|id| rev.get(id).copied().unwrap_or("?"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

struct ScriptedTarget {
    rounds: Mutex<std::collections::VecDeque<Vec<(&'static str, Vec<(&'static str, f32)>)>>>,
}

impl ScriptedTarget {
    fn new(rounds: Vec<Vec<(&'static str, Vec<(&'static str, f32)>)>>) -> Self {
        Self {
            rounds: Mutex::new(rounds.into()),
        }
    }
}

#[async_trait]
impl TargetCollaborator for ScriptedTarget {
    async fn verify(
        &self,
        _prompt: &str,
        _generated_text: &str,
        _k: usize,
    ) -> spectra_engine::Result<VerificationResult> {
        let round = self
            .rounds
            .lock()
            .unwrap()
            .pop_front()
            .expect("script exhausted");
        Ok(VerificationResult {
            positions: round
                .into_iter()
                .map(|(text, top)| TargetPosition {
                    text: text.to_string(),
                    token_logprob: top
                        .iter()
                        .find(|(t, _)| *t == text)
                        .map(|(_, p)| *p)
                        .unwrap_or(f32::NEG_INFINITY),
                    top_logprobs: top.into_iter().map(|(t, p)| (t.to_string(), p)).collect(),
                })
                .collect(),
        })
    }
}

fn base_params(prompt: &str) -> SpeculationParams {
    SpeculationParams {
        prompt: prompt.to_string(),
        max_tokens: 64,
        temperature: 0.0,
        k: 1,
        eos_tokens: vec![],
        draft_pacing_ms: 0,
        verify_pacing_ms: 0,
        seed: Some(1),
        cancellation: CancellationToken::new(),
    }
}

#[tokio::test]
async fn eos_marker_terminates_after_accept() {
    let draft = Arc::new(ScriptedDraft::new(vec![vec![("stop", -0.1)]]));
    let target = Arc::new(ScriptedTarget::new(vec![vec![(
        "stop",
        vec![("stop", -0.1)],
    )]]));
    let metrics = create_metrics(10);
    let speculator = Arc::new(Speculator::new(draft, target, metrics));

    let mut params = base_params("hi");
    params.eos_tokens = vec!["stop".to_string()];
    let events: Vec<Event> = speculator.generate(params).collect().await;

    // Invariant 1: draft_token, then verify_result, then metrics, per round.
    assert!(matches!(events[0], Event::DraftToken { .. }));
    assert!(matches!(events[1], Event::VerifyResult { .. }));
    assert!(matches!(events[2], Event::Metrics { .. }));
    match events.last().unwrap() {
        Event::Done {
            total_rounds,
            generated_text,
            ..
        } => {
            assert_eq!(*total_rounds, 1);
            assert_eq!(generated_text, "stop");
        }
        other => panic!("expected Done, got {other:?}"),
    }
}

#[tokio::test]
async fn length_limit_terminates_without_eos() {
    let draft = Arc::new(ScriptedDraft::new(vec![vec![("foo", -0.2)]]));
    let target = Arc::new(ScriptedTarget::new(vec![vec![(
        "foo",
        vec![("foo", -0.2)],
    )]]));
    let metrics = create_metrics(10);
    let speculator = Arc::new(Speculator::new(draft, target, metrics));

    let mut params = base_params("hi");
    params.max_tokens = 1;
    let events: Vec<Event> = speculator.generate(params).collect().await;

    match events.last().unwrap() {
        Event::Done { total_tokens, .. } => assert_eq!(*total_tokens, 1),
        other => panic!("expected Done, got {other:?}"),
    }
}

#[tokio::test]
async fn rejection_emits_single_merged_resampled_event() {
    // Draft proposes "foo"; target's chosen text is "bar" and "foo" is
    // absent from its top-N, forcing case-3 rejection+resample.
    let draft = Arc::new(ScriptedDraft::new(vec![vec![("foo", -0.1)]]));
    let target = Arc::new(ScriptedTarget::new(vec![vec![(
        "bar",
        vec![("bar", -0.2)],
    )]]));
    let metrics = create_metrics(10);
    let speculator = Arc::new(Speculator::new(draft, target, metrics));

    let mut params = base_params("hi");
    params.max_tokens = 1; // one committed token ends the session
    let events: Vec<Event> = speculator.generate(params).collect().await;

    let verify_results: Vec<&Event> = events
        .iter()
        .filter(|e| matches!(e, Event::VerifyResult { .. }))
        .collect();
    assert_eq!(
        verify_results.len(),
        1,
        "Rejected must not surface as its own event"
    );
    if let Event::VerifyResult { status, token, .. } = verify_results[0] {
        assert_eq!(*status, OutcomeStatus::Resampled);
        assert_eq!(token, "bar");
    } else {
        unreachable!()
    }

    match events.last().unwrap() {
        Event::Done { generated_text, .. } => assert_eq!(generated_text, "bar"),
        other => panic!("expected Done, got {other:?}"),
    }
}

#[tokio::test]
async fn metrics_total_tokens_is_non_decreasing_across_rounds() {
    let draft = Arc::new(ScriptedDraft::new(vec![
        vec![("alpha", -0.1)],
        vec![("beta", -0.1)],
    ]));
    let target = Arc::new(ScriptedTarget::new(vec![
        vec![("alpha", vec![("alpha", -0.1)])],
        vec![("beta", vec![("beta", -0.1)])],
    ]));
    let metrics = create_metrics(10);
    let speculator = Arc::new(Speculator::new(draft, target, metrics));

    let mut params = base_params("hi");
    params.max_tokens = 2;
    let events: Vec<Event> = speculator.generate(params).collect().await;

    let totals: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            Event::Metrics {
                total_tokens_generated,
                ..
            } => Some(*total_tokens_generated),
            _ => None,
        })
        .collect();
    assert_eq!(totals, vec![1, 2]);
}

#[tokio::test]
async fn resampled_multi_token_counts_as_one_produced_position() {
    // Draft proposes "foo"; target's chosen text is "foo bar" — a
    // resample whose text tokenises to two ids. `generated_ids` must
    // grow by both ids, but the round only committed one position.
    let draft = Arc::new(ScriptedDraft::new(vec![vec![("foo", -0.1)]]));
    let target = Arc::new(ScriptedTarget::new(vec![vec![(
        "foo bar",
        vec![("foo bar", -0.2)],
    )]]));
    let metrics = create_metrics(10);
    let speculator = Arc::new(Speculator::new(draft, target, metrics));

    let mut params = base_params("hi");
    params.max_tokens = 1; // one committed position ends the session
    let events: Vec<Event> = speculator.generate(params).collect().await;

    let metrics_total = events
        .iter()
        .find_map(|e| match e {
            Event::Metrics {
                total_tokens_generated,
                ..
            } => Some(*total_tokens_generated),
            _ => None,
        })
        .expect("a Metrics event was emitted");
    assert_eq!(
        metrics_total, 1,
        "a multi-id resample is still one committed position"
    );

    match events.last().unwrap() {
        Event::Done {
            total_tokens,
            generated_text,
            ..
        } => {
            assert_eq!(*total_tokens, 1);
            assert_eq!(generated_text, "foo bar");
        }
        other => panic!("expected Done, got {other:?}"),
    }
}
