//! A deterministic, pure-Rust reference draft backend.
//!
//! This is not a production language model: it exists so the
//! speculator, sampler, and transport can be exercised end to end, unit
//! tested, and demoed without a GPU or a multi-gigabyte weight file. It
//! implements [`DraftCollaborator`] over a small built-in word-level
//! vocabulary and a bigram table seeded from a short fixed corpus at
//! construction time, which gives next-token proposals some texture
//! instead of pure noise.
//!
//! Out-of-vocabulary words hash into the existing vocabulary space, so
//! `decode` is not guaranteed to losslessly reproduce arbitrary input
//! text — acceptable for a stand-in whose job is to exercise the
//! pipeline, not to generate real language.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::template::{apply_chat_template, TemplateType};
use super::{DraftCollaborator, DraftToken};
use crate::sampler::entropy_of;
use crate::utils::error::Result;

const SEED_CORPUS: &str = "\
the quick brown fox jumps over the lazy dog . \
the model generates the next token given the previous context . \
speculative decoding accelerates generation by drafting tokens ahead of time . \
the target model verifies the draft tokens in a single batch call . \
acceptance depends on the ratio between target and draft probabilities .";

pub struct NgramDraftModel {
    vocab: Vec<String>,
    word_to_id: HashMap<String, u32>,
    bigram: HashMap<u32, Vec<(u32, f32)>>,
    template: TemplateType,
}

impl NgramDraftModel {
    pub fn new(model_name: &str) -> Self {
        let mut vocab = Vec::new();
        let mut word_to_id = HashMap::new();
        let intern =
            |word: &str, vocab: &mut Vec<String>, word_to_id: &mut HashMap<String, u32>| -> u32 {
                if let Some(id) = word_to_id.get(word) {
                    return *id;
                }
                let id = vocab.len() as u32;
                vocab.push(word.to_string());
                word_to_id.insert(word.to_string(), id);
                id
            };

        let words: Vec<&str> = SEED_CORPUS.split_whitespace().collect();
        let mut counts: HashMap<u32, HashMap<u32, f32>> = HashMap::new();
        let mut prev: Option<u32> = None;
        for word in &words {
            let id = intern(word, &mut vocab, &mut word_to_id);
            if let Some(p) = prev {
                *counts.entry(p).or_default().entry(id).or_insert(0.0) += 1.0;
            }
            prev = Some(id);
        }

        let bigram = counts
            .into_iter()
            .map(|(id, next_counts)| (id, next_counts.into_iter().collect::<Vec<_>>()))
            .collect();

        Self {
            vocab,
            word_to_id,
            bigram,
            template: TemplateType::from_model_name(model_name),
        }
    }

    fn word_to_token_id(&self, word: &str) -> u32 {
        if let Some(id) = self.word_to_id.get(word) {
            return *id;
        }
        let mut hasher = DefaultHasher::new();
        word.hash(&mut hasher);
        (hasher.finish() % self.vocab.len() as u64) as u32
    }

    fn token_text(&self, id: u32) -> &str {
        let idx = id as usize % self.vocab.len();
        &self.vocab[idx]
    }
}

#[async_trait]
impl DraftCollaborator for NgramDraftModel {
    fn render_prompt(&self, prompt: &str) -> String {
        apply_chat_template(prompt, self.template)
    }

    async fn generate(
        &self,
        context_ids: &[u32],
        k: usize,
        temperature: f32,
    ) -> Result<Vec<DraftToken>> {
        // Real backends perform GPU/CPU-bound work here and must
        // off-load it with `spawn_blocking`; this reference backend's
        // work is cheap but follows the same pattern so the runtime
        // behaviour matches what a real backend would exhibit.
        let vocab_len = self.vocab.len();
        let bigram = self.bigram.clone();
        let context_ids = context_ids.to_vec();

        let tokens = tokio::task::spawn_blocking(move || {
            let seed = context_ids.iter().fold(0xabcdu64, |acc, id| {
                acc.wrapping_mul(31).wrapping_add(*id as u64)
            });
            let mut rng = SmallRng::seed_from_u64(seed);

            let mut last_id = context_ids.last().copied().unwrap_or(0) % vocab_len as u32;
            let mut out = Vec::with_capacity(k);

            for _ in 0..k {
                let candidates = if let Some(next) = bigram.get(&last_id).filter(|c| !c.is_empty())
                {
                    let total: f32 = next.iter().map(|(_, w)| w).sum();
                    next.iter()
                        .map(|(id, w)| (*id, w / total))
                        .collect::<Vec<_>>()
                } else {
                    let n = vocab_len as f32;
                    (0..vocab_len as u32).map(|id| (id, 1.0 / n)).collect()
                };

                let chosen_idx = if temperature <= 0.0 {
                    candidates
                        .iter()
                        .enumerate()
                        .max_by(|(_, a), (_, b)| a.1.partial_cmp(&b.1).unwrap())
                        .map(|(i, _)| i)
                        .unwrap_or(0)
                } else {
                    let u: f32 = rng.gen();
                    let mut acc = 0.0;
                    let mut idx = candidates.len() - 1;
                    for (i, (_, p)) in candidates.iter().enumerate() {
                        acc += p;
                        if u < acc {
                            idx = i;
                            break;
                        }
                    }
                    idx
                };

                let (id, prob) = candidates[chosen_idx];
                let logprob = prob.max(1e-9).ln();
                let logprobs: Vec<f32> = candidates.iter().map(|(_, p)| p.max(1e-9).ln()).collect();
                let entropy = entropy_of(&logprobs);

                let mut ranked: Vec<(u32, f32)> = candidates.clone();
                ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
                out.push((id, logprob, entropy, ranked));

                last_id = id;
            }
            out
        })
        .await
        .map_err(|e| crate::utils::error::SpecError::DraftFailure(e.to_string()))?;

        Ok(tokens
            .into_iter()
            .map(|(id, logprob, entropy, ranked)| {
                let vocab_len = self.vocab.len();
                DraftToken {
                    id,
                    text: self.token_text(id).to_string(),
                    logprob,
                    entropy,
                    top_k: ranked
                        .into_iter()
                        .take(10)
                        .map(|(id, p)| {
                            (
                                self.vocab[id as usize % vocab_len].clone(),
                                p.max(1e-9).ln(),
                            )
                        })
                        .collect(),
                }
            })
            .collect())
    }

    fn tokenise(&self, text: &str) -> Vec<u32> {
        text.split_whitespace()
            .flat_map(|word| {
                let trimmed = word.trim_matches(|c: char| c.is_ascii_punctuation());
                let mut ids = Vec::new();
                if !trimmed.is_empty() {
                    ids.push(self.word_to_token_id(&trimmed.to_lowercase()));
                }
                for c in word.chars().filter(|c| c.is_ascii_punctuation()) {
                    ids.push(self.word_to_token_id(&c.to_string()));
                }
                ids
            })
            .collect()
    }

    fn decode(&self, ids: &[u32]) -> String {
        let mut out = String::new();
        for id in ids {
            let text = self.token_text(*id);
            if !out.is_empty() && !matches!(text, "." | "," | "!" | "?" | ":" | ";") {
                out.push(' ');
            }
            out.push_str(text);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn generates_requested_number_of_tokens() {
        let model = NgramDraftModel::new("reference-ngram");
        let ctx = model.apply_chat_template("the quick");
        let tokens = model.generate(&ctx, 4, 0.0).await.unwrap();
        assert_eq!(tokens.len(), 4);
        for t in &tokens {
            assert!(!t.top_k.is_empty());
            assert!(t.entropy >= 0.0);
        }
    }

    #[tokio::test]
    async fn greedy_generation_is_deterministic() {
        let model = NgramDraftModel::new("reference-ngram");
        let ctx = model.apply_chat_template("speculative decoding");
        let a = model.generate(&ctx, 3, 0.0).await.unwrap();
        let b = model.generate(&ctx, 3, 0.0).await.unwrap();
        let a_ids: Vec<u32> = a.iter().map(|t| t.id).collect();
        let b_ids: Vec<u32> = b.iter().map(|t| t.id).collect();
        assert_eq!(a_ids, b_ids);
    }

    #[test]
    fn decode_round_trips_known_vocabulary() {
        let model = NgramDraftModel::new("reference-ngram");
        let ids = model.tokenise("the quick brown fox");
        let text = model.decode(&ids);
        assert_eq!(text, "the quick brown fox");
    }
}
