//! Triplet (order-2) Markov chain over whitespace tokens
//!
//! Every line of learned text is a sentence. Sentences are bracketed with
//! begin/end sentinels and each consecutive token triple increments the key
//! `"t1 t2 t3"`. Generation walks the triples weighted by count.

use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

use super::{ChainModel, ChainState};

/// Sentence start sentinel
const BEGIN: &str = "\u{2}";
/// Sentence end sentinel
const END: &str = "\u{3}";
/// Upper bound on tokens per generated sentence
const MAX_SENTENCE_TOKENS: usize = 64;

/// Default chain model
pub struct TripletChain {
    triplets: ChainState,
    rng: StdRng,
}

impl TripletChain {
    pub fn new() -> Self {
        Self {
            triplets: ChainState::new(),
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic chain for reproducible generation
    pub fn with_seed(seed: u64) -> Self {
        Self {
            triplets: ChainState::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn len(&self) -> usize {
        self.triplets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triplets.is_empty()
    }

    fn learn_sentence(&mut self, sentence: &str) {
        let words: Vec<&str> = sentence.split_whitespace().collect();
        if words.is_empty() {
            return;
        }

        let mut tokens = Vec::with_capacity(words.len() + 3);
        tokens.push(BEGIN);
        tokens.push(BEGIN);
        tokens.extend(words);
        tokens.push(END);

        for window in tokens.windows(3) {
            let count = self.triplets.entry(window.join(" ")).or_insert(0);
            *count = count.saturating_add(1);
        }
    }

    /// Prefix index: (t1, t2) -> [(t3, count)]
    fn index(&self) -> HashMap<(&str, &str), Vec<(&str, u64)>> {
        let mut index: HashMap<(&str, &str), Vec<(&str, u64)>> = HashMap::new();
        for (key, &count) in &self.triplets {
            let mut parts = key.split(' ');
            if let (Some(a), Some(b), Some(c), None) =
                (parts.next(), parts.next(), parts.next(), parts.next())
            {
                index.entry((a, b)).or_default().push((c, count));
            }
        }
        index
    }
}

impl Default for TripletChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Pick a follower weighted by count
fn pick<'a, R: Rng>(rng: &mut R, candidates: &[(&'a str, u64)]) -> Option<&'a str> {
    let total = candidates.iter().fold(0u64, |sum, (_, c)| sum.saturating_add(*c));
    if total == 0 {
        return None;
    }
    let mut roll = rng.random_range(0..total);
    for (token, count) in candidates {
        if roll < *count {
            return Some(*token);
        }
        roll -= count;
    }
    None
}

impl ChainModel for TripletChain {
    fn learn(&mut self, text: &str) {
        // Sentinels must never come from user text
        let cleaned: String = text
            .chars()
            .filter(|c| *c != '\u{2}' && *c != '\u{3}')
            .collect();
        for line in cleaned.lines() {
            self.learn_sentence(line);
        }
    }

    fn generate(&mut self, sentences: usize) -> Result<Vec<String>> {
        if self.triplets.is_empty() {
            bail!("chain is empty");
        }

        let mut out = Vec::with_capacity(sentences);
        let mut rng = self.rng.clone();
        {
            let index = self.index();
            if !index.contains_key(&(BEGIN, BEGIN)) {
                bail!("chain has no sentence starts");
            }

            for _ in 0..sentences {
                let mut prefix = (BEGIN, BEGIN);
                let mut words = Vec::new();
                while words.len() < MAX_SENTENCE_TOKENS {
                    let Some(next) = index.get(&prefix).and_then(|c| pick(&mut rng, c)) else {
                        break;
                    };
                    if next == END {
                        break;
                    }
                    words.push(next);
                    prefix = (prefix.1, next);
                }
                out.push(words.join(" "));
            }
        }
        self.rng = rng;
        Ok(out)
    }

    fn export_state(&self) -> ChainState {
        self.triplets.clone()
    }

    fn import_state(&mut self, state: ChainState) {
        self.triplets = state;
    }

    fn remove_matching(&mut self, morphemes: &[String]) -> usize {
        if morphemes.is_empty() {
            return 0;
        }
        let before = self.triplets.len();
        self.triplets
            .retain(|key, _| !key.split(' ').any(|token| morphemes.iter().any(|m| m == token)));
        before - self.triplets.len()
    }
}
