//! Chain model abstraction
//!
//! The speaking module treats the statistical text generator as an opaque
//! capability: it can learn from text, generate sentences, and export or
//! import its whole state as a mapping of n-gram keys to counts.

pub mod triplet;

use anyhow::Result;
use std::collections::BTreeMap;

pub use triplet::TripletChain;

/// Entire learned state of a chain: n-gram key -> occurrence count
pub type ChainState = BTreeMap<String, u64>;

/// Incremental learner/generator over token sequences
#[cfg_attr(test, mockall::automock)]
pub trait ChainModel: Send {
    /// Learn from a piece of text
    fn learn(&mut self, text: &str);

    /// Generate `sentences` sentences
    fn generate(&mut self, sentences: usize) -> Result<Vec<String>>;

    /// Snapshot the whole state
    fn export_state(&self) -> ChainState;

    /// Replace the whole state
    fn import_state(&mut self, state: ChainState);

    /// Remove every entry containing one of the given morphemes.
    /// Returns the number of removed entries.
    fn remove_matching(&mut self, morphemes: &[String]) -> usize;
}

/// Serialize a state as the JSON object stored on disk
pub fn state_to_json(state: &ChainState) -> serde_json::Result<String> {
    serde_json::to_string(state)
}

/// Parse the JSON object stored on disk
pub fn state_from_json(json: &str) -> serde_json::Result<ChainState> {
    serde_json::from_str(json)
}

/// Multiply every count by `rate`, flooring, and drop entries that reach zero
pub fn attenuate(state: &ChainState, rate: f64) -> ChainState {
    state
        .iter()
        .filter_map(|(key, &count)| {
            let decayed = (count as f64 * rate).floor();
            if decayed > 0.0 {
                Some((key.clone(), decayed as u64))
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attenuate_drops_zeroed_entries() {
        let mut state = ChainState::new();
        state.insert("a b c".to_string(), 10);
        state.insert("d e f".to_string(), 1);

        let decayed = attenuate(&state, 0.5);
        assert_eq!(decayed.len(), 1);
        assert_eq!(decayed.get("a b c"), Some(&5));
        assert!(!decayed.contains_key("d e f"));
    }

    #[test]
    fn test_attenuate_floors() {
        let mut state = ChainState::new();
        state.insert("x y z".to_string(), 7);
        state.insert("p q r".to_string(), 3);

        let decayed = attenuate(&state, 0.3);
        assert_eq!(decayed.get("x y z"), Some(&2)); // floor(2.1)
        assert!(!decayed.contains_key("p q r")); // floor(0.9)
    }

    #[test]
    fn test_attenuate_zero_rate_empties() {
        let mut state = ChainState::new();
        state.insert("a b c".to_string(), 1000);
        assert!(attenuate(&state, 0.0).is_empty());
    }

    #[test]
    fn test_state_json_round_trip() {
        let mut state = ChainState::new();
        state.insert("a b c".to_string(), 10);
        state.insert("\u{2} hello world".to_string(), 3);

        let json = state_to_json(&state).unwrap();
        assert_eq!(state_from_json(&json).unwrap(), state);
    }

    #[test]
    fn test_negative_counts_are_rejected() {
        assert!(state_from_json(r#"{"a b c": -1}"#).is_err());
        assert!(state_from_json("not json").is_err());
    }
}
