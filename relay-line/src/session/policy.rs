//! History retention and input length rules.

use crate::message::Turn;
use relay_common::config::SessionConfig;
use relay_common::Error;

/// Limits applied to every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryPolicy {
    /// Conversation turns kept (each turn is a user + assistant pair)
    pub max_turns: usize,
    /// Maximum characters in one user message
    pub max_input_length: usize,
}

impl Default for HistoryPolicy {
    fn default() -> Self {
        Self {
            max_turns: 10,
            max_input_length: 500,
        }
    }
}

impl From<&SessionConfig> for HistoryPolicy {
    fn from(config: &SessionConfig) -> Self {
        Self {
            max_turns: config.max_turns,
            max_input_length: config.max_input_length,
        }
    }
}

impl HistoryPolicy {
    pub fn new(max_turns: usize, max_input_length: usize) -> Self {
        Self {
            max_turns,
            max_input_length,
        }
    }

    /// Maximum number of stored messages.
    pub const fn max_history_len(&self) -> usize {
        self.max_turns * 2
    }

    /// Keep only the most recent `max_history_len()` entries.
    pub fn enforce(&self, mut history: Vec<Turn>) -> Vec<Turn> {
        self.enforce_in_place(&mut history);
        history
    }

    /// In-place variant of [`HistoryPolicy::enforce`].
    pub fn enforce_in_place(&self, history: &mut Vec<Turn>) {
        let max = self.max_history_len();
        if history.len() > max {
            history.drain(..history.len() - max);
        }
    }

    /// Reject input longer than `max_input_length` characters.
    pub fn validate(&self, text: &str) -> Result<(), Error> {
        let len = text.chars().count();
        if len > self.max_input_length {
            return Err(Error::InputTooLong {
                len,
                max: self.max_input_length,
            });
        }
        Ok(())
    }

    /// Reply sent instead of a completion when input is rejected.
    pub fn refusal_message(&self) -> String {
        format!(
            "ごめんなさい、メッセージは{}文字以内で送ってください。",
            self.max_input_length
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn conversation(pairs: usize) -> Vec<Turn> {
        (0..pairs)
            .flat_map(|i| [Turn::user(format!("q{i}")), Turn::assistant(format!("a{i}"))])
            .collect()
    }

    #[test]
    fn test_enforce_drops_oldest_pair() {
        let policy = HistoryPolicy::default();
        let history = conversation(11);
        assert_eq!(history.len(), 22);

        let trimmed = policy.enforce(history.clone());
        assert_eq!(trimmed.len(), 20);
        assert_eq!(trimmed[0], Turn::user("q1"));
        assert_eq!(trimmed[19], Turn::assistant("a10"));
        assert_eq!(trimmed[..], history[2..]);
    }

    #[test]
    fn test_enforce_keeps_short_history() {
        let policy = HistoryPolicy::default();
        let history = conversation(3);
        assert_eq!(policy.enforce(history.clone()), history);
        assert!(policy.enforce(Vec::new()).is_empty());
    }

    #[test]
    fn test_enforce_at_exact_limit() {
        let policy = HistoryPolicy::new(2, 500);
        let history = conversation(2);
        assert_eq!(policy.enforce(history.clone()), history);
    }

    #[test]
    fn test_validate_boundary() {
        let policy = HistoryPolicy::default();
        assert!(policy.validate(&"a".repeat(500)).is_ok());
        assert!(matches!(
            policy.validate(&"a".repeat(501)),
            Err(Error::InputTooLong { len: 501, max: 500 })
        ));
    }

    #[test]
    fn test_validate_counts_characters_not_bytes() {
        let policy = HistoryPolicy::default();
        // 500 Japanese characters are 1500 bytes
        assert!(policy.validate(&"あ".repeat(500)).is_ok());
        assert!(policy.validate(&"あ".repeat(501)).is_err());
    }

    #[test]
    fn test_refusal_message_mentions_limit() {
        let policy = HistoryPolicy::new(10, 120);
        assert_eq!(
            policy.refusal_message(),
            "ごめんなさい、メッセージは120文字以内で送ってください。"
        );
    }

    #[test]
    fn test_from_session_config() {
        let config = SessionConfig {
            max_turns: 4,
            max_input_length: 50,
            idle_ttl_secs: None,
        };
        let policy = HistoryPolicy::from(&config);
        assert_eq!(policy.max_history_len(), 8);
        assert_eq!(policy.max_input_length, 50);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn enforce_keeps_bounded_suffix(
            max_turns in 1usize..15,
            contents in proptest::collection::vec("[a-z]{0,8}", 0..60)
        ) {
            let policy = HistoryPolicy::new(max_turns, 500);
            let history: Vec<Turn> = contents
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    if i % 2 == 0 {
                        Turn::user(c.as_str())
                    } else {
                        Turn::assistant(c.as_str())
                    }
                })
                .collect();

            let trimmed = policy.enforce(history.clone());
            prop_assert!(trimmed.len() <= max_turns * 2);
            prop_assert_eq!(trimmed.len(), history.len().min(max_turns * 2));
            prop_assert_eq!(&trimmed[..], &history[history.len() - trimmed.len()..]);
        }

        #[test]
        fn validate_matches_char_count(text in "\\PC{0,700}") {
            let policy = HistoryPolicy::default();
            prop_assert_eq!(policy.validate(&text).is_ok(), text.chars().count() <= 500);
        }
    }
}
