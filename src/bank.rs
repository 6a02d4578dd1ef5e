use crate::error::{FeedbackError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Reference feedback for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    #[serde(rename = "correct_choice_ID")]
    pub correct_choice_id: String,
    /// `[label, text]` pairs; position 0 is option `a`, 1 is `b`, ...
    #[serde(rename = "Q_justifications")]
    pub justifications: Vec<(String, String)>,
}

/// Read-only feedback definition shared by every report in a run.
///
/// Keys iterate lexicographically, so key resolution never depends on the
/// order the definition file happened to list them in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedbackBank {
    entries: BTreeMap<String, FeedbackEntry>,
}

impl FeedbackBank {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| FeedbackError::format(format!("feedback definition is not JSON: {e}")))?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let Some(obj) = value.as_object() else {
            return Err(FeedbackError::format(
                "feedback definition must be a JSON object keyed by question",
            ));
        };
        let mut entries = BTreeMap::new();
        for (key, raw) in obj {
            let entry = FeedbackEntry::deserialize(raw).map_err(|e| {
                FeedbackError::format(format!("feedback entry '{key}': {e}"))
            })?;
            entries.insert(key.clone(), entry);
        }
        Ok(FeedbackBank { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Every key that claims the 1-based question `ordinal`, in lookup order.
    pub fn candidates(&self, ordinal: usize) -> Vec<&str> {
        let prefix = format!("Q{ordinal}_");
        let infix = format!("_q_{ordinal}");
        self.entries
            .keys()
            .filter(|k| k.starts_with(&prefix) || k.contains(&infix))
            .map(|k| k.as_str())
            .collect()
    }

    /// First key matching `Q{n}_*` or containing `_q_{n}`.
    ///
    /// Note `_q_1` is a plain substring test, so it also matches `_q_12`.
    pub fn resolve_key(&self, ordinal: usize) -> Option<&str> {
        let candidates = self.candidates(ordinal);
        if candidates.len() > 1 {
            tracing::warn!(
                question = ordinal,
                chosen = candidates[0],
                ?candidates,
                "ambiguous feedback key"
            );
        }
        candidates.into_iter().next()
    }

    /// Resolves the question and returns its entry.
    pub fn lookup(&self, ordinal: usize) -> Option<(&str, &FeedbackEntry)> {
        let key = self.resolve_key(ordinal)?;
        self.entries.get_key_value(key).map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(correct: &str) -> Value {
        json!({ "correct_choice_ID": correct, "Q_justifications": [["a", "A"], ["b", "B"]] })
    }

    #[test]
    fn resolves_prefix_and_infix_keys() {
        let bank = FeedbackBank::from_value(&json!({
            "Q1_intro": entry("a"),
            "quiz_q_2_units": entry("b"),
        }))
        .expect("bank");
        assert_eq!(bank.resolve_key(1), Some("Q1_intro"));
        assert_eq!(bank.resolve_key(2), Some("quiz_q_2_units"));
        assert_eq!(bank.resolve_key(3), None);
    }

    #[test]
    fn prefix_requires_underscore() {
        let bank = FeedbackBank::from_value(&json!({ "Q10_x": entry("a") })).expect("bank");
        assert_eq!(bank.resolve_key(1), None);
        assert_eq!(bank.resolve_key(10), Some("Q10_x"));
    }

    #[test]
    fn ambiguous_keys_resolve_lexicographically() {
        let bank = FeedbackBank::from_value(&json!({
            "Q3_zeta": entry("a"),
            "Q3_alpha": entry("b"),
            "set_q_3": entry("c"),
        }))
        .expect("bank");
        assert_eq!(bank.candidates(3), vec!["Q3_alpha", "Q3_zeta", "set_q_3"]);
        assert_eq!(bank.resolve_key(3), Some("Q3_alpha"));
        let (_, e) = bank.lookup(3).expect("lookup");
        assert_eq!(e.correct_choice_id, "b");
    }

    #[test]
    fn infix_is_a_substring_match() {
        let bank = FeedbackBank::from_value(&json!({ "set_q_12": entry("a") })).expect("bank");
        assert_eq!(bank.resolve_key(1), Some("set_q_12"));
    }

    #[test]
    fn malformed_entries_are_format_errors() {
        let e = FeedbackBank::from_value(&json!({ "Q1_x": { "correct_choice_ID": "a" } }))
            .unwrap_err();
        assert!(e.to_string().contains("Q1_x"), "{e}");

        let e = FeedbackBank::from_value(&json!({
            "Q1_x": { "correct_choice_ID": "a", "Q_justifications": [["a"]] }
        }))
        .unwrap_err();
        assert_eq!(e.code(), "format_error");

        assert!(FeedbackBank::from_json_str("[1,2]").is_err());
        assert!(FeedbackBank::from_json_str("{").is_err());
    }
}
