use crate::bank::FeedbackEntry;

pub const NO_JUSTIFICATION: &str = "No justification available";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// Student's mark, trimmed and lowercased.
    pub student_choice: String,
    /// Answer key, lowercased.
    pub correct_choice: String,
    pub justification: String,
}

impl Evaluation {
    pub fn is_correct(&self) -> bool {
        self.student_choice == self.correct_choice
    }
}

/// Zero-based option offset: `a` is 0, `b` is 1, ...
///
/// Anything other than a single ASCII letter has no offset.
pub fn option_offset(choice: &str) -> Option<usize> {
    let mut chars = choice.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_lowercase() => Some((c as u8 - b'a') as usize),
        _ => None,
    }
}

/// Resolves one raw answer against its feedback entry.
///
/// Justifications are picked purely by position; the pair's own label is not
/// checked against the letter.
pub fn evaluate(answer: &str, entry: &FeedbackEntry) -> Evaluation {
    let student_choice = answer.trim().to_lowercase();
    let correct_choice = entry.correct_choice_id.trim().to_lowercase();
    let justification = option_offset(&student_choice)
        .and_then(|i| entry.justifications.get(i))
        .map(|(_, text)| text.clone())
        .unwrap_or_else(|| NO_JUSTIFICATION.to_string());

    Evaluation {
        student_choice,
        correct_choice,
        justification,
    }
}
