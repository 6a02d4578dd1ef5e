use crate::bank::FeedbackBank;
use crate::evaluate::{evaluate, Evaluation};
use crate::roster::StudentRow;
use serde::Serialize;

const RESPONSE_PREFIX: &str = "R=";
const NOT_ATTEMPTED: [&str; 2] = [".", "-"];

/// Free-text header fields shown on every report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportMeta {
    pub course_title: Option<String>,
    pub info: Option<String>,
}

impl ReportMeta {
    pub fn new(course_title: Option<&str>, info: Option<&str>) -> Self {
        ReportMeta {
            course_title: non_empty(course_title),
            info: non_empty(info),
        }
    }
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    NotAttempted,
    NoFeedback,
    /// Token longer than one character; nothing sensible to look up.
    Unreadable,
    Answered { key: String, evaluation: Evaluation },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionBlock {
    pub ordinal: usize,
    pub token: String,
    pub outcome: Outcome,
}

impl QuestionBlock {
    fn push_lines(&self, out: &mut Vec<String>) {
        let n = self.ordinal;
        match &self.outcome {
            Outcome::NotAttempted => out.push(format!("Question {n}: Not attempted.")),
            Outcome::NoFeedback => {
                out.push(format!("Question {n}: No feedback in reference file."))
            }
            Outcome::Unreadable => {
                out.push(format!("Question {n}: Unreadable response \"{}\".", self.token))
            }
            Outcome::Answered { evaluation, .. } => {
                out.push(format!("Question {n}:"));
                out.push(format!("  - Your Answer: {}", self.token.to_uppercase()));
                if !evaluation.is_correct() {
                    out.push(format!(
                        "  - Correct Answer: {}",
                        evaluation.correct_choice.to_uppercase()
                    ));
                }
                out.push(format!("  - Feedback: {}", evaluation.justification));
            }
        }
        out.push(String::new());
    }
}

/// Tally of question outcomes, used in batch summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeCounts {
    pub correct: usize,
    pub incorrect: usize,
    pub not_attempted: usize,
    pub no_feedback: usize,
    pub unreadable: usize,
}

impl OutcomeCounts {
    pub fn total(&self) -> usize {
        self.correct + self.incorrect + self.not_attempted + self.no_feedback + self.unreadable
    }

    pub fn add(&mut self, other: &OutcomeCounts) {
        self.correct += other.correct;
        self.incorrect += other.incorrect;
        self.not_attempted += other.not_attempted;
        self.no_feedback += other.no_feedback;
        self.unreadable += other.unreadable;
    }
}

/// One student's finished feedback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    student_id: String,
    header: Vec<String>,
    questions: Vec<QuestionBlock>,
}

impl Report {
    pub fn student_id(&self) -> &str {
        &self.student_id
    }

    pub fn questions(&self) -> &[QuestionBlock] {
        &self.questions
    }

    pub fn lines(&self) -> Vec<String> {
        let mut out = self.header.clone();
        out.push(String::new());
        for q in &self.questions {
            q.push_lines(&mut out);
        }
        out
    }

    pub fn text(&self) -> String {
        self.lines().join("\n")
    }

    pub fn counts(&self) -> OutcomeCounts {
        let mut c = OutcomeCounts::default();
        for q in &self.questions {
            match &q.outcome {
                Outcome::NotAttempted => c.not_attempted += 1,
                Outcome::NoFeedback => c.no_feedback += 1,
                Outcome::Unreadable => c.unreadable += 1,
                Outcome::Answered { evaluation, .. } if evaluation.is_correct() => c.correct += 1,
                Outcome::Answered { .. } => c.incorrect += 1,
            }
        }
        c
    }
}

/// Splits a scored-response field into per-question tokens.
///
/// A leading `R=` is dropped. Whitespace-separated input is split on
/// whitespace; compact input (`"ab.c"`) yields one token per character.
pub fn answer_tokens(raw: &str) -> Vec<String> {
    let s = raw.trim();
    let s = s.strip_prefix(RESPONSE_PREFIX).unwrap_or(s).trim();
    if s.chars().any(char::is_whitespace) {
        s.split_whitespace().map(str::to_string).collect()
    } else {
        s.chars().map(String::from).collect()
    }
}

fn question_block(ordinal: usize, token: String, bank: &FeedbackBank) -> QuestionBlock {
    let outcome = if NOT_ATTEMPTED.contains(&token.as_str()) {
        Outcome::NotAttempted
    } else {
        match bank.lookup(ordinal) {
            None => Outcome::NoFeedback,
            Some(_) if token.chars().count() > 1 => Outcome::Unreadable,
            Some((key, entry)) => Outcome::Answered {
                key: key.to_string(),
                evaluation: evaluate(&token, entry),
            },
        }
    };
    QuestionBlock {
        ordinal,
        token,
        outcome,
    }
}

/// Builds one report from a roster row and the shared feedback bank.
pub fn build_report(student: &StudentRow, bank: &FeedbackBank, meta: &ReportMeta) -> Report {
    let mut header = vec![format!(
        "Feedback for {} (ID: {})",
        student.full_name(),
        student.student_id
    )];
    if let Some(course) = &meta.course_title {
        header.push(format!("Course: {course}"));
    }
    if let Some(info) = &meta.info {
        header.push(format!("Info: {info}"));
    }

    let questions = answer_tokens(&student.responses)
        .into_iter()
        .enumerate()
        .map(|(i, token)| question_block(i + 1, token, bank))
        .collect();

    Report {
        student_id: student.student_id.clone(),
        header,
        questions,
    }
}
