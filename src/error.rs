use thiserror::Error;

/// Failures that abort a whole batch. Per-question anomalies never show up
/// here; they are rendered into the student's report instead.
#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("format error: {0}")]
    Format(String),

    #[error("duplicate student identifier {id} (rows {first_row} and {second_row})")]
    DuplicateIdentifier {
        id: String,
        first_row: usize,
        second_row: usize,
    },

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FeedbackError {
    pub fn format(message: impl Into<String>) -> Self {
        FeedbackError::Format(message.into())
    }

    /// Stable code used in IPC error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            FeedbackError::Format(_) => "format_error",
            FeedbackError::DuplicateIdentifier { .. } => "duplicate_identifier",
            FeedbackError::Archive(_) => "archive_failed",
            FeedbackError::Io(_) => "io_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, FeedbackError>;
