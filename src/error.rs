//! Error types for card generation.

/// Longest upstream text embedded in an error message.
const MAX_ERROR_MESSAGE: usize = 300;

/// Local validation failures, caught before any network activity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The subject name is empty after trimming.
    #[error("Please provide a name and an image.")]
    EmptyName,

    /// No photo has been selected.
    #[error("Please provide a name and an image.")]
    MissingImage,

    /// The photo exceeds the upload cap.
    #[error("File size exceeds 4MB. Please choose a smaller image.")]
    ImageTooLarge {
        /// Size of the rejected file in bytes.
        size: usize,
    },

    /// The photo is not a PNG, JPEG or WebP image.
    #[error("Unsupported image type: {0}. Please choose a PNG, JPEG or WebP image.")]
    UnsupportedFormat(String),
}

/// Errors that can occur while generating a card.
#[derive(Debug, thiserror::Error)]
pub enum CardGenError {
    /// Input rejected before any request was made.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The API answered but produced no image content.
    #[error("Failed to generate card: API did not return an image. It might have been blocked due to safety policies.{}", reason_suffix(.reason))]
    NoImageReturned {
        /// Block or finish reason reported by the API, if any.
        reason: Option<String>,
    },

    /// Transport or API-level failure.
    #[error("Failed to generate card: {message}")]
    Upstream {
        /// HTTP status, when the API responded at all.
        status: Option<u16>,
        /// Upstream message.
        message: String,
    },

    /// Missing or invalid configuration (fatal at startup).
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error (e.g., reading a photo or saving a card).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn reason_suffix(reason: &Option<String>) -> String {
    match reason {
        Some(r) => format!(" (reason: {r})"),
        None => String::new(),
    }
}

impl CardGenError {
    /// Returns true if this error was raised locally, before any request.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns the HTTP status of an upstream failure, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for CardGenError {
    fn from(err: reqwest::Error) -> Self {
        Self::Upstream {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CardGenError {
    fn from(err: serde_json::Error) -> Self {
        Self::Upstream {
            status: None,
            message: format!("malformed response: {err}"),
        }
    }
}

/// Cleans upstream text before it reaches a user-facing message.
///
/// Collapses whitespace, redacts API keys (`key=...` and `AIza...` tokens)
/// and truncates to a bounded length.
pub(crate) fn sanitize_error_message(text: &str) -> String {
    let redacted = text
        .split_whitespace()
        .map(redact_word)
        .collect::<Vec<_>>()
        .join(" ");

    match redacted.char_indices().nth(MAX_ERROR_MESSAGE) {
        Some((idx, _)) => format!("{}...", &redacted[..idx]),
        None => redacted,
    }
}

fn redact_word(word: &str) -> String {
    if let Some(idx) = word.find("key=") {
        return format!("{}key=[REDACTED]", &word[..idx]);
    }
    if let Some(idx) = word.find("AIza") {
        return format!("{}[REDACTED]", &word[..idx]);
    }
    word.to_string()
}

/// Result type alias for card generation operations.
pub type Result<T> = std::result::Result<T, CardGenError>;
