//! Custom error types for plurkdump.
//!
//! Every failure in the library is fatal for the current run. The variants
//! exist so the CLI can say *where* the run stopped and whether simply
//! running `plurkdump sync` again will pick up from the stored cursor.
//! Running out of data (an empty timeline page, a post without replies, a
//! store with nothing to chart) is never an error.

use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for plurkdump operations.
#[derive(Error, Debug)]
pub enum PlurkError {
    // =========================================================================
    // Authentication Errors
    // =========================================================================
    /// A required credential is not present in the environment.
    #[error("Missing credential: environment variable {var} is not set")]
    MissingCredential { var: &'static str },

    /// One step of the OAuth1 handshake was rejected or returned garbage.
    #[error("OAuth {stage} failed: {reason}")]
    AuthFailed { stage: &'static str, reason: String },

    // =========================================================================
    // Remote API Errors
    // =========================================================================
    /// The API answered with a non-success status.
    #[error("{endpoint} returned HTTP {status}: {body}")]
    Http {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// The request never produced a response (DNS, TLS, timeout, ...).
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The API response could not be decoded into the expected shape.
    #[error("Malformed response from {endpoint}: {reason}")]
    MalformedPayload { endpoint: String, reason: String },

    /// A `posted` value that is not an RFC-1123 style timestamp.
    #[error("Invalid timestamp '{value}' in {context}")]
    InvalidTimestamp { value: String, context: String },

    // =========================================================================
    // Database Errors
    // =========================================================================
    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    /// File read/write error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Path-specific IO error with context.
    #[error("Failed to {operation} '{path}': {source}")]
    PathError {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file parsing error.
    #[error("Invalid configuration in '{path}': {reason}")]
    ConfigError { path: PathBuf, reason: String },

    /// Environment variable error.
    #[error("Invalid environment variable {var}: {reason}")]
    EnvVarError { var: String, reason: String },

    // =========================================================================
    // Report Errors
    // =========================================================================
    /// Palette name not in the built-in color map table.
    #[error("Unknown palette '{name}'")]
    UnknownPalette { name: String },

    /// The plotting backend failed to draw or encode the image.
    #[error("Chart rendering failed: {0}")]
    ChartError(String),

    // =========================================================================
    // CLI Errors
    // =========================================================================
    /// Invalid command-line argument.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },
}

/// Result type alias for plurkdump operations.
pub type Result<T> = std::result::Result<T, PlurkError>;

impl PlurkError {
    /// Create an authentication failure for the given handshake stage.
    pub fn auth_failed(stage: &'static str, reason: impl Into<String>) -> Self {
        Self::AuthFailed {
            stage,
            reason: reason.into(),
        }
    }

    /// Create a malformed payload error.
    pub fn malformed(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedPayload {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid timestamp error.
    pub fn invalid_timestamp(value: impl Into<String>, context: impl Into<String>) -> Self {
        Self::InvalidTimestamp {
            value: value.into(),
            context: context.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create a chart error from any displayable backend error.
    pub fn chart(err: impl std::fmt::Display) -> Self {
        Self::ChartError(err.to_string())
    }

    /// Create a path error with context.
    pub fn path_error(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::PathError {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Whether re-running the sync continues where this run stopped.
    ///
    /// True for failures that happen while paging; everything already
    /// committed stays valid and the cursor is re-derived from the store.
    #[must_use]
    pub const fn is_resumable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::MalformedPayload { .. } | Self::InvalidTimestamp { .. } => {
                true
            }
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Get a suggestion for how to fix this error, if applicable.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::MissingCredential { .. } => Some(
                "Set CONSUMER_KEY and CONSUMER_SECRET in the environment or in a .env file.",
            ),
            Self::AuthFailed { .. } => {
                Some("Check the consumer credentials and copy the verifier code exactly.")
            }
            Self::Http { .. } | Self::Transport(_) => {
                Some("Run 'plurkdump sync' again; it resumes from the oldest stored plurk.")
            }
            Self::UnknownPalette { .. } => {
                Some("Run 'plurkdump report --help' to see the available palettes.")
            }
            Self::ConfigError { .. } => {
                Some("Run 'plurkdump config --init' to write a fresh default config.")
            }
            _ => None,
        }
    }
}

// =============================================================================
// CLI Error Formatting Utilities
// =============================================================================

use colored::Colorize;

/// Format a structured CLI error with explanation and suggestions.
#[must_use]
pub fn format_error(title: &str, explanation: &str, suggestions: &[&str]) -> String {
    use std::fmt::Write;

    let mut output = format!("{} {}", "✗".red().bold(), title.bold());

    if !explanation.is_empty() {
        let _ = write!(output, "\n\n   {explanation}");
    }

    if !suggestions.is_empty() {
        output.push_str("\n\n   ");
        if suggestions.len() == 1 {
            let _ = write!(output, "{} {}", "Hint:".cyan(), suggestions[0]);
        } else {
            let _ = write!(output, "{}:", "Try".cyan());
            for suggestion in suggestions {
                let _ = write!(output, "\n     {} {}", "•".dimmed(), suggestion);
            }
        }
    }

    output
}

/// Calculate the Levenshtein edit distance between two strings.
#[must_use]
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let b_len = b_chars.len();

    if a_chars.is_empty() {
        return b_len;
    }
    if b_len == 0 {
        return a_chars.len();
    }

    let mut prev_row: Vec<usize> = (0..=b_len).collect();
    let mut curr_row: Vec<usize> = vec![0; b_len + 1];

    for (i, a_char) in a_chars.iter().enumerate() {
        curr_row[0] = i + 1;

        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = usize::from(a_char != b_char);
            curr_row[j + 1] = (prev_row[j + 1] + 1)
                .min(curr_row[j] + 1)
                .min(prev_row[j] + cost);
        }

        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[b_len]
}

/// Find the closest candidate within `max_distance` edits (default 2).
///
/// Exact (case-insensitive) matches are not returned; callers handle those
/// before asking for a suggestion.
#[must_use]
pub fn find_closest_match<'a>(
    input: &str,
    candidates: &[&'a str],
    max_distance: Option<usize>,
) -> Option<&'a str> {
    let max_dist = max_distance.unwrap_or(2);
    let input_lower = input.to_lowercase();

    candidates
        .iter()
        .map(|&candidate| {
            let distance = levenshtein_distance(&input_lower, &candidate.to_lowercase());
            (candidate, distance)
        })
        .filter(|(_, distance)| *distance <= max_dist && *distance > 0)
        .min_by_key(|(_, distance)| *distance)
        .map(|(candidate, _)| candidate)
}

/// Format a "did you mean?" suggestion.
#[must_use]
pub fn format_did_you_mean(suggestion: &str) -> String {
    format!("Did you mean '{}'?", suggestion.green())
}

/// Format an error for an unknown value with "did you mean?" support.
pub fn format_unknown_value_error(kind: &str, input: &str, valid_options: &[&str]) -> String {
    let title = format!("Unknown {kind}: '{input}'");

    let mut suggestions = Vec::new();

    if let Some(closest) = find_closest_match(input, valid_options, None) {
        suggestions.push(format_did_you_mean(closest));
    }

    if valid_options.len() <= 12 {
        suggestions.push(format!("Valid {kind}s: {}", valid_options.join(", ")));
    }

    let suggestion_refs: Vec<&str> = suggestions.iter().map(String::as_str).collect();
    format_error(&title, "", &suggestion_refs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlurkError::Http {
            endpoint: "/APP/Timeline/getPlurks".to_string(),
            status: 503,
            body: "busy".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("/APP/Timeline/getPlurks"));
        assert!(message.contains("503"));
    }

    #[test]
    fn test_server_errors_are_resumable() {
        let server = PlurkError::Http {
            endpoint: "/APP/Responses/get".to_string(),
            status: 502,
            body: String::new(),
        };
        assert!(server.is_resumable());

        let denied = PlurkError::Http {
            endpoint: "/APP/Responses/get".to_string(),
            status: 401,
            body: String::new(),
        };
        assert!(!denied.is_resumable());
        assert!(!PlurkError::MissingCredential { var: "CONSUMER_KEY" }.is_resumable());
    }

    #[test]
    fn test_error_suggestions() {
        let err = PlurkError::MissingCredential { var: "CONSUMER_SECRET" };
        assert!(err.suggestion().unwrap().contains("CONSUMER_KEY"));
        assert!(PlurkError::chart("boom").suggestion().is_none());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PlurkError = io_err.into();
        assert!(matches!(err, PlurkError::IoError(_)));
    }

    #[test]
    fn test_from_rusqlite_error() {
        fn accepts_plurk_error(_: PlurkError) {}
        let sqlite_err = rusqlite::Error::InvalidQuery;
        accepts_plurk_error(sqlite_err.into());
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein_distance("tab20", "tab20"), 0);
        assert_eq!(levenshtein_distance("tab20", "tab10"), 1);
        assert_eq!(levenshtein_distance("", "set1"), 4);
        assert_eq!(levenshtein_distance("set1", ""), 4);
    }

    #[test]
    fn find_closest_match_typo() {
        let candidates = ["viridis", "plasma", "magma", "tab20"];
        assert_eq!(find_closest_match("virdis", &candidates, None), Some("viridis"));
        assert_eq!(find_closest_match("PLASMA", &candidates, None), None);
        assert_eq!(find_closest_match("xyzzy", &candidates, None), None);
    }

    #[test]
    fn format_unknown_value_with_suggestion() {
        let output = format_unknown_value_error("palette", "magam", &["magma", "plasma"]);
        assert!(output.contains("Unknown palette"));
        assert!(output.contains("magam"));
        assert!(output.contains("magma"));
    }
}
