//! Error types for butterfly-map
//!
//! Every public operation of the controller returns these errors; the host
//! surfaces turn them into log diagnostics instead of propagating them.

use std::fmt;

use log::error;
use strsim::normalized_levenshtein;

/// Minimum similarity for a container id to be offered as a suggestion
const SUGGESTION_THRESHOLD: f64 = 0.6;

/// Suggest the closest known container id for a mistyped one
pub fn suggest_container<S: AsRef<str>>(container_id: &str, known: &[S]) -> Option<String> {
    let wanted = container_id.to_lowercase();
    let mut best: Option<(f64, &str)> = None;

    for candidate in known {
        let candidate = candidate.as_ref();
        if candidate.eq_ignore_ascii_case(container_id) {
            // Only the case differs; that is the answer
            return Some(candidate.to_string());
        }

        let score = normalized_levenshtein(&wanted, &candidate.to_lowercase());
        if score >= SUGGESTION_THRESHOLD && best.map_or(true, |(s, _)| score > s) {
            best = Some((score, candidate));
        }
    }

    best.map(|(_, candidate)| candidate.to_string())
}

/// Main error type for butterfly-map operations
#[derive(Debug)]
pub enum Error {
    /// Target rendering surface does not exist
    ContainerNotFound {
        container_id: String,
        suggestion: Option<String>,
    },

    /// The mapping engine failed to construct something or reported a runtime error
    MapEngine(String),

    /// A mutating operation needs a loaded map and there is none
    MapNotInitialized,

    /// Merchant input could not be parsed or holds invalid records
    MalformedInput(String),

    /// Invalid center, zoom or other parameter
    InvalidInput(String),

    /// The async driver owning the controller is gone
    DriverStopped,

    /// File I/O error
    IoError(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ContainerNotFound {
                container_id,
                suggestion,
            } => {
                write!(f, "Container not found: '{container_id}'")?;
                if let Some(suggestion) = suggestion {
                    write!(f, " (did you mean '{suggestion}'?)")?;
                }
                Ok(())
            }
            Error::MapEngine(msg) => write!(f, "Map engine error: {msg}"),
            Error::MapNotInitialized => write!(f, "Map not initialized yet"),
            Error::MalformedInput(msg) => write!(f, "Malformed merchant input: {msg}"),
            Error::InvalidInput(msg) => write!(f, "Invalid input: {msg}"),
            Error::DriverStopped => write!(f, "Map driver is no longer running"),
            Error::IoError(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::MalformedInput(err.to_string())
    }
}

/// Convenience result type for butterfly-map operations
pub type Result<T> = std::result::Result<T, Error>;

/// Log a failed operation and swallow it
///
/// Host-facing entry points call this so a broken map never takes the host down.
pub fn report<T>(operation: &str, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            error!("Error in {operation}: {e}");
            None
        }
    }
}
