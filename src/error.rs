use std::{fmt, io, sync::mpsc::SendError};

use http::status::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;
use url::ParseError as UrlParseError;

#[cfg(feature = "service")]
use notify::{Error as NotifyError, ErrorKind as NotifyErrorKind};

use crate::event::Event;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum DegraphmalizerError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("Source document missing: {0}")]
    SourceMissing(String),
    #[error("Reduce of property '{property}' failed: {reason}")]
    ReduceFailure { property: String, reason: String },
    #[error("Delivery failed: {0}")]
    Delivery(String),
    #[error("Queue overflow: {0}")]
    QueueOverflow(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Task interrupted: {0}")]
    Interrupted(String),
    #[error("Task failed: {0}")]
    TaskFailed(String),
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },
    #[error("You do not have permission to access this resource")]
    PermissionDenied,
    #[error("Custom error: {0}")]
    Custom(String),
}

impl DegraphmalizerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DegraphmalizerError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DegraphmalizerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            DegraphmalizerError::NotFound(_) => StatusCode::NOT_FOUND,
            DegraphmalizerError::SourceMissing(_) => StatusCode::NOT_FOUND,
            DegraphmalizerError::ReduceFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            DegraphmalizerError::Delivery(_) => StatusCode::BAD_GATEWAY,
            DegraphmalizerError::QueueOverflow(_) => StatusCode::SERVICE_UNAVAILABLE,
            DegraphmalizerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DegraphmalizerError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DegraphmalizerError::Interrupted(_) => StatusCode::SERVICE_UNAVAILABLE,
            DegraphmalizerError::TaskFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DegraphmalizerError::InvalidStateTransition { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            DegraphmalizerError::PermissionDenied => StatusCode::FORBIDDEN,
            DegraphmalizerError::Custom(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True for the errors a retry may cure (transport and I/O trouble).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DegraphmalizerError::Delivery(_)
                | DegraphmalizerError::Io(_)
                | DegraphmalizerError::Interrupted(_)
        )
    }
}

impl From<toml::de::Error> for DegraphmalizerError {
    fn from(src: toml::de::Error) -> DegraphmalizerError {
        DegraphmalizerError::Configuration(format!("Toml deserialization error: {src}"))
    }
}

impl From<JsonError> for DegraphmalizerError {
    fn from(src: JsonError) -> DegraphmalizerError {
        DegraphmalizerError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<UrlParseError> for DegraphmalizerError {
    fn from(src: UrlParseError) -> DegraphmalizerError {
        DegraphmalizerError::Configuration(format!("Invalid URL: {src}"))
    }
}

impl From<io::Error> for DegraphmalizerError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => DegraphmalizerError::NotFound(format!("{x}")),
            io::ErrorKind::PermissionDenied => DegraphmalizerError::PermissionDenied,
            _ => DegraphmalizerError::Io(format!("IOError: {}: {x}", x.kind())),
        }
    }
}

impl From<fmt::Error> for DegraphmalizerError {
    fn from(x: fmt::Error) -> Self {
        DegraphmalizerError::Custom(format!("{x}"))
    }
}

impl From<reqwest::Error> for DegraphmalizerError {
    fn from(x: reqwest::Error) -> Self {
        if x.is_timeout() {
            DegraphmalizerError::Delivery(format!("request timed out: {x}"))
        } else {
            DegraphmalizerError::Delivery(format!("{x}"))
        }
    }
}

impl From<rayon::ThreadPoolBuildError> for DegraphmalizerError {
    fn from(x: rayon::ThreadPoolBuildError) -> Self {
        DegraphmalizerError::Configuration(format!("could not build worker pool: {x}"))
    }
}

impl From<SendError<Event>> for DegraphmalizerError {
    fn from(x: SendError<Event>) -> Self {
        DegraphmalizerError::Io(format!(
            "Channel update send Error, could not transmit event {:?}",
            x.0
        ))
    }
}

#[cfg(feature = "service")]
impl From<NotifyError> for DegraphmalizerError {
    fn from(notify_error: NotifyError) -> Self {
        match notify_error.kind {
            NotifyErrorKind::Generic(msg) => DegraphmalizerError::Custom(format!(
                "notify-debouncer: {}, paths: {:?}",
                msg, notify_error.paths
            )),
            NotifyErrorKind::Io(io_error) => DegraphmalizerError::Io(format!(
                "notify-debouncer: io error {}, paths: {:?}",
                io_error.kind(),
                notify_error.paths
            )),
            NotifyErrorKind::PathNotFound => DegraphmalizerError::NotFound(format!(
                "notify-debouncer: path(s) not found: {:?}",
                notify_error.paths
            )),
            NotifyErrorKind::WatchNotFound => DegraphmalizerError::NotFound(format!(
                "notify-debouncer: watch not found, paths: {:?}",
                notify_error.paths
            )),
            NotifyErrorKind::InvalidConfig(_) => {
                DegraphmalizerError::Custom("notify-debouncer invalid config".to_string())
            }
            NotifyErrorKind::MaxFilesWatch => DegraphmalizerError::Custom(
                "notify-debouncer max file watch limit reached".to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_by_kind() {
        let missing: DegraphmalizerError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(missing, DegraphmalizerError::NotFound(_)));
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);

        let denied: DegraphmalizerError =
            io::Error::new(io::ErrorKind::PermissionDenied, "nope").into();
        assert_eq!(denied, DegraphmalizerError::PermissionDenied);

        let other: DegraphmalizerError = io::Error::new(io::ErrorKind::BrokenPipe, "pipe").into();
        assert!(other.is_transient());
    }

    #[test]
    fn invalid_input_is_a_client_error() {
        let err = DegraphmalizerError::InvalidInput("no document".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_transient());
    }
}
