//! Unified error handling
//!
//! Structured error kinds with context, plus the `Outcome` type used by the
//! best-effort operations that must never throw into their caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{error, warn};

pub type RuptResult<T> = Result<T, RuptError>;

/// Error context providing additional information for debugging and recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Timestamp when error occurred
    pub timestamp: DateTime<Utc>,
    /// Component where error originated
    pub component: String,
    /// Operation being performed when error occurred
    pub operation: Option<String>,
    /// Additional metadata
    pub metadata: HashMap<String, String>,
    /// Recovery suggestions
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            metadata: HashMap::new(),
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.recovery_suggestions.push(suggestion.to_string());
        self
    }
}

/// Main error type for the Rupt client
#[derive(Error, Debug)]
pub enum RuptError {
    /// Missing client id or account id. Never attempts I/O.
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        context: ErrorContext,
    },

    /// Request body could not be serialized
    #[error("Encoding error: {message}")]
    Encoding {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    /// Transport failure or empty response body
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    /// Response body does not match the expected schema
    #[error("Decode error: {message}")]
    Decode {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Flat discriminant of [`RuptError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Config,
    Encoding,
    Network,
    Decode,
    Storage,
    Io,
    Serialization,
}

impl RuptError {
    pub fn config<S: Into<String>>(message: S, component: &str) -> Self {
        Self::Config {
            message: message.into(),
            context: ErrorContext::new(component),
        }
    }

    pub fn network<S: Into<String>>(message: S, component: &str) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
            context: ErrorContext::new(component),
        }
    }

    pub fn decode<S: Into<String>>(message: S, component: &str) -> Self {
        Self::Decode {
            message: message.into(),
            source: None,
            context: ErrorContext::new(component),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RuptError::Config { .. } => ErrorKind::Config,
            RuptError::Encoding { .. } => ErrorKind::Encoding,
            RuptError::Network { .. } => ErrorKind::Network,
            RuptError::Decode { .. } => ErrorKind::Decode,
            RuptError::Storage { .. } => ErrorKind::Storage,
            RuptError::Io(_) => ErrorKind::Io,
            RuptError::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// Get the error context
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            RuptError::Config { context, .. } => Some(context),
            RuptError::Encoding { context, .. } => Some(context),
            RuptError::Network { context, .. } => Some(context),
            RuptError::Decode { context, .. } => Some(context),
            RuptError::Storage { context, .. } => Some(context),
            _ => None,
        }
    }

    /// The bare message, without the kind prefix added by `Display`
    pub fn message(&self) -> String {
        match self {
            RuptError::Config { message, .. }
            | RuptError::Encoding { message, .. }
            | RuptError::Network { message, .. }
            | RuptError::Decode { message, .. }
            | RuptError::Storage { message, .. } => message.clone(),
            RuptError::Io(e) => e.to_string(),
            RuptError::Serialization(e) => e.to_string(),
        }
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        let error_id = self.context().map(|c| c.error_id.as_str());
        match self {
            RuptError::Config { .. } => {
                error!(error_id = ?error_id, error = %self, "Configuration error");
            }
            RuptError::Network { .. } => {
                warn!(error_id = ?error_id, error = %self, "Network error (may be recoverable)");
            }
            RuptError::Decode { .. } => {
                warn!(error_id = ?error_id, error = %self, "Unexpected response from service");
            }
            _ => {
                error!(error_id = ?error_id, error = %self, "Error occurred");
            }
        }
    }
}

/// Why a best-effort operation did not apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// A precondition failed (client id or account id missing); no I/O was attempted
    Config(String),
    /// The request body could not be encoded; no I/O was attempted
    Encoding(String),
    /// The transport failed or returned no body
    Network(String),
    /// The response body did not decode
    Decode(String),
}

impl SkipReason {
    pub fn message(&self) -> &str {
        match self {
            SkipReason::Config(m)
            | SkipReason::Encoding(m)
            | SkipReason::Network(m)
            | SkipReason::Decode(m) => m,
        }
    }
}

impl From<&RuptError> for SkipReason {
    fn from(err: &RuptError) -> Self {
        match err.kind() {
            ErrorKind::Config => SkipReason::Config(err.message()),
            ErrorKind::Encoding | ErrorKind::Serialization => SkipReason::Encoding(err.message()),
            ErrorKind::Decode => SkipReason::Decode(err.message()),
            ErrorKind::Network | ErrorKind::Storage | ErrorKind::Io => {
                SkipReason::Network(err.message())
            }
        }
    }
}

impl From<RuptError> for SkipReason {
    fn from(err: RuptError) -> Self {
        SkipReason::from(&err)
    }
}

/// Result of an opportunistic operation: either it applied, or it was skipped
/// and local state is untouched.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum Outcome<T> {
    Applied(T),
    Skipped(SkipReason),
}

impl<T> Outcome<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied(_))
    }

    pub fn applied(self) -> Option<T> {
        match self {
            Outcome::Applied(value) => Some(value),
            Outcome::Skipped(_) => None,
        }
    }

    pub fn as_applied(&self) -> Option<&T> {
        match self {
            Outcome::Applied(value) => Some(value),
            Outcome::Skipped(_) => None,
        }
    }

    pub fn skip_reason(&self) -> Option<&SkipReason> {
        match self {
            Outcome::Applied(_) => None,
            Outcome::Skipped(reason) => Some(reason),
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Outcome::Applied(value) => Outcome::Applied(f(value)),
            Outcome::Skipped(reason) => Outcome::Skipped(reason),
        }
    }
}

/// Convenience macros for creating errors with context
///
/// `config_error!` carries a recovery suggestion only when the caller names one.
#[macro_export]
macro_rules! config_error {
    ($msg:expr, $component:expr) => {
        $crate::RuptError::Config {
            message: $msg.to_string(),
            context: $crate::ErrorContext::new($component),
        }
    };
    ($msg:expr, $component:expr, $operation:expr) => {
        $crate::RuptError::Config {
            message: $msg.to_string(),
            context: $crate::ErrorContext::new($component).with_operation($operation),
        }
    };
    ($msg:expr, $component:expr, $operation:expr, suggestion = $suggestion:expr) => {
        $crate::RuptError::Config {
            message: $msg.to_string(),
            context: $crate::ErrorContext::new($component)
                .with_operation($operation)
                .with_suggestion($suggestion),
        }
    };
}

#[macro_export]
macro_rules! network_error {
    ($msg:expr, $component:expr) => {
        $crate::RuptError::Network {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check network connectivity and service status"),
        }
    };
    ($msg:expr, $component:expr, $source:expr) => {
        $crate::RuptError::Network {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check network connectivity and service status"),
        }
    };
}

#[macro_export]
macro_rules! decode_error {
    ($msg:expr, $component:expr) => {
        $crate::RuptError::Decode {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component),
        }
    };
    ($msg:expr, $component:expr, $source:expr) => {
        $crate::RuptError::Decode {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new($component),
        }
    };
}
