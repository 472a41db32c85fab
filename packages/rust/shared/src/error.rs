//! Error types for importkit.
//!
//! The three failure classes of an import run each have their own type:
//! - [`TransformError`]: one operator could not process one row
//! - [`PersistError`]: a finished target could not be saved
//! - [`ConfigError`]: a mapping definition is malformed
//!
//! [`ImportKitError`] unifies them for library callers. The CLI wraps this
//! with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::{ColumnIndex, ElementId};

/// An operator could not coerce or validate its input for one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("operator '{operator_kind}' failed at column {column}: {cause}")]
pub struct TransformError {
    /// Kind name of the failing operator (e.g. `integer`).
    pub operator_kind: String,
    /// Column the operator was addressing.
    pub column: ColumnIndex,
    /// Human-readable cause.
    pub cause: String,
}

impl TransformError {
    pub fn new(
        operator_kind: impl Into<String>,
        column: ColumnIndex,
        cause: impl Into<String>,
    ) -> Self {
        Self {
            operator_kind: operator_kind.into(),
            column,
            cause: cause.into(),
        }
    }
}

/// The persistence collaborator rejected a committed target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("failed to save element {element}: {cause}")]
pub struct PersistError {
    /// Element whose target was being saved.
    pub element: ElementId,
    /// Human-readable cause.
    pub cause: String,
}

impl PersistError {
    pub fn new(element: ElementId, cause: impl Into<String>) -> Self {
        Self {
            element,
            cause: cause.into(),
        }
    }
}

/// A mapping definition cannot be turned into a transform tree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// No operator is registered under this kind name.
    #[error("unknown operator kind '{kind}'")]
    UnknownOperator { kind: String },

    /// A required parameter is absent.
    #[error("operator '{kind}' requires parameter '{param}'")]
    MissingParam { kind: String, param: String },

    /// A parameter is present but has the wrong type or an unusable value.
    #[error("operator '{kind}' has invalid parameter '{param}': {reason}")]
    InvalidParam {
        kind: String,
        param: String,
        reason: String,
    },

    /// A leaf operator was configured with children.
    #[error("operator '{kind}' does not accept children (got {count})")]
    UnexpectedChildren { kind: String, count: usize },

    /// The tree nests deeper than the configured limit.
    #[error("transform tree exceeds maximum depth of {max_depth}")]
    TooDeep { max_depth: usize },

    /// The mapping source could not be parsed.
    #[error("failed to parse mapping: {message}")]
    Parse { message: String },
}

impl ConfigError {
    pub fn missing(kind: &str, param: &str) -> Self {
        Self::MissingParam {
            kind: kind.into(),
            param: param.into(),
        }
    }

    pub fn invalid(kind: &str, param: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParam {
            kind: kind.into(),
            param: param.into(),
            reason: reason.into(),
        }
    }
}

/// Top-level error type for all importkit operations.
#[derive(Debug, thiserror::Error)]
pub enum ImportKitError {
    /// Malformed mapping or application configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Operator failure that escaped the runner (e.g. a direct tree call).
    #[error("transform error: {0}")]
    Transform(#[from] TransformError),

    /// Target could not be saved.
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input validation error (mismatched batch shape, bad input file, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A worker task panicked or was aborted.
    #[error("worker error: {0}")]
    Worker(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ImportKitError>;

impl ImportKitError {
    /// Create a config parse error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(ConfigError::Parse {
            message: msg.into(),
        })
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = TransformError::new("integer", ColumnIndex(2), "invalid digit found in string");
        assert_eq!(
            err.to_string(),
            "operator 'integer' failed at column 2: invalid digit found in string"
        );

        let err = ImportKitError::from(ConfigError::missing("constant", "field"));
        assert_eq!(
            err.to_string(),
            "config error: operator 'constant' requires parameter 'field'"
        );

        let err = ImportKitError::validation("2 elements but 3 row sets");
        assert!(err.to_string().contains("3 row sets"));
    }

    #[test]
    fn persist_error_names_element() {
        let err = PersistError::new(ElementId::from("product-7"), "disk full");
        assert!(err.to_string().contains("product-7"));
        assert!(err.to_string().contains("disk full"));
    }
}
