// virtchan - Virtual time-series channels
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for virtchan
//!
//! This module defines all error types used throughout the library.

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Main error type for engine operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// A required block parameter was not supplied
    #[error("Missing parameter {parameter} for {block}")]
    MissingParameter { block: String, parameter: String },

    /// A block parameter has the wrong type or an unusable value
    #[error("Invalid parameter {parameter} for {block}: {reason}")]
    InvalidParameter {
        block: String,
        parameter: String,
        reason: String,
    },

    /// Input name registered twice on one coordinator
    #[error("Duplicate input: {0}")]
    DuplicateInput(String),

    /// No input registered under this name
    #[error("No coordinated input {0}")]
    UnknownInput(String),

    /// Input registered after the timeline started
    #[error("Coordinator sealed, cannot register input {0}")]
    CoordinatorSealed(String),

    /// Cursor asked to move backwards
    #[error("Out of order query: requested {requested} after {last}")]
    OutOfOrderQuery { requested: i64, last: i64 },

    /// Statistics requested before any tuple was consumed
    #[error("No data")]
    NoData,

    /// Period function used without a previous instant
    #[error("No previous instant to integrate against")]
    NoPreviousInstant,

    /// Rule evaluated to something other than a number
    #[error("Virtual channel rule must yield numeric value, got {0}")]
    NonNumericRuleResult(String),

    /// Degenerate arithmetic (e.g. zero-width time range)
    #[error("Arithmetic error: {0}")]
    ArithmeticError(String),

    /// Rule text could not be parsed or evaluated
    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    /// Sample source has no such channel
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    /// Registry has no such block
    #[error("Block {0} doesn't exist")]
    UnknownBlock(String),

    /// Block name defined twice
    #[error("Block {0} already defined")]
    DuplicateBlock(String),

    /// Block has no output view with this name
    #[error("Block {block} has no output {output}")]
    UnknownOutput { block: String, output: String },

    /// Malformed configuration document
    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    pub(crate) fn missing(block: &str, parameter: &str) -> Self {
        EngineError::MissingParameter {
            block: block.to_string(),
            parameter: parameter.to_string(),
        }
    }

    pub(crate) fn invalid(block: &str, parameter: &str, reason: impl Into<String>) -> Self {
        EngineError::InvalidParameter {
            block: block.to_string(),
            parameter: parameter.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::OutOfOrderQuery {
            requested: 100,
            last: 2000,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("100"));
        assert!(msg.contains("2000"));
    }

    #[test]
    fn test_missing_parameter_display() {
        let err = EngineError::missing("battery", "capacity");
        assert_eq!(format!("{}", err), "Missing parameter capacity for battery");
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: EngineError = json_err.into();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
