//! Structured configuration issues
//!
//! Validation never fails fast: every problem in a config file is reported
//! at once, each with a severity so callers decide what is fatal.

use std::fmt;

/// Severity level of a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The configuration cannot work as written.
    Error,
    /// The configuration works but a default is used instead.
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// Identifies a specific configuration issue.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigIssueCode {
    InvalidEnumValue {
        field: String,
        value: String,
        valid_values: Vec<String>,
    },
    OutOfRange {
        field: String,
        value: String,
    },
    InvalidAmount {
        field: String,
        value: String,
    },
    EmptyModelName {
        field: String,
    },
    EmptyPool,
}

/// A detected issue in the configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigIssue {
    pub severity: Severity,
    pub code: ConfigIssueCode,
    pub message: String,
}

impl ConfigIssue {
    pub fn error(code: ConfigIssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
        }
    }

    pub fn warning(code: ConfigIssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
        }
    }

    pub fn out_of_range(field: &str, value: impl fmt::Display, expected: &str) -> Self {
        Self::error(
            ConfigIssueCode::OutOfRange {
                field: field.to_string(),
                value: value.to_string(),
            },
            format!("{}: {} is out of range, expected {}", field, value, expected),
        )
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.message)
    }
}
