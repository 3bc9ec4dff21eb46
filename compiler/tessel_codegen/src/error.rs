//! Static code-generation errors.
//!
//! These abort the current request at compile time. Failures that depend
//! on runtime values are never reported here; they are emitted as
//! `Raise` instructions instead.

use tessel_native::ErrorCategory;

/// Result alias used throughout the code generator.
pub type CodegenResult<T> = Result<T, CodegenError>;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum CodegenError {
    /// The operation is not defined for the operand types.
    #[error("{category}: {message}")]
    Unsupported {
        category: ErrorCategory,
        message: String,
    },
    #[error("composite `{name}` contains itself while resolving its fields")]
    CyclicComposite { name: String },
    #[error("can't construct `{name}` from {found} arguments: expected 0 or {expected}")]
    ConstructorArity {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("can't {kind} convert from type `{from}` to type `{to}`")]
    Unconvertible {
        from: String,
        to: String,
        kind: ConversionKind,
    },
    #[error("`{name}` is not an assignable field of `{owner}`")]
    UnassignableField { owner: String, name: String },
    #[error("`{name}` is not a valid field name in `{owner}`")]
    InvalidIdentifier { owner: String, name: String },
    #[error("field `{name}` is declared more than once in `{owner}`")]
    DuplicateField { owner: String, name: String },
    #[error("`{name}` is not a declared composite")]
    UnknownComposite { name: String },
    #[error(
        "growth policy {numerator}/{denominator} + {increment} doesn't always grow: \
         need numerator >= denominator > 0 and increment >= 1"
    )]
    InvalidGrowthPolicy {
        numerator: i64,
        denominator: i64,
        increment: i64,
    },
    /// A wrapper broke a contract the engine relies on.
    #[error("internal code generator error: {0}")]
    Internal(String),
}

impl CodegenError {
    /// Error category this would carry if surfaced to user code.
    pub fn category(&self) -> ErrorCategory {
        match self {
            CodegenError::Unsupported { category, .. } => *category,
            CodegenError::UnassignableField { .. } => ErrorCategory::AttributeError,
            CodegenError::CyclicComposite { .. } | CodegenError::Internal(_) => {
                ErrorCategory::RuntimeError
            }
            CodegenError::ConstructorArity { .. }
            | CodegenError::Unconvertible { .. }
            | CodegenError::InvalidIdentifier { .. }
            | CodegenError::DuplicateField { .. }
            | CodegenError::UnknownComposite { .. } => ErrorCategory::TypeError,
            CodegenError::InvalidGrowthPolicy { .. } => ErrorCategory::ValueError,
        }
    }
}

/// Whether a conversion was requested implicitly or explicitly.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ConversionKind {
    Implicit,
    Explicit,
}

impl ConversionKind {
    pub fn from_explicit(explicit: bool) -> Self {
        if explicit {
            ConversionKind::Explicit
        } else {
            ConversionKind::Implicit
        }
    }
}

impl std::fmt::Display for ConversionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversionKind::Implicit => f.write_str("implicitly"),
            ConversionKind::Explicit => f.write_str("explicitly"),
        }
    }
}

// ── Factories ───────────────────────────────────────────────────────

pub fn type_error(message: impl Into<String>) -> CodegenError {
    CodegenError::Unsupported {
        category: ErrorCategory::TypeError,
        message: message.into(),
    }
}

pub fn attribute_error(message: impl Into<String>) -> CodegenError {
    CodegenError::Unsupported {
        category: ErrorCategory::AttributeError,
        message: message.into(),
    }
}

pub fn internal(message: impl Into<String>) -> CodegenError {
    CodegenError::Internal(message.into())
}
