//! Evaluation failures.

use tessel_native::ErrorCategory;

pub type ExecResult<T> = Result<T, ExecError>;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// A runtime error raised by generated code or by the runtime library.
    #[error("{category}: {message}")]
    Raised {
        category: ErrorCategory,
        message: String,
    },
    /// Generated code broke the memory model: out-of-bounds access, use
    /// after free, double free, integer division by zero.
    #[error("fault: {0}")]
    Fault(String),
    #[error("call depth limit of {0} exceeded")]
    StackOverflow(usize),
}

impl ExecError {
    /// The category of a raised error; `None` for faults.
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            ExecError::Raised { category, .. } => Some(*category),
            _ => None,
        }
    }
}

pub(crate) fn fault(message: impl Into<String>) -> ExecError {
    ExecError::Fault(message.into())
}

pub(crate) fn raise(category: ErrorCategory, message: impl Into<String>) -> ExecError {
    ExecError::Raised {
        category,
        message: message.into(),
    }
}
