//! Fault classification for the machine
//!
//! This module defines [`CeskError`], the single error type returned by every
//! fallible operation in the crate. Variants fall into a handful of classes:
//!
//! - memory faults ([`CeskError::SegFault`]), which are the analysis result
//! - value faults (uninitialized reads, division by zero, type errors)
//! - scheduling faults ([`CeskError::Deadlock`])
//! - setup faults (bad configuration, programs outside the canonical subset)
//!
//! None of them are recovered locally; they stop the run and reach the driver,
//! which maps the class to a process status with [`CeskError::exit_code`].

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CeskError {
    /// Invalid memory access: null, out of bounds, freed or never allocated
    #[error("segmentation fault: {message}")]
    SegFault {
        message: String,
        address: Option<String>,
    },

    /// Arithmetic or branching on a cell that was never written
    #[error("use of uninitialized value in {context}")]
    UseOfUninitializedValue { context: String },

    /// Invalid configuration value
    #[error("unknown configuration value '{value}' for {key}")]
    UnknownConfiguration { key: String, value: String },

    /// Ready queue drained while tasks are still waiting
    #[error("deadlock: {blocked} task(s) blocked with nothing runnable")]
    Deadlock { blocked: usize },

    /// Node, operator or shape outside the canonical subset
    #[error("unsupported construct: {message}")]
    Unsupported { message: String },

    #[error("undefined variable '{name}'")]
    UndefinedVariable { name: String },

    #[error("undefined function '{name}'")]
    UndefinedFunction { name: String },

    #[error("function '{function}' expects {expected} argument(s), got {got}")]
    ArgumentCountMismatch {
        function: String,
        expected: usize,
        got: usize,
    },

    #[error("{operation} by zero")]
    DivisionByZero { operation: String },

    #[error("invalid printf format: {message}")]
    InvalidPrintfFormat { message: String },

    #[error("type error: expected {expected}, got {got}")]
    TypeError { expected: String, got: String },

    /// Exploration exceeded the configured number of scheduler steps
    #[error("step limit of {limit} exceeded")]
    StepLimitExceeded { limit: u64 },
}

impl CeskError {
    pub fn seg_fault(message: impl Into<String>) -> Self {
        CeskError::SegFault {
            message: message.into(),
            address: None,
        }
    }

    pub fn seg_fault_at(message: impl Into<String>, address: impl ToString) -> Self {
        CeskError::SegFault {
            message: message.into(),
            address: Some(address.to_string()),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        CeskError::Unsupported {
            message: message.into(),
        }
    }

    pub fn uninitialized(context: impl Into<String>) -> Self {
        CeskError::UseOfUninitializedValue {
            context: context.into(),
        }
    }

    pub fn unknown_configuration(key: &str, value: &str) -> Self {
        CeskError::UnknownConfiguration {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    pub fn type_error(expected: impl Into<String>, got: impl Into<String>) -> Self {
        CeskError::TypeError {
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// Whether this fault means the program is not memory safe
    pub fn is_memory_fault(&self) -> bool {
        matches!(self, CeskError::SegFault { .. })
    }

    /// Process status for the driver
    pub fn exit_code(&self) -> i32 {
        match self {
            CeskError::SegFault { .. } => 2,
            CeskError::UnknownConfiguration { .. } => 3,
            CeskError::Unsupported { .. } => 4,
            CeskError::Deadlock { .. } => 5,
            _ => 1,
        }
    }
}
