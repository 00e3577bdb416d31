use std::fmt;

use thiserror::Error;

/// Errors reported by a chunked update pass.
#[derive(Debug, Error)]
pub enum PassError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{} fault(s) during update pass: {}", .faults.len(), summarize(.faults))]
    WorkerFault { faults: Vec<Fault> },

    #[error("worker pool unavailable: {0}")]
    ResourceExhaustion(String),
}

impl PassError {
    /// Faults collected by the pass, empty for the other variants.
    pub fn faults(&self) -> &[Fault] {
        match self {
            PassError::WorkerFault { faults } => faults,
            _ => &[],
        }
    }
}

/// A single failure observed while a chunk was being processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// The transform returned an error for the record at `index`.
    Record {
        chunk: usize,
        index: usize,
        reason: String,
    },
    /// The transform, or the worker around it, panicked at `index`.
    Panicked {
        chunk: usize,
        index: usize,
        message: String,
    },
}

impl Fault {
    pub fn chunk(&self) -> usize {
        match self {
            Fault::Record { chunk, .. } | Fault::Panicked { chunk, .. } => *chunk,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Fault::Record { index, .. } | Fault::Panicked { index, .. } => *index,
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Record {
                chunk,
                index,
                reason,
            } => write!(f, "record {} (chunk {}): {}", index, chunk, reason),
            Fault::Panicked {
                chunk,
                index,
                message,
            } => write!(f, "chunk {} panicked at record {}: {}", chunk, index, message),
        }
    }
}

fn summarize(faults: &[Fault]) -> String {
    match faults {
        [] => String::new(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{} (and {} more)", first, rest.len()),
    }
}
