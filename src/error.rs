//! Errors reported by the pool and the parallel operations.
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The operation a [`Task`](crate::pool::Task) or an error belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    PoolCreation,
    ForwardTransform,
    InverseTransform,
    BrokenToContinuous,
    ContinuousToBroken,
    Projection,
    Norm,
    /// A task built directly by a user of [`WorkerPool`](crate::pool::WorkerPool).
    Custom,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PoolCreation => "pool creation",
            Self::ForwardTransform => "forward transform",
            Self::InverseTransform => "inverse transform",
            Self::BrokenToContinuous => "broken to continuous conversion",
            Self::ContinuousToBroken => "continuous to broken conversion",
            Self::Projection => "projection",
            Self::Norm => "norm",
            Self::Custom => "custom task",
        };
        f.write_str(name)
    }
}

/// Errors reported synchronously by pool construction and by the parallel operations.
///
/// No error is ever reported after work has been dispatched: buffers are validated up front,
/// and an operation that returns an error has not written to its output.
#[derive(Debug, Error)]
pub enum Error {
    /// The arguments are inconsistent, e.g. a buffer length does not match the matrix shapes.
    #[error("precondition violated in {operation}: {reason}")]
    PreconditionViolation { operation: OperationKind, reason: String },

    /// A worker thread could not be spawned. No worker of the pool is left running.
    #[error("failed to spawn worker {index} of {requested}")]
    ResourceExhaustion {
        index: usize,
        requested: usize,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn precondition(operation: OperationKind, reason: impl Into<String>) -> Self {
        Self::PreconditionViolation {
            operation,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
