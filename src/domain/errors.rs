use alloy_primitives::Address;
use std::fmt;
use thiserror::Error;

/// The parameter set a count mismatch was detected in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgSet {
    Immutable,
    Mutable,
    WriteFunction,
}

impl fmt::Display for ArgSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ArgSet::Immutable => "immutable",
            ArgSet::Mutable => "mutable",
            ArgSet::WriteFunction => "write function",
        };
        f.write_str(label)
    }
}

/// Fatal conditions surfaced to callers.
///
/// Absence (an address that is not a module, not a chain, or not deployed) is
/// never an error: those paths return `None`/`false`.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ModulesError {
    #[error("module registry is not prepared; call prepare() first")]
    NotPrepared,
    #[error("module registry unavailable: {reason}")]
    RegistryUnavailable { reason: String },
    #[error("unknown module: {id}")]
    UnknownModule { id: String },
    #[error("module {module} has no write function {function}")]
    UnknownFunction { module: String, function: String },
    #[error("{set} argument count mismatch: expected {expected} got {actual}")]
    ParameterCountMismatch {
        set: ArgSet,
        expected: usize,
        actual: usize,
    },
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error("transaction failed: {reason}")]
    TransactionFailed { reason: String },
    #[error("call {function} on {address} failed: {reason}")]
    ModuleCallFailed {
        address: Address,
        function: String,
        reason: String,
    },
    #[error("batch read failed: {reason}")]
    BatchReadFailed { reason: String },
}

/// Failure reported by a [`ModuleTransport`](crate::features::ModuleTransport).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("rpc request failed: {0}")]
    Rpc(String),
    #[error("execution reverted: {0}")]
    Reverted(String),
    #[error("malformed rpc response: {0}")]
    Decode(String),
}
