use crate::types::DType;
use thiserror::Error;

/// Custom error type for the Tessera workspace.
///
/// Every fallible operation of the checkpoint solver and the chunk manager
/// returns this error. None of the variants describe transient faults: they are
/// correctness preconditions and are surfaced to the caller immediately.
#[derive(Error, Debug, PartialEq, Clone)] // PartialEq for easier testing
pub enum TesseraError {
    /// One or more graph nodes carry no profiling metadata.
    #[error("Nodes meta information hasn't been prepared for {nodes:?}: run the profiling pass before constructing the solver")]
    PreconditionError { nodes: Vec<String> },

    /// The caller supplied an invalid configuration value (e.g. a common-node name).
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Chunk capacity exceeded: {requested} elements requested, {available} available")]
    CapacityExceeded { requested: usize, available: usize },

    #[error("Tensor {tensor} is already registered in a chunk")]
    AlreadyRegistered { tensor: u64 },

    #[error("Tensor {tensor} is not registered in any chunk")]
    TensorNotRegistered { tensor: u64 },

    #[error("Invalid state for operation '{operation}': {reason}")]
    InvalidState { operation: String, reason: String },

    #[error("No chunk group is configured for id {0}")]
    UnknownGroup(u32),

    #[error("Unknown chunk id {0}")]
    UnknownChunk(usize),

    #[error("DType mismatch for operation '{operation}': expected {expected:?}, got {actual:?}")]
    DTypeMismatch {
        expected: DType,
        actual: DType,
        operation: String,
    },

    #[error("Tensor creation error: data length {data_len} does not match shape {shape:?}")]
    TensorCreationError { data_len: usize, shape: Vec<usize> },

    #[error("Collective communication failed: {0}")]
    CommunicationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl TesseraError {
    /// Shorthand for building an [`TesseraError::InvalidState`].
    pub fn invalid_state(operation: &str, reason: impl Into<String>) -> Self {
        TesseraError::InvalidState {
            operation: operation.to_string(),
            reason: reason.into(),
        }
    }
}
