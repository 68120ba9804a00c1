// Copyright (c) 2025 - Cowboy AI, Inc.
//! Error types for slice orchestration

use std::time::Duration;

use thiserror::Error;

use crate::connectivity::ConnectError;
use crate::domain::NetworkError;
use crate::topology::TopologyGraph;

/// Errors that can occur while building, planning, provisioning or
/// connecting to a slice
#[derive(Debug, Error)]
pub enum SliceError {
    /// A local_id referenced by an interface, peer or delta does not exist
    #[error("Unknown {kind} reference: {local_id}")]
    Reference { kind: String, local_id: String },

    /// A local_id is already used within the spec or slice
    #[error("Duplicate local_id: {0}")]
    DuplicateId(String),

    /// The dependency graph of a request has no valid ordering
    #[error("Cyclic resource dependencies among: {}", .remaining.join(", "))]
    CyclicSpec { remaining: Vec<String> },

    /// Delta is invalid against the current slice state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The control plane reported data that contradicts what we already know
    #[error("Inconsistent control-plane state for slice {slice_id}: {detail}")]
    InconsistentState { slice_id: String, detail: String },

    /// Provisioning did not reach a terminal state in time
    #[error("Timed out after {elapsed:?} waiting for slice to settle")]
    Timeout {
        elapsed: Duration,
        snapshot: Box<TopologyGraph>,
    },

    /// The caller cancelled an outstanding operation
    #[error("Operation cancelled")]
    Cancelled { snapshot: Option<Box<TopologyGraph>> },

    /// Management-network connection failure
    #[error("Connection error: {0}")]
    Connect(String),

    /// The slice died on the control plane
    #[error("Slice {slice_id} is dead")]
    SliceDead { slice_id: String },

    /// Transient failure talking to the control plane
    #[error("Control plane error: {0}")]
    ControlPlane(String),

    /// Network service type cannot serve the requested interfaces
    #[error("Invalid network service {segment}: {reason}")]
    InvalidNetworkService { segment: String, reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for slice operations
pub type SliceResult<T> = Result<T, SliceError>;

impl SliceError {
    pub(crate) fn reference(kind: impl Into<String>, local_id: impl Into<String>) -> Self {
        SliceError::Reference {
            kind: kind.into(),
            local_id: local_id.into(),
        }
    }

    pub(crate) fn inconsistent(slice_id: impl Into<String>, detail: impl Into<String>) -> Self {
        SliceError::InconsistentState {
            slice_id: slice_id.into(),
            detail: detail.into(),
        }
    }

    /// Whether a caller may reasonably retry the failed operation as-is
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SliceError::ControlPlane(_) | SliceError::Timeout { .. } | SliceError::Connect(_)
        )
    }

    /// Last known topology carried by timeout and cancellation errors
    pub fn partial_snapshot(&self) -> Option<&TopologyGraph> {
        match self {
            SliceError::Timeout { snapshot, .. } => Some(snapshot),
            SliceError::Cancelled {
                snapshot: Some(snapshot),
            } => Some(snapshot),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SliceError {
    fn from(err: serde_json::Error) -> Self {
        SliceError::Serialization(err.to_string())
    }
}

impl From<NetworkError> for SliceError {
    fn from(err: NetworkError) -> Self {
        match &err {
            NetworkError::AddressInUse(_)
            | NetworkError::OutsideSubnet { .. }
            | NetworkError::Exhausted(_) => SliceError::Conflict(err.to_string()),
            _ => SliceError::Configuration(err.to_string()),
        }
    }
}

impl From<ConnectError> for SliceError {
    fn from(err: ConnectError) -> Self {
        SliceError::Connect(err.to_string())
    }
}

impl From<async_nats::ConnectError> for SliceError {
    fn from(err: async_nats::ConnectError) -> Self {
        SliceError::ControlPlane(err.to_string())
    }
}

impl From<async_nats::RequestError> for SliceError {
    fn from(err: async_nats::RequestError) -> Self {
        SliceError::ControlPlane(err.to_string())
    }
}
