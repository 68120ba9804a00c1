// Copyright (c) 2025 - Cowboy AI, Inc.
//! Client-side slice lifecycle and topology resolution for federated testbeds
//!
//! A caller describes the topology it wants as a [`ResourceSpec`], and a
//! [`SliceOrchestrator`] plans it, submits it to the federation control plane,
//! reconciles the reported status into a [`TopologyGraph`], and opens
//! management sessions to the nodes once they are up.
//!
//! ```text
//! ResourceSpec ─► planner ─► ControlPlane::submit
//!                                   │
//!                    ReconciliationEngine (poll rounds)
//!                                   │
//!                      TopologyStore ─► snapshots for readers
//!                                   │
//!                         ConnectivityManager ─► sessions
//! ```

pub mod cancel;
pub mod config;
pub mod connectivity;
pub mod control_plane;
pub mod domain;
pub mod errors;
pub mod planner;
pub mod reconcile;
pub mod service;
pub mod state_machine;
pub mod telemetry;
pub mod topology;

// Re-export commonly used types
pub use cancel::CancelToken;
pub use config::{OrchestratorConfig, PollConfig, RetryPolicy, SubmitConfig};
pub use connectivity::{
    ConnectError, ConnectivityManager, ConnectivitySession, ConnectivityTransport, Credentials,
    SessionHandle,
};
pub use control_plane::{ControlPlane, NatsControlPlane, NatsControlPlaneConfig};
pub use domain::{
    AddressRequest, InterfaceSpec, LocalId, NetworkSegmentSpec, NodeSpec, ResourceSpec,
    ServiceType, Subnet, VlanId,
};
pub use errors::{SliceError, SliceResult};
pub use planner::{plan_create, plan_modify, ProvisioningOp, ProvisioningPlan, SliceDelta};
pub use reconcile::{ReachabilityOutcome, ReconcileOutcome, ReconciliationEngine, RoundReport};
pub use service::{SliceHandle, SliceOrchestrator};
pub use state_machine::{ReservationState, SliceState};
pub use topology::{ProvisionedResource, ResourceKind, Slice, TopologyGraph, TopologyReader};
