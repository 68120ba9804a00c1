// Copyright (c) 2025 - Cowboy AI, Inc.
//! Federation Control Plane Boundary
//!
//! The remote service that admits, schedules and reports on slices. This
//! crate only consumes it:
//!
//! ```text
//! submit(request)         → slice_id
//! status(slice_id)        → raw status document
//! modify(slice_id, delta) → accepted
//! delete(slice_id)        → accepted
//! ```
//!
//! Status documents come back untyped and are validated by
//! [`document::parse_status`] before anything inside the crate sees them.
//!
//! # Transports
//!
//! - [`NatsControlPlane`] - request/reply over NATS
//! - [`ScriptedControlPlane`] - in-process replay for tests and dry runs
//!
//! Implementations must be safe for concurrent use from several workers.

pub mod document;
pub mod nats;
pub mod scripted;

pub use document::{parse_status, ModifyRequest, ResourceStatus, StatusDocument, SubmitRequest};
pub use nats::{NatsControlPlane, NatsControlPlaneConfig};
pub use scripted::{ControlPlaneCall, ScriptedControlPlane, StatusBuilder};

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::SliceResult;

/// Client side of the federation API
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Submit a new slice request; returns the federation slice_id
    async fn submit(&self, request: &SubmitRequest) -> SliceResult<String>;

    /// Fetch the current status document of a slice
    async fn status(&self, slice_id: &str) -> SliceResult<Value>;

    /// Request a modification; returns whether it was accepted
    async fn modify(&self, slice_id: &str, request: &ModifyRequest) -> SliceResult<bool>;

    /// Request deletion; returns whether it was accepted
    async fn delete(&self, slice_id: &str) -> SliceResult<bool>;
}
