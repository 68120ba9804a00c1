// Copyright (c) 2025 - Cowboy AI, Inc.
//! Scripted control plane
//!
//! Replays a queue of status replies and records every call. When the
//! queue runs dry the last document is repeated, which is what a real
//! federation does for a slice that stopped changing.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{ControlPlane, ModifyRequest, SubmitRequest};
use crate::errors::{SliceError, SliceResult};

/// A recorded control-plane call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlPlaneCall {
    Submit { request_id: Uuid },
    Status { slice_id: String },
    Modify { slice_id: String, operations: usize },
    Delete { slice_id: String },
}

#[derive(Debug, Clone)]
enum Reply {
    Document(Value),
    Transient(String),
}

#[derive(Debug, Default)]
struct Script {
    statuses: VecDeque<Reply>,
    last: Option<Value>,
    submit_failures: u32,
    reject_modify: bool,
    calls: Vec<ControlPlaneCall>,
}

#[derive(Debug)]
pub struct ScriptedControlPlane {
    slice_id: String,
    script: Mutex<Script>,
}

impl ScriptedControlPlane {
    pub fn new(slice_id: impl Into<String>) -> Self {
        Self {
            slice_id: slice_id.into(),
            script: Mutex::new(Script::default()),
        }
    }

    /// Queue a status document
    pub async fn push_status(&self, document: Value) {
        self.script
            .lock()
            .await
            .statuses
            .push_back(Reply::Document(document));
    }

    /// Queue a transient status failure
    pub async fn push_status_error(&self, message: impl Into<String>) {
        self.script
            .lock()
            .await
            .statuses
            .push_back(Reply::Transient(message.into()));
    }

    /// Fail the next `count` submissions with a transient error
    pub async fn fail_submits(&self, count: u32) {
        self.script.lock().await.submit_failures = count;
    }

    pub async fn reject_modifications(&self) {
        self.script.lock().await.reject_modify = true;
    }

    pub async fn calls(&self) -> Vec<ControlPlaneCall> {
        self.script.lock().await.calls.clone()
    }

    pub async fn status_calls(&self) -> usize {
        self.calls()
            .await
            .iter()
            .filter(|c| matches!(c, ControlPlaneCall::Status { .. }))
            .count()
    }
}

#[async_trait]
impl ControlPlane for ScriptedControlPlane {
    async fn submit(&self, request: &SubmitRequest) -> SliceResult<String> {
        let mut script = self.script.lock().await;
        script.calls.push(ControlPlaneCall::Submit {
            request_id: request.request_id,
        });
        if script.submit_failures > 0 {
            script.submit_failures -= 1;
            return Err(SliceError::ControlPlane("submission unavailable".to_string()));
        }
        debug!("Scripted submit {} -> {}", request.request_id, self.slice_id);
        Ok(self.slice_id.clone())
    }

    async fn status(&self, slice_id: &str) -> SliceResult<Value> {
        let mut script = self.script.lock().await;
        script.calls.push(ControlPlaneCall::Status {
            slice_id: slice_id.to_string(),
        });
        match script.statuses.pop_front() {
            Some(Reply::Document(document)) => {
                script.last = Some(document.clone());
                Ok(document)
            }
            Some(Reply::Transient(message)) => Err(SliceError::ControlPlane(message)),
            None => script
                .last
                .clone()
                .ok_or_else(|| SliceError::ControlPlane("no status scripted".to_string())),
        }
    }

    async fn modify(&self, slice_id: &str, request: &ModifyRequest) -> SliceResult<bool> {
        let mut script = self.script.lock().await;
        script.calls.push(ControlPlaneCall::Modify {
            slice_id: slice_id.to_string(),
            operations: request.operations.len(),
        });
        Ok(!script.reject_modify)
    }

    async fn delete(&self, slice_id: &str) -> SliceResult<bool> {
        let mut script = self.script.lock().await;
        script.calls.push(ControlPlaneCall::Delete {
            slice_id: slice_id.to_string(),
        });
        Ok(true)
    }
}

/// Builder for wire-format status documents
#[derive(Debug, Clone)]
pub struct StatusBuilder {
    slice_id: String,
    state: String,
    lease_end: Option<String>,
    slivers: Vec<Value>,
}

impl StatusBuilder {
    pub fn new(slice_id: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            slice_id: slice_id.into(),
            state: state.into(),
            lease_end: None,
            slivers: Vec::new(),
        }
    }

    pub fn lease_end(mut self, rfc3339: impl Into<String>) -> Self {
        self.lease_end = Some(rfc3339.into());
        self
    }

    pub fn sliver(mut self, local_id: &str, state: &str) -> Self {
        self.slivers.push(json!({
            "local_id": local_id,
            "global_id": format!("sliver-{local_id}"),
            "reservation_state": state,
        }));
        self
    }

    pub fn node(mut self, local_id: &str, state: &str, management_ip: &str) -> Self {
        self.slivers.push(json!({
            "local_id": local_id,
            "global_id": format!("sliver-{local_id}"),
            "reservation_state": state,
            "management_ip": management_ip,
        }));
        self
    }

    pub fn failed(mut self, local_id: &str, message: &str) -> Self {
        self.slivers.push(json!({
            "local_id": local_id,
            "reservation_state": "Failed",
            "error_message": message,
        }));
        self
    }

    pub fn build(self) -> Value {
        let mut doc = json!({
            "slice_id": self.slice_id,
            "state": self.state,
            "slivers": self.slivers,
        });
        if let (Some(lease_end), Some(map)) = (self.lease_end, doc.as_object_mut()) {
            map.insert("lease_end".to_string(), Value::String(lease_end));
        }
        doc
    }
}
