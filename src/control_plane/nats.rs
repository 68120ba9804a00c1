// Copyright (c) 2025 - Cowboy AI, Inc.
//! NATS request/reply transport for the federation API
//!
//! Every verb is a request on `<prefix>.slices.<verb>` with a JSON body.
//! Replies use one envelope:
//!
//! ```json
//! { "result": { ... } }
//! { "error": "reason" }
//! { "error": "reason", "kind": "not_found" }
//! ```
//!
//! `kind` is one of `unavailable`, `conflict`, `not_found` or `invalid`.
//! Untyped and `unavailable` errors are transient; the rest go straight to
//! the caller.

use async_nats::{Client, ConnectOptions};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

use super::{ControlPlane, ModifyRequest, SubmitRequest};
use crate::errors::{SliceError, SliceResult};

/// Configuration for the NATS connection to the federation
#[derive(Debug, Clone)]
pub struct NatsControlPlaneConfig {
    /// NATS server URLs
    pub servers: Vec<String>,
    /// Client name
    pub name: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Request timeout
    pub request_timeout: Duration,
    /// Subject prefix, e.g. `federation`
    pub subject_prefix: String,
}

impl Default for NatsControlPlaneConfig {
    fn default() -> Self {
        Self {
            servers: vec!["nats://localhost:4222".to_string()],
            name: "slice-orchestrator".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
            subject_prefix: "federation".to_string(),
        }
    }
}

/// Failure class reported by the federation
///
/// Only `unavailable` (and an untyped error) is worth retrying; the others
/// are answers that will not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ErrorKind {
    Unavailable,
    Conflict,
    NotFound,
    Invalid,
}

#[derive(Debug, Deserialize)]
struct Envelope<R> {
    result: Option<R>,
    error: Option<String>,
    kind: Option<ErrorKind>,
}

impl<R> Envelope<R> {
    /// `context` names the slice (or request) the reply concerns
    fn into_result(self, subject: &str, context: &str) -> SliceResult<R> {
        match (self.result, self.error) {
            (_, Some(error)) => Err(match self.kind {
                None | Some(ErrorKind::Unavailable) => {
                    SliceError::ControlPlane(format!("{subject}: {error}"))
                }
                Some(ErrorKind::Conflict) => SliceError::Conflict(format!("{context}: {error}")),
                Some(ErrorKind::NotFound | ErrorKind::Invalid) => {
                    SliceError::inconsistent(context, format!("{subject}: {error}"))
                }
            }),
            (Some(result), None) => Ok(result),
            (None, None) => Err(SliceError::Serialization(format!(
                "{subject}: reply has neither result nor error"
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Submitted {
    slice_id: String,
}

#[derive(Debug, Deserialize)]
struct Accepted {
    accepted: bool,
}

/// Control plane reached over NATS request/reply
#[derive(Clone)]
pub struct NatsControlPlane {
    client: Client,
    prefix: String,
}

impl NatsControlPlane {
    pub async fn connect(config: NatsControlPlaneConfig) -> SliceResult<Self> {
        let connect_options = ConnectOptions::new()
            .name(&config.name)
            .connection_timeout(config.connect_timeout)
            .request_timeout(Some(config.request_timeout));

        let client =
            async_nats::connect_with_options(config.servers.join(","), connect_options).await?;

        info!("Connected to federation control plane at {:?}", config.servers);

        Ok(Self::with_client(client, config.subject_prefix))
    }

    pub fn with_client(client: Client, subject_prefix: impl Into<String>) -> Self {
        Self {
            client,
            prefix: subject_prefix.into(),
        }
    }

    pub fn subject(&self, verb: &str) -> String {
        subject_for(&self.prefix, verb)
    }

    async fn request<T, R>(&self, verb: &str, context: &str, body: &T) -> SliceResult<R>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let subject = self.subject(verb);
        let payload = serde_json::to_vec(body)?;

        let response = self.client.request(subject.clone(), payload.into()).await?;
        debug!("Reply on {} ({} bytes)", subject, response.payload.len());

        decode_reply(&subject, context, &response.payload)
    }
}

fn subject_for(prefix: &str, verb: &str) -> String {
    format!("{prefix}.slices.{verb}")
}

fn decode_reply<R: DeserializeOwned>(subject: &str, context: &str, payload: &[u8]) -> SliceResult<R> {
    let envelope: Envelope<R> = serde_json::from_slice(payload)?;
    envelope.into_result(subject, context)
}

#[async_trait]
impl ControlPlane for NatsControlPlane {
    async fn submit(&self, request: &SubmitRequest) -> SliceResult<String> {
        let submitted: Submitted = self.request("submit", &request.name, request).await?;
        Ok(submitted.slice_id)
    }

    async fn status(&self, slice_id: &str) -> SliceResult<Value> {
        self.request("status", slice_id, &json!({ "slice_id": slice_id })).await
    }

    async fn modify(&self, slice_id: &str, request: &ModifyRequest) -> SliceResult<bool> {
        let accepted: Accepted = self
            .request("modify", slice_id, &json!({ "slice_id": slice_id, "request": request }))
            .await?;
        Ok(accepted.accepted)
    }

    async fn delete(&self, slice_id: &str) -> SliceResult<bool> {
        let accepted: Accepted = self
            .request("delete", slice_id, &json!({ "slice_id": slice_id }))
            .await?;
        Ok(accepted.accepted)
    }
}
