// Copyright (c) 2025 - Cowboy AI, Inc.
//! Request and status documents
//!
//! Requests are built from a plan and carry a deterministic request id so
//! the federation can recognise a resubmission. Status documents are
//! parsed strictly: a missing field, an unknown state name, an unparsable
//! address or a duplicated sliver all become `InconsistentState`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::net::IpAddr;
use uuid::Uuid;

use crate::domain::{LocalId, ResourceSpec, Subnet};
use crate::errors::{SliceError, SliceResult};
use crate::planner::{ProvisioningOp, ProvisioningPlan};
use crate::state_machine::{ReservationState, SliceState};

/// New slice request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub request_id: Uuid,
    pub name: String,
    pub operations: Vec<ProvisioningOp>,
}

impl SubmitRequest {
    /// The request id depends only on the slice name and the spec, so a
    /// retried submission is recognisable as the same request.
    pub fn new(name: &str, spec: &ResourceSpec, plan: &ProvisioningPlan) -> SliceResult<Self> {
        Ok(Self {
            request_id: Uuid::new_v5(&spec.request_id()?, name.as_bytes()),
            name: name.to_string(),
            operations: plan.operations().to_vec(),
        })
    }
}

/// Modification of an existing slice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyRequest {
    pub request_id: Uuid,
    pub operations: Vec<ProvisioningOp>,
}

impl ModifyRequest {
    pub fn new(slice_id: &str, plan: &ProvisioningPlan) -> SliceResult<Self> {
        let body = serde_json::to_vec(plan)?;
        let namespace = Uuid::new_v5(&Uuid::NAMESPACE_OID, slice_id.as_bytes());
        Ok(Self {
            request_id: Uuid::new_v5(&namespace, &body),
            operations: plan.operations().to_vec(),
        })
    }
}

/// Validated status of one sliver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceStatus {
    pub local_id: LocalId,
    pub global_id: Option<String>,
    pub state: ReservationState,
    pub site: Option<String>,
    pub management_ip: Option<IpAddr>,
    pub error: Option<String>,
    pub gateway: Option<IpAddr>,
    pub subnet: Option<Subnet>,
}

/// Validated slice status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusDocument {
    pub slice_id: String,
    pub state: SliceState,
    pub owner: Option<String>,
    pub lease_end: Option<DateTime<Utc>>,
    pub resources: Vec<ResourceStatus>,
}

impl StatusDocument {
    pub fn resource(&self, local_id: &str) -> Option<&ResourceStatus> {
        self.resources.iter().find(|r| r.local_id == local_id)
    }
}

#[derive(Debug, Deserialize)]
struct WireStatus {
    slice_id: String,
    state: String,
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    lease_end: Option<String>,
    #[serde(default)]
    slivers: Vec<WireSliver>,
}

#[derive(Debug, Deserialize)]
struct WireSliver {
    local_id: String,
    #[serde(default)]
    global_id: Option<String>,
    reservation_state: String,
    #[serde(default)]
    site: Option<String>,
    #[serde(default)]
    management_ip: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    gateway: Option<String>,
    #[serde(default)]
    subnet: Option<String>,
}

/// Map a federation reservation-state name
pub fn reservation_state_from(name: &str) -> Option<ReservationState> {
    let state = match name {
        "Nascent" | "Ticketed" => ReservationState::Ticketed,
        "Priming" | "ActiveTicketed" | "Provisioning" => ReservationState::Provisioning,
        "Active" => ReservationState::Active,
        "Failed" => ReservationState::Failed,
        "Closed" | "CloseWait" => ReservationState::Closed,
        _ => return None,
    };
    Some(state)
}

/// Validate a raw status document for `slice_id`
pub fn parse_status(slice_id: &str, raw: Value) -> SliceResult<StatusDocument> {
    let inconsistent = |detail: String| SliceError::inconsistent(slice_id, detail);

    let wire: WireStatus = serde_json::from_value(raw)
        .map_err(|e| inconsistent(format!("malformed status document: {e}")))?;

    if wire.slice_id != slice_id {
        return Err(inconsistent(format!(
            "status document is for slice {}",
            wire.slice_id
        )));
    }

    let state = SliceState::from_control_plane(&wire.state)
        .ok_or_else(|| inconsistent(format!("unknown slice state {}", wire.state)))?;

    let lease_end = wire
        .lease_end
        .map(|raw| {
            DateTime::parse_from_rfc3339(&raw)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| inconsistent(format!("bad lease_end {raw}: {e}")))
        })
        .transpose()?;

    let mut seen = BTreeSet::new();
    let mut resources = Vec::with_capacity(wire.slivers.len());
    for sliver in wire.slivers {
        if !seen.insert(sliver.local_id.clone()) {
            return Err(inconsistent(format!(
                "sliver {} reported twice",
                sliver.local_id
            )));
        }

        let state = reservation_state_from(&sliver.reservation_state).ok_or_else(|| {
            inconsistent(format!(
                "sliver {} has unknown reservation state {}",
                sliver.local_id, sliver.reservation_state
            ))
        })?;

        let parse_ip = |field: &str, raw: Option<String>| -> SliceResult<Option<IpAddr>> {
            raw.map(|value| {
                value.parse::<IpAddr>().map_err(|_| {
                    inconsistent(format!(
                        "sliver {} has invalid {field} {value}",
                        sliver.local_id
                    ))
                })
            })
            .transpose()
        };
        let management_ip = parse_ip("management_ip", sliver.management_ip.clone())?;
        let gateway = parse_ip("gateway", sliver.gateway.clone())?;
        let subnet = sliver
            .subnet
            .as_deref()
            .map(|raw| {
                Subnet::new(raw).map_err(|e| {
                    inconsistent(format!("sliver {} has invalid subnet: {e}", sliver.local_id))
                })
            })
            .transpose()?;

        resources.push(ResourceStatus {
            local_id: sliver.local_id,
            global_id: sliver.global_id,
            state,
            site: sliver.site,
            management_ip,
            error: sliver.error_message,
            gateway,
            subnet,
        });
    }

    Ok(StatusDocument {
        slice_id: wire.slice_id,
        state,
        owner: wire.owner,
        lease_end,
        resources,
    })
}
