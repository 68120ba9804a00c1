// Copyright (c) 2025 - Cowboy AI, Inc.
//! Pure merges of observations into a topology graph
//!
//! Each function takes the current snapshot and returns the next one; the
//! engine publishes the result as a whole.

use chrono::{DateTime, Utc};
use std::net::IpAddr;
use tracing::{debug, warn};

use super::{ReachabilityOutcome, ResourceTransition, RoundReport};
use crate::control_plane::StatusDocument;
use crate::errors::{SliceError, SliceResult};
use crate::planner::ProvisioningPlan;
use crate::state_machine::{ReservationInput, ReservationState, SliceState, StateMachine};
use crate::topology::{Slice, TopologyGraph};

fn slice_id_of(graph: &TopologyGraph, fallback: &str) -> String {
    graph
        .slice()
        .map_or_else(|| fallback.to_string(), |s| s.slice_id.clone())
}

/// Merge one validated status document into `graph`
///
/// Pure: the input graph is untouched and nothing is published. Fails with
/// `InconsistentState` on regressions, unknown slivers or changed global ids.
pub fn apply_status(
    graph: &TopologyGraph,
    doc: &StatusDocument,
    round: u64,
    now: DateTime<Utc>,
) -> SliceResult<(TopologyGraph, RoundReport)> {
    let slice_id = slice_id_of(graph, &doc.slice_id);
    let mut next = graph.clone();
    let mut transitions = Vec::new();

    if next.slice().is_none() {
        next.set_slice(Slice {
            slice_id: doc.slice_id.clone(),
            name: doc.slice_id.clone(),
            state: SliceState::Configuring,
            created_at: now,
            owner: None,
            lease_end: None,
        });
    }

    if doc.state == SliceState::Dead {
        for resource in next.resources_mut() {
            let from = resource.state();
            resource
                .apply(ReservationInput::SliceDied, now)
                .map_err(|e| SliceError::inconsistent(&slice_id, e.to_string()))?;
            if resource.state() != from {
                transitions.push(ResourceTransition {
                    local_id: resource.local_id.clone(),
                    from,
                    to: resource.state(),
                });
            }
        }
    } else {
        for status in &doc.resources {
            let resource = next.resource_mut(&status.local_id).ok_or_else(|| {
                SliceError::inconsistent(
                    &slice_id,
                    format!("status reports unknown sliver {}", status.local_id),
                )
            })?;

            let from = resource.state();
            let input = from
                .input_for_report(status.state, status.error.as_deref())
                .map_err(|e| {
                    SliceError::inconsistent(&slice_id, format!("{}: {e}", status.local_id))
                })?;
            if let Some(input) = input {
                resource
                    .apply(input, now)
                    .map_err(|e| SliceError::inconsistent(&slice_id, format!("{}: {e}", status.local_id)))?;
                transitions.push(ResourceTransition {
                    local_id: status.local_id.clone(),
                    from,
                    to: resource.state(),
                });
            }

            if let Some(global_id) = &status.global_id {
                match &resource.global_id {
                    Some(known) if known != global_id => {
                        return Err(SliceError::inconsistent(
                            &slice_id,
                            format!(
                                "{} changed global id from {known} to {global_id}",
                                status.local_id
                            ),
                        ))
                    }
                    _ => resource.global_id = Some(global_id.clone()),
                }
            }
            if status.site.is_some() {
                resource.site = status.site.clone();
            }
            if status.management_ip.is_some() {
                resource.management_ip = status.management_ip;
            }
            if status.gateway.is_some() {
                resource.gateway = status.gateway;
            }
            if status.subnet.is_some() {
                resource.subnet = status.subnet;
            }
        }

        // Removed slivers may simply disappear from the document
        for resource in next.resources_mut() {
            if resource.pending_removal && doc.resource(&resource.local_id).is_none() {
                let from = resource.state();
                resource
                    .apply(ReservationInput::Close, now)
                    .map_err(|e| SliceError::inconsistent(&slice_id, e.to_string()))?;
                transitions.push(ResourceTransition {
                    local_id: resource.local_id.clone(),
                    from,
                    to: resource.state(),
                });
            }
        }
    }

    let all_settled = next.is_settled();
    let observed = doc.state.guarded(all_settled);
    if observed != doc.state {
        warn!(
            "Slice {} reported {} with unsettled resources, treating as {}",
            slice_id, doc.state, observed
        );
    }

    let slice_state = match next.slice_mut() {
        Some(slice) => {
            let (state, ()) = slice.state.transition(&observed).map_err(|e| {
                SliceError::inconsistent(&slice_id, format!("slice state: {e}"))
            })?;
            slice.state = state;
            if doc.owner.is_some() {
                slice.owner = doc.owner.clone();
            }
            if doc.lease_end.is_some() {
                slice.lease_end = doc.lease_end;
            }
            state
        }
        None => observed,
    };
    next.set_round(round);

    let report = RoundReport {
        round,
        slice_state,
        transitions,
        settled: next.resources().filter(|r| r.state().is_settled()).count(),
        total: next.len(),
    };
    Ok((next, report))
}

/// Record connectivity results for nodes
pub(crate) fn apply_reachability(
    graph: &TopologyGraph,
    outcomes: &[ReachabilityOutcome],
    now: DateTime<Utc>,
) -> TopologyGraph {
    let mut next = graph.clone();
    for outcome in outcomes {
        let Some(resource) = next.resource_mut(&outcome.node) else {
            debug!("Ignoring reachability for unknown node {}", outcome.node);
            continue;
        };
        let input = match &outcome.result {
            Ok(()) => ReservationInput::Reach,
            Err(cause) => ReservationInput::Unreachable {
                cause: cause.clone(),
            },
        };
        if let Err(e) = resource.apply(input, now) {
            debug!("Skipping reachability for {}: {}", outcome.node, e);
        }
    }
    next
}

/// Record an accepted modification: new resources appear as Ticketed and
/// removals are flagged until the control plane closes them
pub(crate) fn apply_modification(graph: &TopologyGraph, plan: &ProvisioningPlan) -> TopologyGraph {
    let mut next = graph.clone();
    next.apply_plan(plan);
    if let Some(slice) = next.slice_mut() {
        slice.state = SliceState::Configuring;
    }
    next
}

/// Record an accepted deletion
pub(crate) fn apply_deletion(graph: &TopologyGraph, now: DateTime<Utc>) -> TopologyGraph {
    let mut next = graph.clone();
    for resource in next.resources_mut() {
        if !resource.state().is_terminal() {
            // Close is accepted from every non-terminal state
            let _ = resource.apply(ReservationInput::Close, now);
        }
    }
    if let Some(slice) = next.slice_mut() {
        slice.state = SliceState::Closed;
    }
    next
}

/// Management addresses of nodes that ended up unreachable
pub(crate) fn unreachable_nodes(graph: &TopologyGraph) -> Vec<(String, Option<IpAddr>)> {
    graph
        .nodes()
        .filter(|n| n.state() == ReservationState::ActiveUnreachable)
        .map(|n| (n.local_id.clone(), n.management_ip))
        .collect()
}
