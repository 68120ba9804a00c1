// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test fixtures for slice-orchestrator
//!
//! Deterministic specs, status documents and fast configurations shared by
//! the integration tests. Poll and retry intervals are a few milliseconds
//! so scenarios run in real time without paused clocks.

#![allow(dead_code)]

use serde_json::Value;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use slice_orchestrator::connectivity::ScriptedTransport;
use slice_orchestrator::control_plane::{ScriptedControlPlane, StatusBuilder};
use slice_orchestrator::{
    Credentials, InterfaceSpec, NetworkSegmentSpec, NodeSpec, OrchestratorConfig, PollConfig,
    ResourceSpec, RetryPolicy, SliceOrchestrator, SubmitConfig,
};

pub const SLICE_ID: &str = "S1";
pub const SITE: &str = "RENC";

pub fn management_ip(last: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(10, 20, 0, last))
}

/// Two nodes on one L2 segment
pub fn two_node_spec() -> ResourceSpec {
    let mut spec = ResourceSpec::new();
    spec.add_node(NodeSpec::new("n1").with_site(SITE)).unwrap();
    spec.add_node(NodeSpec::new("n2").with_site(SITE)).unwrap();
    spec.add_network_segment(NetworkSegmentSpec::l2("net")).unwrap();
    spec.add_interface(InterfaceSpec::new("n1-eth", "n1", "net"))
        .unwrap();
    spec.add_interface(InterfaceSpec::new("n2-eth", "n2", "net"))
        .unwrap();
    spec
}

pub fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        poll: PollConfig {
            interval_ms: 10,
            backoff_factor: 2.0,
            max_interval_ms: 40,
            round_timeout_ms: 500,
        },
        connect: RetryPolicy {
            max_attempts: 3,
            base_ms: 1,
            factor: 2.0,
            jitter_percent: 0.0,
            max_ms: 10,
            attempt_timeout_ms: 500,
        },
        submit: SubmitConfig {
            max_attempts: 3,
            base_ms: 1,
        },
        provisioning_timeout_secs: 5,
    }
}

pub fn credentials() -> Credentials {
    Credentials::new("ubuntu", "/home/exp/.ssh/slice_key").via_bastion("bastion.example.net")
}

pub fn orchestrator(
    control_plane: Arc<ScriptedControlPlane>,
    transport: Arc<ScriptedTransport>,
) -> SliceOrchestrator {
    SliceOrchestrator::new(control_plane, transport, credentials(), fast_config())
}

/// Status of the two-node slice with every sliver in `state`
///
/// Nodes carry management addresses once Active.
pub fn two_node_status(slice_state: &str, state: &str) -> Value {
    let builder = StatusBuilder::new(SLICE_ID, slice_state);
    let builder = if state == "Active" {
        builder
            .node("n1", state, &management_ip(1).to_string())
            .node("n2", state, &management_ip(2).to_string())
    } else {
        builder.sliver("n1", state).sliver("n2", state)
    };
    builder
        .sliver("net", state)
        .sliver("n1-eth", state)
        .sliver("n2-eth", state)
        .build()
}

/// A control plane that walks the two-node slice to StableOK in three rounds
pub async fn provisioning_control_plane() -> Arc<ScriptedControlPlane> {
    let control_plane = Arc::new(ScriptedControlPlane::new(SLICE_ID));
    control_plane
        .push_status(two_node_status("Configuring", "Ticketed"))
        .await;
    control_plane
        .push_status(two_node_status("Configuring", "Provisioning"))
        .await;
    control_plane
        .push_status(two_node_status("StableOK", "Active"))
        .await;
    control_plane
}
