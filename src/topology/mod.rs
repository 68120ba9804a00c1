// Copyright (c) 2025 - Cowboy AI, Inc.
//! Topology Graph
//!
//! Canonical view of a slice's provisioned resources, keyed by the same
//! local_ids the caller used in its [`ResourceSpec`](crate::domain::ResourceSpec).
//! Each entry carries live reservation state; adjacency is kept as
//! id-indexed edge tables, never as mutual references.
//!
//! ```text
//! Node ──(interface)── NetworkSegment ──(peer)── NetworkSegment
//! ```
//!
//! Only the reconciliation engine mutates a graph, through the
//! [`TopologyStore`]; everyone else reads immutable snapshots.

mod store;

pub use store::{TopologyReader, TopologyStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

use crate::domain::{LocalId, ServiceType, Subnet, VlanId};
use crate::planner::{ProvisioningOp, ProvisioningPlan};
use crate::state_machine::{
    ReservationInput, ReservationState, SliceState, StateMachineWithHistory, Transition,
    TransitionOutput, TransitionResult,
};

/// Federation-assigned provisioning unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slice {
    pub slice_id: String,
    pub name: String,
    pub state: SliceState,
    pub created_at: DateTime<Utc>,
    pub owner: Option<String>,
    pub lease_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Node,
    NetworkSegment,
    Interface,
}

/// Interface adjacency: the node and segment an interface links
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceEdge {
    pub node: LocalId,
    pub segment: LocalId,
}

/// One resolved resource with live state
#[derive(Debug, Clone)]
pub struct ProvisionedResource {
    pub local_id: LocalId,
    pub kind: ResourceKind,
    pub global_id: Option<String>,
    pub site: Option<String>,
    pub management_ip: Option<IpAddr>,
    /// Diagnostic cause for failed or unreachable resources
    pub error: Option<String>,
    pub service_type: Option<ServiceType>,
    pub subnet: Option<Subnet>,
    pub gateway: Option<IpAddr>,
    pub vlan: Option<VlanId>,
    /// Dataplane address assigned by the planner
    pub address: Option<IpAddr>,
    pub pending_removal: bool,
    lifecycle: StateMachineWithHistory<ReservationState>,
}

impl ProvisionedResource {
    pub fn new(local_id: impl Into<LocalId>, kind: ResourceKind) -> Self {
        Self {
            local_id: local_id.into(),
            kind,
            global_id: None,
            site: None,
            management_ip: None,
            error: None,
            service_type: None,
            subnet: None,
            gateway: None,
            vlan: None,
            address: None,
            pending_removal: false,
            lifecycle: StateMachineWithHistory::new(ReservationState::Ticketed),
        }
    }

    pub fn state(&self) -> ReservationState {
        *self.lifecycle.current_state()
    }

    pub fn history(&self) -> &[Transition<ReservationState, ReservationInput>] {
        self.lifecycle.history()
    }

    /// Drive the reservation lifecycle, recording any diagnostic cause
    pub(crate) fn apply(
        &mut self,
        input: ReservationInput,
        at: DateTime<Utc>,
    ) -> TransitionResult<TransitionOutput> {
        let output = self.lifecycle.transition_with_history(input, at)?;
        match (&output.cause, self.state()) {
            (Some(cause), _) => self.error = Some(cause.clone()),
            (None, ReservationState::Reachable) => self.error = None,
            _ => {}
        }
        if self.state().is_terminal() {
            self.pending_removal = false;
        }
        Ok(output)
    }
}

/// Snapshot of a slice's resources and their adjacency
#[derive(Debug, Clone, Default)]
pub struct TopologyGraph {
    slice: Option<Slice>,
    resources: BTreeMap<LocalId, ProvisionedResource>,
    interfaces: BTreeMap<LocalId, InterfaceEdge>,
    peers: BTreeMap<LocalId, LocalId>,
    round: u64,
}

impl TopologyGraph {
    /// Seed a graph with every resource a plan creates, all Ticketed
    pub fn from_plan(plan: &ProvisioningPlan) -> Self {
        let mut graph = Self::default();
        graph.apply_plan(plan);
        graph
    }

    /// Record planned additions and mark planned removals
    pub(crate) fn apply_plan(&mut self, plan: &ProvisioningPlan) {
        for op in plan.operations() {
            match op {
                ProvisioningOp::CreateNode { node } => {
                    let mut resource = ProvisionedResource::new(&node.local_id, ResourceKind::Node);
                    resource.site = node.site.clone();
                    self.resources.insert(node.local_id.clone(), resource);
                }
                ProvisioningOp::CreateSegment {
                    segment,
                    service_type,
                    gateway,
                } => {
                    let mut resource =
                        ProvisionedResource::new(&segment.local_id, ResourceKind::NetworkSegment);
                    resource.service_type = Some(*service_type);
                    resource.subnet = segment.subnet;
                    resource.gateway = *gateway;
                    if let Some(peer) = &segment.peer {
                        self.peers.insert(segment.local_id.clone(), peer.clone());
                    }
                    self.resources.insert(segment.local_id.clone(), resource);
                }
                ProvisioningOp::CreateInterface {
                    interface,
                    vlan,
                    address,
                } => {
                    let mut resource =
                        ProvisionedResource::new(&interface.local_id, ResourceKind::Interface);
                    resource.vlan = *vlan;
                    resource.address = *address;
                    resource.site = self
                        .resources
                        .get(&interface.node)
                        .and_then(|node| node.site.clone());
                    self.interfaces.insert(
                        interface.local_id.clone(),
                        InterfaceEdge {
                            node: interface.node.clone(),
                            segment: interface.segment.clone(),
                        },
                    );
                    self.resources.insert(interface.local_id.clone(), resource);
                }
                ProvisioningOp::Remove { local_id, .. } => {
                    if let Some(resource) = self.resources.get_mut(local_id) {
                        resource.pending_removal = true;
                    }
                }
            }
        }
    }

    pub fn slice(&self) -> Option<&Slice> {
        self.slice.as_ref()
    }

    pub(crate) fn set_slice(&mut self, slice: Slice) {
        self.slice = Some(slice);
    }

    pub(crate) fn slice_mut(&mut self) -> Option<&mut Slice> {
        self.slice.as_mut()
    }

    /// Poll round whose merge produced this snapshot
    pub fn round(&self) -> u64 {
        self.round
    }

    pub(crate) fn set_round(&mut self, round: u64) {
        self.round = round;
    }

    pub fn resource(&self, local_id: &str) -> Option<&ProvisionedResource> {
        self.resources.get(local_id)
    }

    pub(crate) fn resource_mut(&mut self, local_id: &str) -> Option<&mut ProvisionedResource> {
        self.resources.get_mut(local_id)
    }

    pub fn resources(&self) -> impl Iterator<Item = &ProvisionedResource> {
        self.resources.values()
    }

    pub(crate) fn resources_mut(&mut self) -> impl Iterator<Item = &mut ProvisionedResource> {
        self.resources.values_mut()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ProvisionedResource> {
        self.of_kind(ResourceKind::Node)
    }

    pub fn segments(&self) -> impl Iterator<Item = &ProvisionedResource> {
        self.of_kind(ResourceKind::NetworkSegment)
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &ProvisionedResource> {
        self.of_kind(ResourceKind::Interface)
    }

    fn of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &ProvisionedResource> {
        self.resources.values().filter(move |r| r.kind == kind)
    }

    /// Node and segment an interface links
    pub fn endpoints(&self, interface: &str) -> Option<&InterfaceEdge> {
        self.interfaces.get(interface)
    }

    pub fn interfaces_of<'a>(&'a self, node: &'a str) -> impl Iterator<Item = &'a LocalId> {
        self.interfaces
            .iter()
            .filter(move |(_, edge)| edge.node == node)
            .map(|(id, _)| id)
    }

    pub fn interfaces_on<'a>(&'a self, segment: &'a str) -> impl Iterator<Item = &'a LocalId> {
        self.interfaces
            .iter()
            .filter(move |(_, edge)| edge.segment == segment)
            .map(|(id, _)| id)
    }

    pub fn peer_of(&self, segment: &str) -> Option<&LocalId> {
        self.peers.get(segment)
    }

    /// Nodes the connectivity manager should try to reach
    pub fn connectable_nodes(&self) -> impl Iterator<Item = (&LocalId, IpAddr)> {
        self.nodes().filter_map(|node| match (node.state(), node.management_ip) {
            (ReservationState::Active | ReservationState::ActiveUnreachable, Some(ip)) => {
                Some((&node.local_id, ip))
            }
            _ => None,
        })
    }

    /// Every resource has settled and no removal is outstanding
    pub fn is_settled(&self) -> bool {
        self.resources
            .values()
            .all(|r| r.state().is_settled() && !r.pending_removal)
    }

    /// The slice is reported stable and every resource has settled
    pub fn is_stable(&self) -> bool {
        let slice_stable = self.slice.as_ref().map_or(true, |s| s.state.is_stable());
        slice_stable && self.is_settled()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn count_in(&self, state: ReservationState) -> usize {
        self.resources.values().filter(|r| r.state() == state).count()
    }
}
