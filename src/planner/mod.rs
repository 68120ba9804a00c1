// Copyright (c) 2025 - Cowboy AI, Inc.
//! Submission Planner
//!
//! Turns a [`ResourceSpec`] (create) or a [`SliceDelta`] against a live
//! slice (modify) into an ordered list of provisioning operations.
//!
//! Planning is pure: no I/O happens here, and the same inputs always give
//! the same plan, so a failed submission can be retried with the plan it
//! already has.
//!
//! # Ordering
//!
//! - a segment is requested after the segment it peers with
//! - an interface is requested after its node and its segment
//! - removals come first, dependents before what they depend on
//!
//! # Modification rules
//!
//! - added local_ids must not exist in the slice yet
//! - removed resources must have settled as Active or Failed; removing a
//!   node or segment also removes its interfaces

mod order;
mod resolve;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use crate::domain::{
    InterfaceSpec, LocalId, NetworkSegmentSpec, NodeSpec, ResourceSpec, ServiceType, VlanId,
};
use crate::errors::{SliceError, SliceResult};
use crate::topology::{ResourceKind, TopologyGraph};

use order::{topological_order, Dependent};

/// One provisioning step sent to the control plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ProvisioningOp {
    CreateNode {
        node: NodeSpec,
    },
    CreateSegment {
        segment: NetworkSegmentSpec,
        service_type: ServiceType,
        gateway: Option<IpAddr>,
    },
    CreateInterface {
        interface: InterfaceSpec,
        vlan: Option<VlanId>,
        address: Option<IpAddr>,
    },
    Remove {
        local_id: LocalId,
        kind: ResourceKind,
    },
}

impl ProvisioningOp {
    pub fn local_id(&self) -> &str {
        match self {
            Self::CreateNode { node } => &node.local_id,
            Self::CreateSegment { segment, .. } => &segment.local_id,
            Self::CreateInterface { interface, .. } => &interface.local_id,
            Self::Remove { local_id, .. } => local_id,
        }
    }

    pub fn is_removal(&self) -> bool {
        matches!(self, Self::Remove { .. })
    }
}

/// Ordered operations for one submission
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningPlan {
    operations: Vec<ProvisioningOp>,
}

impl ProvisioningPlan {
    pub fn operations(&self) -> &[ProvisioningOp] {
        &self.operations
    }

    /// Index of the operation touching `local_id`
    pub fn position(&self, local_id: &str) -> Option<usize> {
        self.operations.iter().position(|op| op.local_id() == local_id)
    }

    pub fn removals(&self) -> impl Iterator<Item = &ProvisioningOp> {
        self.operations.iter().filter(|op| op.is_removal())
    }

    pub fn additions(&self) -> impl Iterator<Item = &ProvisioningOp> {
        self.operations.iter().filter(|op| !op.is_removal())
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Changes requested against a provisioned slice
///
/// Additions may reference resources that already exist in the slice, so
/// they are collected here and validated by the planner rather than by a
/// standalone [`ResourceSpec`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceDelta {
    pub nodes: Vec<NodeSpec>,
    pub segments: Vec<NetworkSegmentSpec>,
    pub interfaces: Vec<InterfaceSpec>,
    pub removals: Vec<LocalId>,
}

impl SliceDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(mut self, node: NodeSpec) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn add_network_segment(mut self, segment: NetworkSegmentSpec) -> Self {
        self.segments.push(segment);
        self
    }

    pub fn add_interface(mut self, interface: InterfaceSpec) -> Self {
        self.interfaces.push(interface);
        self
    }

    pub fn remove(mut self, local_id: impl Into<LocalId>) -> Self {
        self.removals.push(local_id.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
            && self.segments.is_empty()
            && self.interfaces.is_empty()
            && self.removals.is_empty()
    }

    fn added_ids(&self) -> impl Iterator<Item = &LocalId> {
        self.nodes
            .iter()
            .map(|n| &n.local_id)
            .chain(self.segments.iter().map(|s| &s.local_id))
            .chain(self.interfaces.iter().map(|i| &i.local_id))
    }
}

/// Result of planning a modification
#[derive(Debug, Clone)]
pub struct ModifyPlan {
    pub plan: ProvisioningPlan,
    /// The slice's request once the modification is accepted
    pub spec: ResourceSpec,
}

/// Plan the initial provisioning of a spec
pub fn plan_create(spec: &ResourceSpec) -> SliceResult<ProvisioningPlan> {
    let added: BTreeSet<LocalId> = spec
        .nodes()
        .map(|n| n.local_id.clone())
        .chain(spec.segments().map(|s| s.local_id.clone()))
        .chain(spec.interfaces().map(|i| i.local_id.clone()))
        .collect();

    let operations = plan_additions(spec, &added, None, &[])?;
    Ok(ProvisioningPlan { operations })
}

/// Plan a modification of a provisioned slice
///
/// `spec` is the request the slice currently implements and `graph` its
/// live state.
pub fn plan_modify(
    spec: &ResourceSpec,
    graph: &TopologyGraph,
    delta: &SliceDelta,
) -> SliceResult<ModifyPlan> {
    let removed = removal_set(spec, graph, &delta.removals)?;

    for id in delta.added_ids() {
        if graph.resource(id).is_some() {
            return Err(SliceError::Conflict(format!(
                "{id} already exists in the slice"
            )));
        }
    }

    let mut target = spec.clone();
    for (kind, id) in &removed {
        let result = match kind {
            ResourceKind::Interface => target.remove_interface(id).map(|_| ()),
            ResourceKind::NetworkSegment => target.remove_network_segment(id).map(|_| ()),
            ResourceKind::Node => target.remove_node(id).map(|_| ()),
        };
        result?;
    }

    for node in &delta.nodes {
        target.add_node(node.clone())?;
    }
    for segment in &delta.segments {
        let mut unpeered = segment.clone();
        unpeered.peer = None;
        target.add_network_segment(unpeered)?;
    }
    for interface in &delta.interfaces {
        target.add_interface(interface.clone())?;
    }
    for segment in &delta.segments {
        if let Some(peer) = &segment.peer {
            target.peer_segments(&segment.local_id, peer)?;
        }
    }

    let released: Vec<IpAddr> = removed
        .iter()
        .filter_map(|(_, id)| graph.resource(id).and_then(|r| r.address))
        .collect();

    let added: BTreeSet<LocalId> = delta.added_ids().cloned().collect();
    let mut operations = removal_ops(spec, &removed)?;
    operations.extend(plan_additions(&target, &added, Some(graph), &released)?);

    Ok(ModifyPlan {
        plan: ProvisioningPlan { operations },
        spec: target,
    })
}

/// Removal targets plus cascaded interfaces, interfaces first
fn removal_set(
    spec: &ResourceSpec,
    graph: &TopologyGraph,
    removals: &[LocalId],
) -> SliceResult<Vec<(ResourceKind, LocalId)>> {
    let mut set: BTreeSet<(ResourceKind, LocalId)> = BTreeSet::new();

    for id in removals {
        let resource = graph
            .resource(id)
            .ok_or_else(|| SliceError::reference("resource", id.as_str()))?;
        set.insert((resource.kind, id.clone()));
        let cascade: Vec<&InterfaceSpec> = match resource.kind {
            ResourceKind::Node => spec.interfaces_of_node(id).collect(),
            ResourceKind::NetworkSegment => spec.interfaces_on_segment(id).collect(),
            ResourceKind::Interface => Vec::new(),
        };
        for iface in cascade {
            set.insert((ResourceKind::Interface, iface.local_id.clone()));
        }
    }

    for (_, id) in &set {
        let resource = graph
            .resource(id)
            .ok_or_else(|| SliceError::reference("resource", id.as_str()))?;
        let state = resource.state();
        if !state.is_settled() {
            return Err(SliceError::Conflict(format!(
                "{id} is still provisioning ({state})"
            )));
        }
        if state.is_terminal() || resource.pending_removal {
            return Err(SliceError::Conflict(format!("{id} is already {state}")));
        }
    }

    let mut ordered: Vec<_> = set.into_iter().collect();
    ordered.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    Ok(ordered)
}

/// Removal operations, dependents before the resources they depend on
fn removal_ops(
    spec: &ResourceSpec,
    removed: &[(ResourceKind, LocalId)],
) -> SliceResult<Vec<ProvisioningOp>> {
    let items: BTreeMap<LocalId, Dependent> = removed
        .iter()
        .map(|(kind, id)| {
            let after = match kind {
                ResourceKind::NetworkSegment => spec
                    .segment(id)
                    .and_then(|s| s.peer.clone())
                    .into_iter()
                    .collect(),
                _ => Vec::new(),
            };
            (id.clone(), Dependent { kind: *kind, after })
        })
        .collect();

    let mut order = topological_order(&items)?;
    order.reverse();
    order.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(order
        .into_iter()
        .map(|(kind, local_id)| ProvisioningOp::Remove { local_id, kind })
        .collect())
}

fn plan_additions(
    spec: &ResourceSpec,
    added: &BTreeSet<LocalId>,
    graph: Option<&TopologyGraph>,
    released: &[IpAddr],
) -> SliceResult<Vec<ProvisioningOp>> {
    let mut items = BTreeMap::new();
    for node in spec.nodes().filter(|n| added.contains(&n.local_id)) {
        items.insert(
            node.local_id.clone(),
            Dependent {
                kind: ResourceKind::Node,
                after: Vec::new(),
            },
        );
    }
    for segment in spec.segments().filter(|s| added.contains(&s.local_id)) {
        if let Some(peer) = &segment.peer {
            if spec.segment(peer).is_none() {
                return Err(SliceError::reference("segment", peer.as_str()));
            }
        }
        items.insert(
            segment.local_id.clone(),
            Dependent {
                kind: ResourceKind::NetworkSegment,
                after: segment.peer.iter().cloned().collect(),
            },
        );
    }
    for iface in spec.interfaces().filter(|i| added.contains(&i.local_id)) {
        if spec.node(&iface.node).is_none() {
            return Err(SliceError::reference("node", iface.node.as_str()));
        }
        if spec.segment(&iface.segment).is_none() {
            return Err(SliceError::reference("segment", iface.segment.as_str()));
        }
        items.insert(
            iface.local_id.clone(),
            Dependent {
                kind: ResourceKind::Interface,
                after: vec![iface.node.clone(), iface.segment.clone()],
            },
        );
    }

    let order = topological_order(&items)?;

    // Segments that are new or gain interfaces get their service re-checked
    let touched: BTreeSet<&str> = spec
        .segments()
        .filter(|s| added.contains(&s.local_id))
        .map(|s| s.local_id.as_str())
        .chain(
            spec.interfaces()
                .filter(|i| added.contains(&i.local_id))
                .map(|i| i.segment.as_str()),
        )
        .collect();

    let mut service_types = BTreeMap::new();
    let mut vlans = BTreeMap::new();
    let mut addresses = BTreeMap::new();
    for segment_id in touched {
        let Some(segment) = spec.segment(segment_id) else {
            continue;
        };
        let known = graph
            .and_then(|g| g.resource(segment_id))
            .and_then(|r| r.service_type);
        let service_type = resolve::resolve_service(spec, segment, known)?;
        service_types.insert(segment_id.to_string(), service_type);

        vlans.extend(resolve::resolve_vlans(spec, segment_id, service_type, |id| {
            graph.and_then(|g| g.resource(id)).and_then(|r| r.vlan)
        }));

        let in_use: Vec<IpAddr> = spec
            .interfaces_on_segment(segment_id)
            .filter(|i| !added.contains(&i.local_id))
            .filter_map(|i| graph.and_then(|g| g.resource(&i.local_id)).and_then(|r| r.address))
            .filter(|address| !released.contains(address))
            .collect();
        addresses.extend(resolve::assign_addresses(spec, segment, added, &in_use)?);
    }

    let mut operations = Vec::with_capacity(order.len());
    for (kind, id) in order {
        let op = match kind {
            ResourceKind::Node => spec
                .node(&id)
                .map(|node| ProvisioningOp::CreateNode { node: node.clone() }),
            ResourceKind::NetworkSegment => spec.segment(&id).and_then(|segment| {
                service_types
                    .get(&id)
                    .map(|service_type| ProvisioningOp::CreateSegment {
                        segment: segment.clone(),
                        service_type: *service_type,
                        gateway: segment.subnet.and_then(|s| s.gateway()),
                    })
            }),
            ResourceKind::Interface => {
                spec.interface(&id)
                    .map(|interface| ProvisioningOp::CreateInterface {
                        interface: interface.clone(),
                        vlan: vlans.get(&id).copied().flatten(),
                        address: addresses.get(&id).copied(),
                    })
            }
        };
        operations.push(op.ok_or_else(|| SliceError::reference("resource", id.as_str()))?);
    }

    Ok(operations)
}
