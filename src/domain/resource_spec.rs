// Copyright (c) 2025 - Cowboy AI, Inc.
//! ResourceSpec - Draft Slice Topology
//!
//! A mutable, id-indexed draft of the resources a caller wants: nodes,
//! network segments and the interfaces linking them. Records live in
//! `BTreeMap` arenas keyed by local_id, so interfaces refer to nodes and
//! segments by id rather than by pointer, and iteration (and therefore
//! serialization) order is stable.
//!
//! # Invariants
//!
//! - local_ids are unique across nodes, segments and interfaces
//! - every interface names one existing node and one existing segment
//! - a failed mutation leaves the spec unchanged
//!
//! # Example
//!
//! ```rust
//! use slice_orchestrator::domain::{InterfaceSpec, NetworkSegmentSpec, NodeSpec, ResourceSpec};
//!
//! let mut spec = ResourceSpec::new();
//! spec.add_node(NodeSpec::new("node1").with_site("RENC")).unwrap();
//! spec.add_network_segment(NetworkSegmentSpec::l2("net1")).unwrap();
//! spec.add_interface(InterfaceSpec::new("node1-eth1", "node1", "net1")).unwrap();
//!
//! assert!(spec.add_interface(InterfaceSpec::new("bad", "ghost", "net1")).is_err());
//! assert_eq!(spec.to_request_document().unwrap(), spec.to_request_document().unwrap());
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use uuid::Uuid;

use super::component::ComponentModel;
use super::network::{Subnet, VlanId};
use super::network_service::{NetworkLayer, ServiceType};
use crate::errors::{SliceError, SliceResult};

/// Caller-chosen identifier, unique within a spec and its slice
pub type LocalId = String;

/// Namespace for deterministic request ids
const REQUEST_NAMESPACE: Uuid = Uuid::from_u128(0x6a1c_52f0_8d3b_4e7a_9f21_0c5e_7b4d_1a90);

/// Compute sizing hints for a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capacities {
    pub cores: u32,
    pub ram_gb: u32,
    pub disk_gb: u32,
}

impl Default for Capacities {
    fn default() -> Self {
        Self {
            cores: 2,
            ram_gb: 8,
            disk_gb: 10,
        }
    }
}

/// Boot image reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub name: String,
    pub image_type: String,
}

impl Default for ImageRef {
    fn default() -> Self {
        Self {
            name: "default_rocky_8".to_string(),
            image_type: "qcow2".to_string(),
        }
    }
}

/// Named hardware component attached to a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentSpec {
    pub name: String,
    pub model: ComponentModel,
}

/// Requested compute node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub local_id: LocalId,
    /// Unresolved until the federation places the node
    pub site: Option<String>,
    /// Optional pinning to a physical worker
    pub host: Option<String>,
    pub capacities: Capacities,
    pub image: ImageRef,
    pub components: Vec<ComponentSpec>,
}

impl NodeSpec {
    pub fn new(local_id: impl Into<LocalId>) -> Self {
        Self {
            local_id: local_id.into(),
            site: None,
            host: None,
            capacities: Capacities::default(),
            image: ImageRef::default(),
            components: Vec::new(),
        }
    }

    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.site = Some(site.into());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_capacities(mut self, cores: u32, ram_gb: u32, disk_gb: u32) -> Self {
        self.capacities = Capacities {
            cores,
            ram_gb,
            disk_gb,
        };
        self
    }

    pub fn with_image(mut self, name: impl Into<String>, image_type: impl Into<String>) -> Self {
        self.image = ImageRef {
            name: name.into(),
            image_type: image_type.into(),
        };
        self
    }

    pub fn with_component(mut self, name: impl Into<String>, model: ComponentModel) -> Self {
        self.components.push(ComponentSpec {
            name: name.into(),
            model,
        });
        self
    }

    pub fn component(&self, name: &str) -> Option<&ComponentSpec> {
        self.components.iter().find(|c| c.name == name)
    }
}

/// Requested network segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSegmentSpec {
    pub local_id: LocalId,
    pub layer: NetworkLayer,
    /// Left empty on L2 segments to let the planner choose
    pub service_type: Option<ServiceType>,
    pub subnet: Option<Subnet>,
    /// Segment this one is peered with; it must be provisioned first
    pub peer: Option<LocalId>,
    /// Explicit site path for point-to-point L2 segments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub route_hops: Vec<String>,
}

impl NetworkSegmentSpec {
    pub fn l2(local_id: impl Into<LocalId>) -> Self {
        Self {
            local_id: local_id.into(),
            layer: NetworkLayer::L2,
            service_type: None,
            subnet: None,
            peer: None,
            route_hops: Vec::new(),
        }
    }

    pub fn l3(local_id: impl Into<LocalId>, service_type: ServiceType) -> Self {
        Self {
            local_id: local_id.into(),
            layer: NetworkLayer::L3,
            service_type: Some(service_type),
            subnet: None,
            peer: None,
            route_hops: Vec::new(),
        }
    }

    pub fn with_service_type(mut self, service_type: ServiceType) -> Self {
        self.layer = service_type.layer();
        self.service_type = Some(service_type);
        self
    }

    pub fn with_subnet(mut self, subnet: Subnet) -> Self {
        self.subnet = Some(subnet);
        self
    }
}

/// How an interface obtains its dataplane address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "address", rename_all = "snake_case")]
pub enum AddressRequest {
    #[default]
    Unmanaged,
    Auto,
    Explicit(IpAddr),
}

/// Link between one node and one segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceSpec {
    pub local_id: LocalId,
    pub node: LocalId,
    pub segment: LocalId,
    pub bandwidth_gbps: u32,
    pub vlan: Option<VlanId>,
    /// NIC component on the node this interface attaches through
    pub component: Option<String>,
    #[serde(default)]
    pub address: AddressRequest,
}

impl InterfaceSpec {
    pub fn new(
        local_id: impl Into<LocalId>,
        node: impl Into<LocalId>,
        segment: impl Into<LocalId>,
    ) -> Self {
        Self {
            local_id: local_id.into(),
            node: node.into(),
            segment: segment.into(),
            bandwidth_gbps: 10,
            vlan: None,
            component: None,
            address: AddressRequest::Unmanaged,
        }
    }

    pub fn with_bandwidth(mut self, gbps: u32) -> Self {
        self.bandwidth_gbps = gbps;
        self
    }

    pub fn with_vlan(mut self, vlan: VlanId) -> Self {
        self.vlan = Some(vlan);
        self
    }

    pub fn via_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn with_address(mut self, address: AddressRequest) -> Self {
        self.address = address;
        self
    }
}

/// Draft topology of a slice request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    nodes: BTreeMap<LocalId, NodeSpec>,
    segments: BTreeMap<LocalId, NetworkSegmentSpec>,
    interfaces: BTreeMap<LocalId, InterfaceSpec>,
}

impl ResourceSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any record uses `local_id`
    pub fn contains(&self, local_id: &str) -> bool {
        self.nodes.contains_key(local_id)
            || self.segments.contains_key(local_id)
            || self.interfaces.contains_key(local_id)
    }

    fn ensure_unused(&self, local_id: &str) -> SliceResult<()> {
        if self.contains(local_id) {
            return Err(SliceError::DuplicateId(local_id.to_string()));
        }
        Ok(())
    }

    pub fn add_node(&mut self, node: NodeSpec) -> SliceResult<()> {
        self.ensure_unused(&node.local_id)?;
        self.nodes.insert(node.local_id.clone(), node);
        Ok(())
    }

    pub fn add_network_segment(&mut self, segment: NetworkSegmentSpec) -> SliceResult<()> {
        self.ensure_unused(&segment.local_id)?;
        if let Some(peer) = &segment.peer {
            if !self.segments.contains_key(peer) {
                return Err(SliceError::reference("segment", peer.as_str()));
            }
        }
        self.segments.insert(segment.local_id.clone(), segment);
        Ok(())
    }

    /// Attach a node to a segment
    ///
    /// Fails with `Reference` when either endpoint, or the named NIC
    /// component, is unknown; the spec is untouched on failure.
    pub fn add_interface(&mut self, interface: InterfaceSpec) -> SliceResult<()> {
        let node = self
            .nodes
            .get(&interface.node)
            .ok_or_else(|| SliceError::reference("node", interface.node.as_str()))?;
        if !self.segments.contains_key(&interface.segment) {
            return Err(SliceError::reference("segment", interface.segment.as_str()));
        }
        if let Some(component) = &interface.component {
            match node.component(component) {
                Some(c) if c.model.is_nic() => {}
                _ => {
                    return Err(SliceError::reference(
                        "nic component",
                        format!("{}.{}", interface.node, component),
                    ))
                }
            }
        }
        self.ensure_unused(&interface.local_id)?;
        self.interfaces.insert(interface.local_id.clone(), interface);
        Ok(())
    }

    /// Remove a node together with every interface attached to it
    pub fn remove_node(&mut self, local_id: &str) -> SliceResult<NodeSpec> {
        let node = self
            .nodes
            .remove(local_id)
            .ok_or_else(|| SliceError::reference("node", local_id))?;
        self.interfaces.retain(|_, iface| iface.node != local_id);
        Ok(node)
    }

    /// Remove a segment, its interfaces, and any peering that points at it
    pub fn remove_network_segment(&mut self, local_id: &str) -> SliceResult<NetworkSegmentSpec> {
        let segment = self
            .segments
            .remove(local_id)
            .ok_or_else(|| SliceError::reference("segment", local_id))?;
        self.interfaces.retain(|_, iface| iface.segment != local_id);
        for other in self.segments.values_mut() {
            if other.peer.as_deref() == Some(local_id) {
                other.peer = None;
            }
        }
        Ok(segment)
    }

    pub fn remove_interface(&mut self, local_id: &str) -> SliceResult<InterfaceSpec> {
        self.interfaces
            .remove(local_id)
            .ok_or_else(|| SliceError::reference("interface", local_id))
    }

    /// Peer `segment` with `peer`; `peer` must be provisioned first
    pub fn peer_segments(&mut self, segment: &str, peer: &str) -> SliceResult<()> {
        if segment == peer {
            return Err(SliceError::CyclicSpec {
                remaining: vec![segment.to_string()],
            });
        }
        if !self.segments.contains_key(peer) {
            return Err(SliceError::reference("segment", peer));
        }
        let record = self
            .segments
            .get_mut(segment)
            .ok_or_else(|| SliceError::reference("segment", segment))?;
        record.peer = Some(peer.to_string());
        Ok(())
    }

    /// Request an explicit site path for a point-to-point L2 segment
    pub fn set_route_hops(&mut self, segment: &str, hops: Vec<String>) -> SliceResult<()> {
        let attached = self.interfaces_on_segment(segment).count();
        let record = self
            .segments
            .get_mut(segment)
            .ok_or_else(|| SliceError::reference("segment", segment))?;
        if hops.is_empty() {
            record.route_hops.clear();
            return Ok(());
        }
        let p2p_type = record
            .service_type
            .map_or(record.layer == NetworkLayer::L2, |t| t.supports_route_hops());
        if attached != 2 || !p2p_type {
            return Err(SliceError::InvalidNetworkService {
                segment: segment.to_string(),
                reason: "route hops need a point-to-point L2 segment with two interfaces"
                    .to_string(),
            });
        }
        record.route_hops = hops;
        Ok(())
    }

    pub fn node(&self, local_id: &str) -> Option<&NodeSpec> {
        self.nodes.get(local_id)
    }

    pub fn segment(&self, local_id: &str) -> Option<&NetworkSegmentSpec> {
        self.segments.get(local_id)
    }

    pub fn interface(&self, local_id: &str) -> Option<&InterfaceSpec> {
        self.interfaces.get(local_id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeSpec> {
        self.nodes.values()
    }

    pub fn segments(&self) -> impl Iterator<Item = &NetworkSegmentSpec> {
        self.segments.values()
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &InterfaceSpec> {
        self.interfaces.values()
    }

    pub fn interfaces_of_node<'a>(&'a self, node: &'a str) -> impl Iterator<Item = &'a InterfaceSpec> {
        self.interfaces.values().filter(move |i| i.node == node)
    }

    pub fn interfaces_on_segment<'a>(
        &'a self,
        segment: &'a str,
    ) -> impl Iterator<Item = &'a InterfaceSpec> {
        self.interfaces.values().filter(move |i| i.segment == segment)
    }

    /// Total number of records
    pub fn len(&self) -> usize {
        self.nodes.len() + self.segments.len() + self.interfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Canonical request serialization
    ///
    /// Identical specs always serialize to identical strings.
    pub fn to_request_document(&self) -> SliceResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a spec received from elsewhere; references are not checked
    pub fn from_request_document(document: &str) -> SliceResult<Self> {
        Ok(serde_json::from_str(document)?)
    }

    /// Stable identifier for idempotent submission of this exact spec
    pub fn request_id(&self) -> SliceResult<Uuid> {
        let document = self.to_request_document()?;
        Ok(Uuid::new_v5(&REQUEST_NAMESPACE, document.as_bytes()))
    }
}
