// Copyright (c) 2025 - Cowboy AI, Inc.
//! Submission planning through the public API
//!
//! Covers operation ordering, network service selection, VLAN defaulting,
//! address assignment and request determinism.

mod fixtures;

use std::net::IpAddr;
use test_case::test_case;

use fixtures::two_node_spec;
use slice_orchestrator::control_plane::SubmitRequest;
use slice_orchestrator::domain::ComponentModel;
use slice_orchestrator::{
    plan_create, AddressRequest, InterfaceSpec, NetworkSegmentSpec, NodeSpec, ProvisioningOp,
    ProvisioningPlan, ResourceSpec, ServiceType, SliceError, Subnet, VlanId,
};

fn segment_op(plan: &ProvisioningPlan, id: &str) -> (ServiceType, Option<IpAddr>) {
    plan.operations()
        .iter()
        .find_map(|op| match op {
            ProvisioningOp::CreateSegment {
                segment,
                service_type,
                gateway,
            } if segment.local_id == id => Some((*service_type, *gateway)),
            _ => None,
        })
        .expect("segment operation")
}

fn interface_op(plan: &ProvisioningPlan, id: &str) -> (Option<VlanId>, Option<IpAddr>) {
    plan.operations()
        .iter()
        .find_map(|op| match op {
            ProvisioningOp::CreateInterface {
                interface,
                vlan,
                address,
            } if interface.local_id == id => Some((*vlan, *address)),
            _ => None,
        })
        .expect("interface operation")
}

/// One ConnectX node per site, all attached to segment `seg`
fn spread_spec(sites: &[&str]) -> ResourceSpec {
    let mut spec = ResourceSpec::new();
    spec.add_network_segment(NetworkSegmentSpec::l2("seg")).unwrap();
    for (i, site) in sites.iter().enumerate() {
        let node = format!("n{i}");
        spec.add_node(
            NodeSpec::new(node.as_str())
                .with_site(*site)
                .with_component("nic", ComponentModel::NicConnectX6),
        )
        .unwrap();
        spec.add_interface(InterfaceSpec::new(format!("{node}-p1"), node.as_str(), "seg").via_component("nic"))
            .unwrap();
    }
    spec
}

#[test]
fn test_segment_precedes_its_interfaces() {
    let plan = plan_create(&two_node_spec()).unwrap();

    let ids: Vec<_> = plan.operations().iter().map(|op| op.local_id()).collect();
    pretty_assertions::assert_eq!(ids, vec!["n1", "n2", "net", "n1-eth", "n2-eth"]);
    pretty_assertions::assert_eq!(segment_op(&plan, "net").0, ServiceType::L2Bridge);
}

#[test_case(&["RENC"] => ServiceType::L2Bridge ; "single site bridges")]
#[test_case(&["RENC", "RENC"] => ServiceType::L2Bridge ; "same site twice bridges")]
#[test_case(&["RENC", "UKY"] => ServiceType::L2STS ; "two sites without route")]
fn test_automatic_service_selection(sites: &[&str]) -> ServiceType {
    let plan = plan_create(&spread_spec(sites)).unwrap();
    segment_op(&plan, "seg").0
}

#[test]
fn test_three_sites_cannot_share_an_l2_segment() {
    let err = plan_create(&spread_spec(&["RENC", "UKY", "STAR"])).unwrap_err();
    assert!(matches!(err, SliceError::InvalidNetworkService { ref segment, .. } if segment == "seg"));
}

#[test]
fn test_routed_wan_link_becomes_ptp_with_default_vlans() {
    let mut spec = spread_spec(&["RENC", "UKY"]);
    spec.set_route_hops("seg", vec!["STAR".to_string()]).unwrap();

    let plan = plan_create(&spec).unwrap();

    pretty_assertions::assert_eq!(segment_op(&plan, "seg").0, ServiceType::L2PTP);
    let default_vlan = Some(VlanId::new(100).unwrap());
    pretty_assertions::assert_eq!(interface_op(&plan, "n0-p1").0, default_vlan);
    pretty_assertions::assert_eq!(interface_op(&plan, "n1-p1").0, default_vlan);
}

#[test]
fn test_ptp_copies_the_only_vlan_given() {
    let mut spec = spread_spec(&["RENC", "UKY"]);
    spec.remove_interface("n1-p1").unwrap();
    spec.add_interface(
        InterfaceSpec::new("n1-p1", "n1", "seg")
            .via_component("nic")
            .with_vlan(VlanId::new(321).unwrap()),
    )
    .unwrap();
    spec.set_route_hops("seg", vec!["STAR".to_string()]).unwrap();

    let plan = plan_create(&spec).unwrap();

    pretty_assertions::assert_eq!(interface_op(&plan, "n0-p1").0, VlanId::new(321).ok());
}

#[test]
fn test_basic_nics_on_one_host_cannot_share_sts() {
    let mut spec = ResourceSpec::new();
    spec.add_network_segment(
        NetworkSegmentSpec::l2("wan").with_service_type(ServiceType::L2STS),
    )
    .unwrap();
    for (node, site) in [("a", "RENC"), ("b", "RENC"), ("c", "UKY")] {
        spec.add_node(
            NodeSpec::new(node)
                .with_site(site)
                .with_host(format!("{site}-w1"))
                .with_component("nic", ComponentModel::NicBasic),
        )
        .unwrap();
        spec.add_interface(InterfaceSpec::new(format!("{node}-eth"), node, "wan").via_component("nic"))
            .unwrap();
    }

    assert!(matches!(
        plan_create(&spec),
        Err(SliceError::InvalidNetworkService { .. })
    ));
}

#[test]
fn test_l3_segment_gets_gateway_and_addresses() {
    let subnet = Subnet::new("10.128.4.0/24").unwrap();
    let mut spec = ResourceSpec::new();
    spec.add_network_segment(NetworkSegmentSpec::l3("v4", ServiceType::FABNetv4).with_subnet(subnet))
        .unwrap();
    for node in ["n1", "n2"] {
        spec.add_node(NodeSpec::new(node).with_site("RENC")).unwrap();
        spec.add_interface(
            InterfaceSpec::new(format!("{node}-eth"), node, "v4").with_address(AddressRequest::Auto),
        )
        .unwrap();
    }

    let plan = plan_create(&spec).unwrap();

    pretty_assertions::assert_eq!(segment_op(&plan, "v4"), (ServiceType::FABNetv4, subnet.gateway()));
    pretty_assertions::assert_eq!(interface_op(&plan, "n1-eth").1, "10.128.4.2".parse().ok());
    pretty_assertions::assert_eq!(interface_op(&plan, "n2-eth").1, "10.128.4.3".parse().ok());
}

#[test]
fn test_explicit_address_outside_subnet_conflicts() {
    let subnet = Subnet::new("10.128.4.0/24").unwrap();
    let mut spec = ResourceSpec::new();
    spec.add_network_segment(NetworkSegmentSpec::l3("v4", ServiceType::FABNetv4).with_subnet(subnet))
        .unwrap();
    spec.add_node(NodeSpec::new("n1").with_site("RENC")).unwrap();
    spec.add_interface(
        InterfaceSpec::new("n1-eth", "n1", "v4")
            .with_address(AddressRequest::Explicit("192.168.1.9".parse().unwrap())),
    )
    .unwrap();

    assert!(matches!(plan_create(&spec), Err(SliceError::Conflict(_))));
}

#[test]
fn test_peer_segment_is_requested_first() {
    let mut spec = ResourceSpec::new();
    spec.add_network_segment(NetworkSegmentSpec::l3("a-v4", ServiceType::FABNetv4))
        .unwrap();
    spec.add_network_segment(NetworkSegmentSpec::l3("b-vpn", ServiceType::L3VPN))
        .unwrap();
    spec.peer_segments("a-v4", "b-vpn").unwrap();

    let plan = plan_create(&spec).unwrap();

    assert!(plan.position("b-vpn").unwrap() < plan.position("a-v4").unwrap());
}

#[test]
fn test_insertion_order_does_not_change_the_request() {
    let forward = two_node_spec();
    let mut reverse = ResourceSpec::new();
    reverse.add_network_segment(NetworkSegmentSpec::l2("net")).unwrap();
    reverse.add_node(NodeSpec::new("n2").with_site("RENC")).unwrap();
    reverse.add_node(NodeSpec::new("n1").with_site("RENC")).unwrap();
    reverse.add_interface(InterfaceSpec::new("n2-eth", "n2", "net")).unwrap();
    reverse.add_interface(InterfaceSpec::new("n1-eth", "n1", "net")).unwrap();

    pretty_assertions::assert_eq!(
        forward.to_request_document().unwrap(),
        reverse.to_request_document().unwrap()
    );

    let a = SubmitRequest::new("exp", &forward, &plan_create(&forward).unwrap()).unwrap();
    let b = SubmitRequest::new("exp", &reverse, &plan_create(&reverse).unwrap()).unwrap();
    pretty_assertions::assert_eq!(a, b);

    let renamed = SubmitRequest::new("other", &forward, &plan_create(&forward).unwrap()).unwrap();
    assert_ne!(a.request_id, renamed.request_id);
}

#[test]
fn test_interface_through_non_nic_component_is_rejected() {
    let mut spec = ResourceSpec::new();
    spec.add_node(NodeSpec::new("n1").with_component("gpu", ComponentModel::GpuA30))
        .unwrap();
    spec.add_network_segment(NetworkSegmentSpec::l2("net")).unwrap();

    let err = spec
        .add_interface(InterfaceSpec::new("n1-eth", "n1", "net").via_component("gpu"))
        .unwrap_err();
    assert!(matches!(err, SliceError::Reference { .. }));
    assert!(spec.interface("n1-eth").is_none());
}
