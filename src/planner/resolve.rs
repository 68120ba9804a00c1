// Copyright (c) 2025 - Cowboy AI, Inc.
//! Segment service, VLAN and address resolution

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use crate::domain::{
    select_l2_service, validate_service, AddressRequest, IpAllocator, LocalId, NetworkLayer,
    NetworkSegmentSpec, ResourceSpec, ServiceEndpoint, ServiceType, VlanId,
};
use crate::errors::{SliceError, SliceResult};

fn endpoints(spec: &ResourceSpec, segment: &str) -> Vec<ServiceEndpoint> {
    spec.interfaces_on_segment(segment)
        .map(|iface| {
            let node = spec.node(&iface.node);
            ServiceEndpoint {
                interface: iface.local_id.clone(),
                node: iface.node.clone(),
                site: node.and_then(|n| n.site.clone()),
                host: node.and_then(|n| n.host.clone()),
                nic: iface
                    .component
                    .as_deref()
                    .and_then(|c| node.and_then(|n| n.component(c)))
                    .map(|c| c.model),
            }
        })
        .collect()
}

/// Decide and check the service type of a segment against all its interfaces
///
/// `known` is the type already provisioned for an existing segment.
pub(crate) fn resolve_service(
    spec: &ResourceSpec,
    segment: &NetworkSegmentSpec,
    known: Option<ServiceType>,
) -> SliceResult<ServiceType> {
    let endpoints = endpoints(spec, &segment.local_id);
    let service_type = match (segment.service_type.or(known), segment.layer) {
        (Some(service_type), _) => service_type,
        (None, NetworkLayer::L2) => {
            select_l2_service(&segment.local_id, &endpoints, !segment.route_hops.is_empty())?
        }
        (None, NetworkLayer::L3) => {
            return Err(SliceError::InvalidNetworkService {
                segment: segment.local_id.clone(),
                reason: "L3 segments need an explicit service type".to_string(),
            })
        }
    };

    if !segment.route_hops.is_empty() && !service_type.supports_route_hops() {
        return Err(SliceError::InvalidNetworkService {
            segment: segment.local_id.clone(),
            reason: format!("{service_type} does not accept route hops"),
        });
    }

    validate_service(&segment.local_id, service_type, &endpoints)?;
    Ok(service_type)
}

/// VLAN tag for every interface on a segment
///
/// Point-to-point circuits need matching tags: when neither end has one
/// both get the default, when one end has one the other copies it.
pub(crate) fn resolve_vlans(
    spec: &ResourceSpec,
    segment: &str,
    service_type: ServiceType,
    provisioned: impl Fn(&str) -> Option<VlanId>,
) -> BTreeMap<LocalId, Option<VlanId>> {
    let tagged: Vec<(LocalId, Option<VlanId>)> = spec
        .interfaces_on_segment(segment)
        .map(|iface| {
            let vlan = iface.vlan.or_else(|| provisioned(&iface.local_id));
            (iface.local_id.clone(), vlan)
        })
        .collect();

    if service_type != ServiceType::L2PTP {
        return tagged.into_iter().collect();
    }

    let shared = tagged
        .iter()
        .find_map(|(_, vlan)| *vlan)
        .unwrap_or(VlanId::P2P_DEFAULT);
    tagged
        .into_iter()
        .map(|(id, vlan)| (id, Some(vlan.unwrap_or(shared))))
        .collect()
}

/// Dataplane addresses for the newly added interfaces of one segment
///
/// `in_use` holds addresses of interfaces that stay provisioned. Explicit
/// requests are claimed before automatic ones.
pub(crate) fn assign_addresses(
    spec: &ResourceSpec,
    segment: &NetworkSegmentSpec,
    added: &BTreeSet<LocalId>,
    in_use: &[IpAddr],
) -> SliceResult<BTreeMap<LocalId, IpAddr>> {
    let requests: Vec<(&LocalId, AddressRequest)> = spec
        .interfaces_on_segment(&segment.local_id)
        .filter(|iface| added.contains(&iface.local_id))
        .filter(|iface| iface.address != AddressRequest::Unmanaged)
        .map(|iface| (&iface.local_id, iface.address))
        .collect();

    let mut assigned = BTreeMap::new();
    if requests.is_empty() {
        return Ok(assigned);
    }

    let Some(subnet) = segment.subnet else {
        for (id, request) in requests {
            match request {
                AddressRequest::Explicit(address) => {
                    assigned.insert(id.clone(), address);
                }
                _ => {
                    return Err(SliceError::InvalidNetworkService {
                        segment: segment.local_id.clone(),
                        reason: format!("interface {id} wants an automatic address but no subnet is set"),
                    })
                }
            }
        }
        return Ok(assigned);
    };

    let mut allocator = IpAllocator::new(subnet);
    for address in in_use {
        allocator.allocate(*address)?;
    }

    for (id, request) in &requests {
        if let AddressRequest::Explicit(address) = request {
            let address = allocator
                .allocate(*address)
                .map_err(|e| SliceError::Conflict(format!("interface {id}: {e}")))?;
            assigned.insert((*id).clone(), address);
        }
    }
    for (id, request) in &requests {
        if *request == AddressRequest::Auto {
            assigned.insert((*id).clone(), allocator.allocate_next()?);
        }
    }

    Ok(assigned)
}
