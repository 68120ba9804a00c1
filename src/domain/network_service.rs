// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network Service Types
//!
//! Each requested network segment is realised by the federation as one
//! network service. Layer-2 services are chosen from the sites of the
//! attached interfaces unless the caller pins a type; every type carries
//! placement rules that are checked before submission.
//!
//! # Automatic L2 selection
//!
//! ```text
//! sites ≤ 1                         → L2Bridge
//! sites = 2, route hops, no Basic   → L2PTP
//! sites = 2, otherwise              → L2STS
//! sites > 2                         → rejected
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::component::ComponentModel;
use crate::errors::{SliceError, SliceResult};

/// OSI layer a segment operates at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NetworkLayer {
    L2,
    L3,
}

/// Federation network service taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ServiceType {
    /// Single-site bridge
    L2Bridge,
    /// Point-to-point wide-area circuit
    L2PTP,
    /// Site-to-site multipoint
    L2STS,
    /// Mirror of a switch port to a receive interface
    PortMirror,
    FABNetv4,
    FABNetv6,
    FABNetv4Ext,
    FABNetv6Ext,
    L3VPN,
}

impl ServiceType {
    pub fn layer(&self) -> NetworkLayer {
        match self {
            Self::L2Bridge | Self::L2PTP | Self::L2STS | Self::PortMirror => NetworkLayer::L2,
            Self::FABNetv4 | Self::FABNetv6 | Self::FABNetv4Ext | Self::FABNetv6Ext | Self::L3VPN => {
                NetworkLayer::L3
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::L2Bridge => "L2Bridge",
            Self::L2PTP => "L2PTP",
            Self::L2STS => "L2STS",
            Self::PortMirror => "PortMirror",
            Self::FABNetv4 => "FABNetv4",
            Self::FABNetv6 => "FABNetv6",
            Self::FABNetv4Ext => "FABNetv4Ext",
            Self::FABNetv6Ext => "FABNetv6Ext",
            Self::L3VPN => "L3VPN",
        }
    }

    /// Services that accept an explicit route between their two endpoints
    pub fn supports_route_hops(&self) -> bool {
        matches!(self, Self::L2PTP | Self::L2STS)
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One interface attachment as seen by service placement rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub interface: String,
    pub node: String,
    pub site: Option<String>,
    pub host: Option<String>,
    pub nic: Option<ComponentModel>,
}

impl ServiceEndpoint {
    fn is_basic_nic(&self) -> bool {
        self.nic == Some(ComponentModel::NicBasic)
    }
}

fn distinct_sites(endpoints: &[ServiceEndpoint]) -> BTreeSet<&str> {
    endpoints.iter().filter_map(|e| e.site.as_deref()).collect()
}

fn invalid(segment: &str, reason: impl Into<String>) -> SliceError {
    SliceError::InvalidNetworkService {
        segment: segment.to_string(),
        reason: reason.into(),
    }
}

/// Pick an L2 service type for a segment from its endpoints
pub fn select_l2_service(
    segment: &str,
    endpoints: &[ServiceEndpoint],
    route_hops_requested: bool,
) -> SliceResult<ServiceType> {
    let sites = distinct_sites(endpoints);
    let has_basic = endpoints.iter().any(ServiceEndpoint::is_basic_nic);

    match sites.len() {
        0 | 1 => Ok(ServiceType::L2Bridge),
        2 if route_hops_requested && !has_basic => Ok(ServiceType::L2PTP),
        2 => Ok(ServiceType::L2STS),
        n => Err(invalid(
            segment,
            format!("L2 networks are limited to 2 sites, {n} requested: {sites:?}"),
        )),
    }
}

/// Check a resolved service type against its endpoints
///
/// An empty segment is always valid; rules apply once interfaces attach.
pub fn validate_service(
    segment: &str,
    service_type: ServiceType,
    endpoints: &[ServiceEndpoint],
) -> SliceResult<()> {
    if endpoints.is_empty() {
        return Ok(());
    }

    let sites = distinct_sites(endpoints);

    match service_type {
        ServiceType::L2Bridge => {
            if sites.len() > 1 {
                return Err(invalid(
                    segment,
                    format!("L2Bridge must stay within one site, {} requested", sites.len()),
                ));
            }
        }
        ServiceType::L2PTP => {
            if sites.len() != 2 {
                return Err(invalid(
                    segment,
                    format!("L2PTP needs exactly two sites, {} requested", sites.len()),
                ));
            }
            if endpoints.iter().any(ServiceEndpoint::is_basic_nic) {
                return Err(invalid(segment, "L2PTP does not support NIC_Basic interfaces"));
            }
        }
        ServiceType::L2STS => {
            let mut problems = Vec::new();
            if sites.len() != 2 {
                problems.push(format!(
                    "L2STS needs exactly two sites, {} requested",
                    sites.len()
                ));
            }
            if endpoints.len() > 2 {
                problems.extend(shared_host_conflicts(endpoints));
            }
            if !problems.is_empty() {
                return Err(invalid(segment, problems.join("; ")));
            }
        }
        ServiceType::PortMirror => {
            if endpoints.len() > 1 {
                return Err(invalid(
                    segment,
                    "PortMirror delivers to exactly one receive interface",
                ));
            }
        }
        ServiceType::FABNetv4
        | ServiceType::FABNetv6
        | ServiceType::FABNetv4Ext
        | ServiceType::FABNetv6Ext
        | ServiceType::L3VPN => {
            if sites.len() > 1 {
                return Err(invalid(
                    segment,
                    format!("{service_type} can only include nodes from one site"),
                ));
            }
        }
    }

    Ok(())
}

/// Multiple NIC_Basic VMs of one site behind an L2STS must sit on distinct hosts
fn shared_host_conflicts(endpoints: &[ServiceEndpoint]) -> Vec<String> {
    let mut nodes_per_site: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for endpoint in endpoints {
        if let Some(site) = endpoint.site.as_deref() {
            nodes_per_site.entry(site).or_default().insert(endpoint.node.as_str());
        }
    }

    let mut hosts = BTreeSet::new();
    let mut problems = Vec::new();
    for endpoint in endpoints.iter().filter(|e| e.is_basic_nic()) {
        let crowded = endpoint
            .site
            .as_deref()
            .and_then(|site| nodes_per_site.get(site))
            .is_some_and(|nodes| nodes.len() > 1);
        if !crowded {
            continue;
        }
        match endpoint.host.as_deref() {
            None => problems.push(format!(
                "node {} must be pinned to a host to share L2STS with other NIC_Basic nodes",
                endpoint.node
            )),
            Some(host) if !hosts.insert(host) => problems.push(format!(
                "multiple NIC_Basic nodes bound to host {host}"
            )),
            Some(_) => {}
        }
    }
    problems
}
