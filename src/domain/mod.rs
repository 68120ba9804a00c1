// Copyright (c) 2025 - Cowboy AI, Inc.
//! Slice Request Domain Models
//!
//! Core concepts for describing what a caller wants provisioned, before
//! anything is sent to the federation.
//!
//! # Value Objects with Invariants
//!
//! - [`Subnet`] - IPv4/IPv6 network in CIDR notation, host bits clear
//! - [`VlanId`] - IEEE 802.1Q VLAN ID (1-4094)
//! - [`IpAllocator`] - per-segment host address bookkeeping
//! - [`ServiceType`] - federation network service taxonomy
//! - [`ComponentModel`] - node hardware taxonomy
//!
//! # Draft Topology
//!
//! - [`ResourceSpec`] - id-indexed arenas of nodes, segments and interfaces

pub mod component;
pub mod network;
pub mod network_service;
pub mod resource_spec;

pub use component::ComponentModel;
pub use network::{IpAllocator, NetworkError, Subnet, VlanId};
pub use network_service::{
    select_l2_service, validate_service, NetworkLayer, ServiceEndpoint, ServiceType,
};
pub use resource_spec::{
    AddressRequest, Capacities, ComponentSpec, ImageRef, InterfaceSpec, LocalId,
    NetworkSegmentSpec, NodeSpec, ResourceSpec,
};
