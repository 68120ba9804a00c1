// Copyright (c) 2025 - Cowboy AI, Inc.
//! Shared proptest strategies

use proptest::prelude::*;

use slice_orchestrator::{InterfaceSpec, NetworkSegmentSpec, NodeSpec, ResourceSpec};

/// Raw ingredients of a spec, so tests can rebuild it in other orders
#[derive(Debug, Clone)]
pub struct SpecParts {
    pub nodes: Vec<NodeSpec>,
    pub segments: Vec<NetworkSegmentSpec>,
    pub interfaces: Vec<InterfaceSpec>,
    /// (segment, peer) pairs; peers always have a lower index
    pub peers: Vec<(String, String)>,
}

impl SpecParts {
    pub fn build(&self) -> ResourceSpec {
        let mut spec = ResourceSpec::new();
        for node in &self.nodes {
            spec.add_node(node.clone()).unwrap();
        }
        for segment in &self.segments {
            spec.add_network_segment(segment.clone()).unwrap();
        }
        for interface in &self.interfaces {
            spec.add_interface(interface.clone()).unwrap();
        }
        for (segment, peer) in &self.peers {
            spec.peer_segments(segment, peer).unwrap();
        }
        spec
    }
}

/// Single-site specs with up to five nodes, three segments and peering
pub fn spec_parts() -> impl Strategy<Value = SpecParts> {
    (1usize..=5, 1usize..=3)
        .prop_flat_map(|(node_count, segment_count)| {
            (
                Just(node_count),
                Just(segment_count),
                prop::collection::vec(prop::bool::ANY, node_count),
                prop::collection::vec((0..node_count, 0..segment_count), 0..8),
                prop::collection::vec(prop::option::of(0..segment_count), segment_count),
            )
        })
        .prop_map(|(node_count, segment_count, sited, links, peers)| {
            let nodes = (0..node_count)
                .map(|i| {
                    let node = NodeSpec::new(format!("n{i}"));
                    if sited[i] {
                        node.with_site("RENC")
                    } else {
                        node
                    }
                })
                .collect();
            let segments = (0..segment_count)
                .map(|j| NetworkSegmentSpec::l2(format!("s{j}")))
                .collect();
            let interfaces = links
                .iter()
                .enumerate()
                .map(|(k, (node, segment))| {
                    InterfaceSpec::new(format!("i{k}"), format!("n{node}"), format!("s{segment}"))
                })
                .collect();
            let peers = peers
                .iter()
                .enumerate()
                .filter_map(|(j, peer)| match peer {
                    Some(p) if *p < j => Some((format!("s{j}"), format!("s{p}"))),
                    _ => None,
                })
                .collect();
            SpecParts {
                nodes,
                segments,
                interfaces,
                peers,
            }
        })
}

/// Reservation states as the federation names them
pub fn reported_state() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["Ticketed", "Provisioning", "Active", "Failed", "Closed"])
}

/// The same parts twice, the second copy with every list shuffled
pub fn shuffled_spec_parts() -> impl Strategy<Value = (SpecParts, SpecParts)> {
    spec_parts().prop_flat_map(|parts| {
        let nodes = Just(parts.nodes.clone()).prop_shuffle();
        let segments = Just(parts.segments.clone()).prop_shuffle();
        let interfaces = Just(parts.interfaces.clone()).prop_shuffle();
        (Just(parts), nodes, segments, interfaces).prop_map(|(parts, nodes, segments, interfaces)| {
            let shuffled = SpecParts {
                nodes,
                segments,
                interfaces,
                peers: parts.peers.clone(),
            };
            (parts, shuffled)
        })
    })
}
