// Copyright (c) 2025 - Cowboy AI, Inc.
//! Dependency ordering
//!
//! Kahn's algorithm over the resources of one request. Ready resources are
//! taken in `(kind, local_id)` order, so identical inputs always produce
//! identical plans. Dependencies outside the set are treated as satisfied.

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::LocalId;
use crate::errors::{SliceError, SliceResult};
use crate::topology::ResourceKind;

/// A resource and the ids it must follow
#[derive(Debug, Clone)]
pub(crate) struct Dependent {
    pub kind: ResourceKind,
    pub after: Vec<LocalId>,
}

pub(crate) fn topological_order(
    items: &BTreeMap<LocalId, Dependent>,
) -> SliceResult<Vec<(ResourceKind, LocalId)>> {
    let mut indegree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut followers: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for (id, item) in items {
        let deps: BTreeSet<&str> = item
            .after
            .iter()
            .map(String::as_str)
            .filter(|dep| items.contains_key(*dep))
            .collect();
        indegree.insert(id.as_str(), deps.len());
        for dep in deps {
            followers.entry(dep).or_default().push(id.as_str());
        }
    }

    let mut ready: BTreeSet<(ResourceKind, &str)> = indegree
        .iter()
        .filter(|(_, n)| **n == 0)
        .map(|(id, _)| (items[*id].kind, *id))
        .collect();

    let mut order = Vec::with_capacity(items.len());
    while let Some(next) = ready.pop_first() {
        let (kind, id) = next;
        order.push((kind, id.to_string()));
        for follower in followers.get(id).into_iter().flatten() {
            if let Some(n) = indegree.get_mut(follower) {
                *n -= 1;
                if *n == 0 {
                    ready.insert((items[*follower].kind, *follower));
                }
            }
        }
    }

    if order.len() < items.len() {
        let placed: BTreeSet<&str> = order.iter().map(|(_, id)| id.as_str()).collect();
        let remaining = items
            .keys()
            .filter(|id| !placed.contains(id.as_str()))
            .cloned()
            .collect();
        return Err(SliceError::CyclicSpec { remaining });
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(kind: ResourceKind, after: &[&str]) -> Dependent {
        Dependent {
            kind,
            after: after.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_segments_precede_interfaces() {
        let mut items = BTreeMap::new();
        items.insert("a-eth".to_string(), item(ResourceKind::Interface, &["a", "net"]));
        items.insert("a".to_string(), item(ResourceKind::Node, &[]));
        items.insert("net".to_string(), item(ResourceKind::NetworkSegment, &[]));

        let order: Vec<_> = topological_order(&items)
            .unwrap()
            .into_iter()
            .map(|(_, id)| id)
            .collect();
        assert_eq!(order, vec!["a", "net", "a-eth"]);
    }

    #[test]
    fn test_peer_chain_orders_segments() {
        let mut items = BTreeMap::new();
        items.insert("z".to_string(), item(ResourceKind::NetworkSegment, &[]));
        items.insert("a".to_string(), item(ResourceKind::NetworkSegment, &["z"]));

        let order: Vec<_> = topological_order(&items)
            .unwrap()
            .into_iter()
            .map(|(_, id)| id)
            .collect();
        assert_eq!(order, vec!["z", "a"]);
    }

    #[test]
    fn test_cycle_reports_members() {
        let mut items = BTreeMap::new();
        items.insert("x".to_string(), item(ResourceKind::NetworkSegment, &["y"]));
        items.insert("y".to_string(), item(ResourceKind::NetworkSegment, &["x"]));
        items.insert("free".to_string(), item(ResourceKind::Node, &[]));

        match topological_order(&items) {
            Err(SliceError::CyclicSpec { remaining }) => {
                assert_eq!(remaining, vec!["x".to_string(), "y".to_string()])
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let mut items = BTreeMap::new();
        items.insert("loop".to_string(), item(ResourceKind::NetworkSegment, &["loop"]));

        assert!(matches!(
            topological_order(&items),
            Err(SliceError::CyclicSpec { remaining }) if remaining == vec!["loop".to_string()]
        ));
    }

    #[test]
    fn test_external_dependencies_are_satisfied() {
        let mut items = BTreeMap::new();
        items.insert("eth".to_string(), item(ResourceKind::Interface, &["provisioned"]));
        assert_eq!(topological_order(&items).unwrap().len(), 1);
    }
}
