// Copyright (c) 2025 - Cowboy AI, Inc.
//! The planner always emits a valid topological order

use proptest::prelude::*;

use super::strategies::spec_parts;
use slice_orchestrator::{plan_create, ProvisioningOp};

proptest! {
    #[test]
    fn prop_dependencies_come_first(parts in spec_parts()) {
        let spec = parts.build();
        let plan = plan_create(&spec).unwrap();

        prop_assert_eq!(plan.len(), spec.len());
        for (index, op) in plan.operations().iter().enumerate() {
            match op {
                ProvisioningOp::CreateInterface { interface, .. } => {
                    let segment = plan.position(&interface.segment).unwrap();
                    let node = plan.position(&interface.node).unwrap();
                    prop_assert!(segment < index, "{} before its segment", interface.local_id);
                    prop_assert!(node < index, "{} before its node", interface.local_id);
                }
                ProvisioningOp::CreateSegment { segment, .. } => {
                    if let Some(peer) = &segment.peer {
                        prop_assert!(plan.position(peer).unwrap() < index);
                    }
                }
                ProvisioningOp::CreateNode { .. } => {}
                ProvisioningOp::Remove { .. } => prop_assert!(false, "create plan removes"),
            }
        }
    }

    #[test]
    fn prop_planning_is_pure(parts in spec_parts()) {
        let spec = parts.build();
        prop_assert_eq!(plan_create(&spec).unwrap(), plan_create(&spec).unwrap());
    }
}
