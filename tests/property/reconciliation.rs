// Copyright (c) 2025 - Cowboy AI, Inc.
//! Merging status documents never moves a resource backwards, and a graph
//! is only stable once everything has settled

use chrono::Utc;
use proptest::prelude::*;

use super::strategies::{reported_state, spec_parts};
use slice_orchestrator::control_plane::{parse_status, StatusBuilder};
use slice_orchestrator::reconcile::apply_status;
use slice_orchestrator::{plan_create, ReservationState, SliceError, TopologyGraph};

fn single_node_graph() -> TopologyGraph {
    let mut spec = slice_orchestrator::ResourceSpec::new();
    spec.add_node(slice_orchestrator::NodeSpec::new("n1")).unwrap();
    TopologyGraph::from_plan(&plan_create(&spec).unwrap())
}

fn phase_rank(state: ReservationState) -> u8 {
    state.control_plane_phase().rank()
}

proptest! {
    #[test]
    fn prop_states_only_move_forward(reports in prop::collection::vec(reported_state(), 1..12)) {
        let mut graph = single_node_graph();

        for (round, reported) in reports.into_iter().enumerate() {
            let before = graph.resource("n1").unwrap().state();
            let doc = parse_status(
                "S1",
                StatusBuilder::new("S1", "Configuring").sliver("n1", reported).build(),
            )
            .unwrap();
            let reported_rank = doc.resource("n1").unwrap().state.rank();

            match apply_status(&graph, &doc, round as u64 + 1, Utc::now()) {
                Ok((next, _)) => {
                    let after = next.resource("n1").unwrap().state();
                    prop_assert!(phase_rank(after) >= phase_rank(before));
                    graph = next;
                }
                Err(e) => {
                    let is_inconsistent = matches!(e, SliceError::InconsistentState { .. });
                    prop_assert!(is_inconsistent, "{e}");
                    prop_assert!(reported_rank <= phase_rank(before));
                }
            }
            if reported_rank < phase_rank(before) {
                prop_assert_eq!(graph.resource("n1").unwrap().state(), before);
            }
        }
    }

    #[test]
    fn prop_stable_graph_has_only_settled_resources(
        parts in spec_parts(),
        states in prop::collection::vec(reported_state(), 16),
        slice_state in prop::sample::select(vec!["Configuring", "StableOK", "StableError"]),
    ) {
        let spec = parts.build();
        let graph = TopologyGraph::from_plan(&plan_create(&spec).unwrap());

        let builder = graph
            .resources()
            .zip(states.iter().cycle())
            .fold(StatusBuilder::new("S1", slice_state), |b, (r, state)| b.sliver(&r.local_id, state));
        let doc = parse_status("S1", builder.build()).unwrap();

        if let Ok((next, _)) = apply_status(&graph, &doc, 1, Utc::now()) {
            if next.is_stable() {
                for resource in next.resources() {
                    prop_assert!(resource.state().is_settled(), "{} is {}", resource.local_id, resource.state());
                }
            }
        }
    }
}
