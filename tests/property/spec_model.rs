// Copyright (c) 2025 - Cowboy AI, Inc.
//! Properties of the draft spec model

use proptest::prelude::*;

use super::strategies::{shuffled_spec_parts, spec_parts};
use slice_orchestrator::{InterfaceSpec, SliceError};

proptest! {
    #[test]
    fn prop_dangling_interface_is_rejected_and_spec_unchanged(
        parts in spec_parts(),
        bad_node in prop::bool::ANY,
    ) {
        let mut spec = parts.build();
        let before = spec.clone();
        let interface = if bad_node {
            InterfaceSpec::new("stray", "ghost-node", "s0")
        } else {
            InterfaceSpec::new("stray", "n0", "ghost-segment")
        };

        let result = spec.add_interface(interface);

        let is_reference_error = matches!(result, Err(SliceError::Reference { .. }));
        prop_assert!(is_reference_error);
        prop_assert_eq!(spec, before);
    }

    #[test]
    fn prop_serialization_is_deterministic(parts in spec_parts()) {
        let spec = parts.build();
        prop_assert_eq!(
            spec.to_request_document().unwrap(),
            spec.to_request_document().unwrap()
        );
    }

    #[test]
    fn prop_insertion_order_does_not_matter((parts, shuffled) in shuffled_spec_parts()) {
        prop_assert_eq!(
            parts.build().to_request_document().unwrap(),
            shuffled.build().to_request_document().unwrap()
        );
        prop_assert_eq!(parts.build().request_id().unwrap(), shuffled.build().request_id().unwrap());
    }

    #[test]
    fn prop_request_document_round_trips(parts in spec_parts()) {
        let spec = parts.build();
        let document = spec.to_request_document().unwrap();
        let parsed = slice_orchestrator::ResourceSpec::from_request_document(&document).unwrap();
        prop_assert_eq!(parsed, spec);
    }
}
