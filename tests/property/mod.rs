// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests Module
//!
//! - `spec_model`: reference checks and deterministic serialization
//! - `plan_order`: planner output is a valid topological order
//! - `reconciliation`: forward-only merges and the stability guard

mod plan_order;
mod reconciliation;
mod spec_model;
mod strategies;
