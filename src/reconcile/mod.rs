// Copyright (c) 2025 - Cowboy AI, Inc.
//! State reconciliation
//!
//! Polls the control plane for a slice, folds each status document into the
//! topology graph through the reservation state machine, and publishes one
//! snapshot per round. The poll loop is an explicit step machine so that
//! cancellation and the aggregate deadline are checked at every await.

mod merge;

pub use merge::apply_status;
pub(crate) use merge::unreachable_nodes;
use merge::{apply_deletion, apply_modification, apply_reachability};

use chrono::Utc;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::cancel::CancelToken;
use crate::config::PollConfig;
use crate::control_plane::{parse_status, ControlPlane};
use crate::domain::LocalId;
use crate::errors::{SliceError, SliceResult};
use crate::planner::ProvisioningPlan;
use crate::state_machine::{ReservationState, SliceState};
use crate::topology::{TopologyGraph, TopologyStore};

/// One observed reservation change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceTransition {
    pub local_id: LocalId,
    pub from: ReservationState,
    pub to: ReservationState,
}

/// Summary of one completed poll round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundReport {
    pub round: u64,
    pub slice_state: SliceState,
    pub transitions: Vec<ResourceTransition>,
    pub settled: usize,
    pub total: usize,
}

/// Result of probing one node over the management network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReachabilityOutcome {
    pub node: LocalId,
    /// `Err` carries the last connection failure
    pub result: Result<(), String>,
}

/// How a reconciliation run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Every resource settled and the slice reported a stable state
    Stable,
    /// The control plane declared the slice dead
    SliceDead,
}

async fn expiry(expires: Option<Instant>) {
    match expires {
        Some(expires) => sleep_until(expires).await,
        None => std::future::pending().await,
    }
}

enum Step {
    Poll,
    Wait(Duration),
    Done(ReconcileOutcome),
}

/// Sole writer of a slice's topology store
pub struct ReconciliationEngine {
    control_plane: Arc<dyn ControlPlane>,
    store: TopologyStore,
    poll: PollConfig,
    reports: Option<mpsc::Sender<RoundReport>>,
}

impl ReconciliationEngine {
    pub fn new(control_plane: Arc<dyn ControlPlane>, store: TopologyStore, poll: PollConfig) -> Self {
        Self {
            control_plane,
            store,
            poll,
            reports: None,
        }
    }

    /// Stream a [`RoundReport`] for every merged round
    pub fn with_reports(mut self, reports: mpsc::Sender<RoundReport>) -> Self {
        self.reports = Some(reports);
        self
    }

    pub fn store(&self) -> &TopologyStore {
        &self.store
    }

    fn snapshot(&self) -> Box<TopologyGraph> {
        Box::new(self.store.snapshot().as_ref().clone())
    }

    fn timed_out(&self, started: Instant) -> SliceError {
        let elapsed = started.elapsed();
        warn!("Provisioning deadline passed after {:?}", elapsed);
        SliceError::Timeout {
            elapsed,
            snapshot: self.snapshot(),
        }
    }

    fn cancelled(&self) -> SliceError {
        info!("Reconciliation cancelled");
        SliceError::Cancelled {
            snapshot: Some(self.snapshot()),
        }
    }

    /// Poll until the slice is stable, dead, cancelled or out of time
    pub async fn run(
        &self,
        slice_id: &str,
        deadline: Duration,
        cancel: &CancelToken,
    ) -> SliceResult<ReconcileOutcome> {
        let started = Instant::now();
        // Deadlines past the clock's range mean no deadline
        let expires = started.checked_add(deadline);
        let mut failures = 0u32;
        let mut step = Step::Poll;

        info!("Reconciling slice {} (deadline {:?})", slice_id, deadline);

        loop {
            step = match step {
                Step::Done(outcome) => {
                    info!("Slice {} reconciled: {:?}", slice_id, outcome);
                    return Ok(outcome);
                }
                Step::Poll => {
                    let polled = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(self.cancelled()),
                        _ = expiry(expires) => return Err(self.timed_out(started)),
                        polled = timeout(self.poll.round_timeout(), self.control_plane.status(slice_id)) => polled,
                    };

                    match polled {
                        Ok(Ok(raw)) => {
                            failures = 0;
                            self.merge_round(slice_id, raw)?
                        }
                        Ok(Err(e)) if e.is_retryable() => {
                            failures += 1;
                            warn!("Status poll for {} failed ({} in a row): {}", slice_id, failures, e);
                            Step::Wait(self.poll.backoff(failures))
                        }
                        Ok(Err(e)) => return Err(e),
                        Err(_) => {
                            failures += 1;
                            warn!(
                                "Status poll for {} exceeded {:?} ({} in a row)",
                                slice_id,
                                self.poll.round_timeout(),
                                failures
                            );
                            Step::Wait(self.poll.backoff(failures))
                        }
                    }
                }
                Step::Wait(delay) => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(self.cancelled()),
                        _ = expiry(expires) => return Err(self.timed_out(started)),
                        _ = sleep(delay) => Step::Poll,
                    }
                }
            };
        }
    }

    fn merge_round(&self, slice_id: &str, raw: serde_json::Value) -> SliceResult<Step> {
        let doc = parse_status(slice_id, raw).map_err(|e| {
            error!("Rejecting status document for {}: {}", slice_id, e);
            e
        })?;
        let (published, report) = self.store.update(|current| {
            let round = current.round() + 1;
            apply_status(current, &doc, round, Utc::now()).map_err(|e| {
                error!("Status round {} for {} is inconsistent: {}", round, slice_id, e);
                e
            })
        })?;

        for change in &report.transitions {
            debug!("{}: {} -> {}", change.local_id, change.from, change.to);
        }
        info!(
            "Round {} for {}: slice {}, {}/{} settled",
            report.round, slice_id, report.slice_state, report.settled, report.total
        );

        self.send_report(report);

        if published.slice().map(|s| s.state) == Some(SliceState::Dead) {
            warn!("Slice {} is dead", slice_id);
            return Ok(Step::Done(ReconcileOutcome::SliceDead));
        }
        if published.is_stable() && published.slice().is_some_and(|s| s.state.is_stable()) {
            return Ok(Step::Done(ReconcileOutcome::Stable));
        }
        Ok(Step::Wait(self.poll.interval()))
    }

    fn send_report(&self, report: RoundReport) {
        if let Some(reports) = &self.reports {
            if let Err(e) = reports.try_send(report) {
                debug!("Round report dropped: {}", e);
            }
        }
    }

    /// Publish connectivity results as Reachable / Active-Unreachable
    pub fn record_connectivity(&self, outcomes: &[ReachabilityOutcome]) -> Arc<TopologyGraph> {
        self.record(|graph| apply_reachability(graph, outcomes, Utc::now()))
    }

    pub(crate) fn record_modification(&self, plan: &ProvisioningPlan) -> Arc<TopologyGraph> {
        self.record(|graph| apply_modification(graph, plan))
    }

    pub(crate) fn record_deletion(&self) -> Arc<TopologyGraph> {
        self.record(|graph| apply_deletion(graph, Utc::now()))
    }

    fn record(&self, step: impl FnOnce(&TopologyGraph) -> TopologyGraph) -> Arc<TopologyGraph> {
        match self
            .store
            .update(|graph| Ok::<_, Infallible>((step(graph), ())))
        {
            Ok((graph, ())) => graph,
            Err(never) => match never {},
        }
    }
}
