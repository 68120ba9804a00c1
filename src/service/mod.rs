// Copyright (c) 2025 - Cowboy AI, Inc.
//! Slice lifecycle service
//!
//! The entry point for callers. A [`SliceOrchestrator`] holds the external
//! clients and configuration; each slice it creates is driven through a
//! [`SliceHandle`] that owns that slice's topology store, reconciliation
//! engine and sessions. There is no process-wide state.
//!
//! ```text
//! ResourceSpec → plan → submit → reconcile → connect → SliceHandle
//!                                    ↓
//!                            TopologyGraph snapshots
//! ```

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::config::OrchestratorConfig;
use crate::connectivity::{ConnectivityManager, ConnectivitySession, ConnectivityTransport, Credentials};
use crate::control_plane::{ControlPlane, ModifyRequest, SubmitRequest};
use crate::domain::ResourceSpec;
use crate::errors::{SliceError, SliceResult};
use crate::planner::{plan_create, plan_modify, ModifyPlan, ProvisioningOp, SliceDelta};
use crate::reconcile::{
    unreachable_nodes, ReachabilityOutcome, ReconcileOutcome, ReconciliationEngine, RoundReport,
};
use crate::state_machine::SliceState;
use crate::topology::{ResourceKind, Slice, TopologyGraph, TopologyReader, TopologyStore};

const REPORT_BUFFER: usize = 64;

/// Creates and attaches to slices
pub struct SliceOrchestrator {
    control_plane: Arc<dyn ControlPlane>,
    transport: Arc<dyn ConnectivityTransport>,
    credentials: Credentials,
    config: OrchestratorConfig,
}

impl SliceOrchestrator {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        transport: Arc<dyn ConnectivityTransport>,
        credentials: Credentials,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            control_plane,
            transport,
            credentials,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Plan and submit a new slice
    ///
    /// Transient submission failures are retried with the same request id.
    /// The returned handle has not polled yet; call
    /// [`SliceHandle::wait_until_stable`] to drive it.
    pub async fn create(
        &self,
        name: &str,
        spec: ResourceSpec,
        cancel: &CancelToken,
    ) -> SliceResult<SliceHandle> {
        let plan = plan_create(&spec)?;
        let request = SubmitRequest::new(name, &spec, &plan)?;
        info!(
            "Submitting slice {} ({} operations, request {})",
            name,
            plan.len(),
            request.request_id
        );

        let slice_id = self.submit_with_retry(&request, cancel).await?;
        info!("Slice {} accepted as {}", name, slice_id);

        let mut graph = TopologyGraph::from_plan(&plan);
        graph.set_slice(Slice {
            slice_id: slice_id.clone(),
            name: name.to_string(),
            state: SliceState::Configuring,
            created_at: Utc::now(),
            owner: None,
            lease_end: None,
        });
        Ok(self.handle(slice_id, name, spec, graph))
    }

    /// Rebuild a handle for a slice submitted earlier, e.g. after a restart
    ///
    /// Resource states and sessions are recovered on the next
    /// `wait_until_stable`.
    pub fn attach(&self, slice_id: &str, name: &str, spec: ResourceSpec) -> SliceResult<SliceHandle> {
        let plan = plan_create(&spec)?;
        let mut graph = TopologyGraph::from_plan(&plan);
        graph.set_slice(Slice {
            slice_id: slice_id.to_string(),
            name: name.to_string(),
            state: SliceState::Configuring,
            created_at: Utc::now(),
            owner: None,
            lease_end: None,
        });
        info!("Attached to slice {} ({})", name, slice_id);
        Ok(self.handle(slice_id.to_string(), name, spec, graph))
    }

    fn handle(&self, slice_id: String, name: &str, spec: ResourceSpec, graph: TopologyGraph) -> SliceHandle {
        let (tx, rx) = mpsc::channel(REPORT_BUFFER);
        let engine = ReconciliationEngine::new(
            self.control_plane.clone(),
            TopologyStore::new(graph),
            self.config.poll.clone(),
        )
        .with_reports(tx);

        SliceHandle {
            slice_id,
            name: name.to_string(),
            spec: Mutex::new(spec),
            engine,
            connectivity: ConnectivityManager::new(
                self.transport.clone(),
                self.credentials.clone(),
                self.config.connect.clone(),
            ),
            control_plane: self.control_plane.clone(),
            provisioning_timeout: self.config.provisioning_timeout(),
            reports: Mutex::new(Some(rx)),
        }
    }

    async fn submit_with_retry(&self, request: &SubmitRequest, cancel: &CancelToken) -> SliceResult<String> {
        let attempts = self.config.submit.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let submitted = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SliceError::Cancelled { snapshot: None }),
                submitted = self.control_plane.submit(request) => submitted,
            };

            match submitted {
                Ok(slice_id) => return Ok(slice_id),
                Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                    let delay = self.config.submit.delay(attempt);
                    warn!(
                        "Submission {} failed (attempt {}): {}, retrying in {:?}",
                        request.request_id,
                        attempt + 1,
                        e,
                        delay
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(SliceError::Cancelled { snapshot: None }),
                        _ = sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// A caller's view of one slice
///
/// Only the handle's engine mutates the slice's graph. Readers get
/// immutable snapshots through [`snapshot`](Self::snapshot) and
/// [`subscribe`](Self::subscribe).
pub struct SliceHandle {
    slice_id: String,
    name: String,
    spec: Mutex<ResourceSpec>,
    engine: ReconciliationEngine,
    connectivity: ConnectivityManager,
    control_plane: Arc<dyn ControlPlane>,
    provisioning_timeout: Duration,
    reports: Mutex<Option<mpsc::Receiver<RoundReport>>>,
}

impl SliceHandle {
    pub fn slice_id(&self) -> &str {
        &self.slice_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn snapshot(&self) -> Arc<TopologyGraph> {
        self.engine.store().snapshot()
    }

    pub fn subscribe(&self) -> TopologyReader {
        self.engine.store().reader()
    }

    /// The request the slice currently represents
    pub async fn spec(&self) -> ResourceSpec {
        self.spec.lock().await.clone()
    }

    /// Take the stream of per-round progress reports
    ///
    /// Only the first call returns the receiver.
    pub async fn round_reports(&self) -> Option<mpsc::Receiver<RoundReport>> {
        self.reports.lock().await.take()
    }

    fn slice_state(&self) -> Option<SliceState> {
        self.snapshot().slice().map(|s| s.state)
    }

    fn ensure_alive(&self) -> SliceResult<()> {
        match self.slice_state() {
            Some(SliceState::Dead) => Err(SliceError::SliceDead {
                slice_id: self.slice_id.clone(),
            }),
            Some(SliceState::Closing | SliceState::Closed) => {
                Err(SliceError::Conflict(format!("slice {} is closed", self.slice_id)))
            }
            _ => Ok(()),
        }
    }

    /// Reconcile with the provisioning deadline from the configuration,
    /// then connect to every Active node
    pub async fn wait_until_stable(&self, cancel: &CancelToken) -> SliceResult<Arc<TopologyGraph>> {
        self.wait_until_stable_for(self.provisioning_timeout, cancel)
            .await
    }

    /// Like [`wait_until_stable`](Self::wait_until_stable) with an explicit
    /// deadline
    ///
    /// A slice that dies while waiting is not an error here: the returned
    /// graph shows it Dead with its unsettled resources Failed, and all
    /// sessions are closed.
    pub async fn wait_until_stable_for(
        &self,
        deadline: Duration,
        cancel: &CancelToken,
    ) -> SliceResult<Arc<TopologyGraph>> {
        if self.slice_state() == Some(SliceState::Dead) {
            return Ok(self.snapshot());
        }
        self.ensure_alive()?;

        match self.engine.run(&self.slice_id, deadline, cancel).await {
            Ok(ReconcileOutcome::Stable) => {}
            Ok(ReconcileOutcome::SliceDead) => {
                self.connectivity.close_all().await;
                return Ok(self.snapshot());
            }
            Err(e @ SliceError::Cancelled { .. }) => {
                self.connectivity.close_all().await;
                return Err(e);
            }
            Err(e) => return Err(e),
        }

        let graph = self.snapshot();
        let nodes: Vec<_> = graph
            .connectable_nodes()
            .map(|(node, ip)| (node.clone(), ip))
            .collect();
        if nodes.is_empty() {
            return Ok(graph);
        }

        let outcomes = match self.connectivity.connect_all(nodes, cancel).await {
            Ok(outcomes) => outcomes,
            Err(SliceError::Cancelled { .. }) => {
                return Err(SliceError::Cancelled {
                    snapshot: Some(Box::new(self.snapshot().as_ref().clone())),
                })
            }
            Err(e) => return Err(e),
        };

        let graph = self.engine.record_connectivity(&outcomes);
        for (node, ip) in unreachable_nodes(&graph) {
            warn!("Node {} ({:?}) is Active but unreachable", node, ip);
        }
        Ok(graph)
    }

    /// Add or remove resources on a live slice
    ///
    /// Sessions to removed nodes are closed. The new resources start
    /// Ticketed; call `wait_until_stable` again to provision them.
    pub async fn modify(&self, delta: &SliceDelta) -> SliceResult<Arc<TopologyGraph>> {
        self.ensure_alive()?;
        let mut spec = self.spec.lock().await;
        let graph = self.snapshot();

        let ModifyPlan { plan, spec: next } = plan_modify(&spec, &graph, delta)?;
        if plan.is_empty() {
            debug!("Nothing to modify on {}", self.slice_id);
            return Ok(graph);
        }

        let request = ModifyRequest::new(&self.slice_id, &plan)?;
        info!(
            "Modifying slice {} ({} removals, {} additions)",
            self.slice_id,
            plan.removals().count(),
            plan.additions().count()
        );
        if !self.control_plane.modify(&self.slice_id, &request).await? {
            return Err(SliceError::Conflict(format!(
                "control plane rejected modification of {}",
                self.slice_id
            )));
        }
        *spec = next;

        for op in plan.removals() {
            if let ProvisioningOp::Remove {
                local_id,
                kind: ResourceKind::Node,
            } = op
            {
                self.connectivity.release(local_id).await;
            }
        }
        Ok(self.engine.record_modification(&plan))
    }

    /// Close every session and delete the slice
    pub async fn delete(&self) -> SliceResult<Arc<TopologyGraph>> {
        self.connectivity.close_all().await;

        info!("Deleting slice {}", self.slice_id);
        if !self.control_plane.delete(&self.slice_id).await? {
            return Err(SliceError::Conflict(format!(
                "control plane refused to delete {}",
                self.slice_id
            )));
        }
        Ok(self.engine.record_deletion())
    }

    pub async fn session(&self, node: &str) -> Option<ConnectivitySession> {
        self.connectivity.session(node).await
    }

    /// Check a node's session, marking the node unreachable when it is gone
    pub async fn probe(&self, node: &str) -> SliceResult<()> {
        self.ensure_alive()?;
        let result = self.connectivity.probe(node).await;
        let outcome = ReachabilityOutcome {
            node: node.to_string(),
            result: result.as_ref().map(|_| ()).map_err(|e| e.to_string()),
        };
        self.engine.record_connectivity(&[outcome]);
        result
    }

    /// Run `operation` on a short-lived session to `node`
    ///
    /// The session is closed when the operation finishes, successfully or
    /// not, when `cancel` fires, and when this future is dropped.
    pub async fn with_session<F, Fut, T>(
        &self,
        node: &str,
        cancel: &CancelToken,
        operation: F,
    ) -> SliceResult<T>
    where
        F: FnOnce(ConnectivitySession) -> Fut,
        Fut: std::future::Future<Output = SliceResult<T>>,
    {
        self.ensure_alive()?;
        let graph = self.snapshot();
        let management_ip = graph
            .resource(node)
            .filter(|r| r.kind == ResourceKind::Node && r.state().is_active())
            .and_then(|r| r.management_ip)
            .ok_or_else(|| SliceError::Connect(format!("{node} has no reachable management address")))?;

        self.connectivity
            .with_session(node, management_ip, cancel, operation)
            .await
    }

    pub async fn release_session(&self, node: &str) -> bool {
        self.connectivity.release(node).await
    }

    /// Close all sessions without touching the slice
    pub async fn close_sessions(&self) {
        self.connectivity.close_all().await;
    }
}
