// Copyright (c) 2025 - Cowboy AI, Inc.
//! Management-network connectivity
//!
//! Opens one session per Active node over a pluggable transport, retrying
//! with jittered exponential backoff while freshly booted nodes come up.
//! Nodes that never answer are reported back as unreachable rather than
//! failing the slice.

pub mod scripted;

pub use scripted::{ScriptedSession, ScriptedTransport};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::config::RetryPolicy;
use crate::domain::LocalId;
use crate::errors::{SliceError, SliceResult};
use crate::reconcile::ReachabilityOutcome;

/// Management-network connection failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectError {
    #[error("connection refused by {0}")]
    Refused(IpAddr),

    #[error("authentication failed for {user}@{ip}")]
    Authentication { user: String, ip: IpAddr },

    #[error("attempt timed out after {0:?}")]
    TimedOut(Duration),

    #[error("session closed")]
    Closed,

    #[error("{0}")]
    Io(String),

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

/// Login material for the management network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub private_key: PathBuf,
    /// Jump host in front of the management network, if any
    pub bastion: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, private_key: impl Into<PathBuf>) -> Self {
        Self {
            username: username.into(),
            private_key: private_key.into(),
            bastion: None,
        }
    }

    pub fn via_bastion(mut self, bastion: impl Into<String>) -> Self {
        self.bastion = Some(bastion.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: i32,
}

/// An open session to one node
#[async_trait]
pub trait SessionHandle: Send + Sync {
    fn management_ip(&self) -> IpAddr;

    /// Cheap liveness check
    async fn probe(&self) -> Result<(), ConnectError>;

    async fn execute(&self, command: &str) -> Result<CommandOutput, ConnectError>;

    async fn upload(&self, remote_path: &str, contents: &[u8]) -> Result<(), ConnectError>;

    async fn download(&self, remote_path: &str) -> Result<Vec<u8>, ConnectError>;

    async fn close(&self) -> Result<(), ConnectError>;
}

/// Opens sessions; SSH in production, scripted in tests
#[async_trait]
pub trait ConnectivityTransport: Send + Sync {
    async fn open(
        &self,
        management_ip: IpAddr,
        credentials: &Credentials,
    ) -> Result<Box<dyn SessionHandle>, ConnectError>;
}

/// A live session owned by the manager
#[derive(Clone)]
pub struct ConnectivitySession {
    pub id: Uuid,
    pub node: LocalId,
    pub opened_at: DateTime<Utc>,
    handle: Arc<dyn SessionHandle>,
}

impl std::fmt::Debug for ConnectivitySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivitySession")
            .field("id", &self.id)
            .field("node", &self.node)
            .field("management_ip", &self.handle.management_ip())
            .field("opened_at", &self.opened_at)
            .finish()
    }
}

impl ConnectivitySession {
    fn new(node: LocalId, handle: Box<dyn SessionHandle>) -> Self {
        Self {
            id: Uuid::now_v7(),
            node,
            opened_at: Utc::now(),
            handle: Arc::from(handle),
        }
    }

    pub fn management_ip(&self) -> IpAddr {
        self.handle.management_ip()
    }

    pub async fn probe(&self) -> Result<(), ConnectError> {
        self.handle.probe().await
    }

    pub async fn execute(&self, command: &str) -> Result<CommandOutput, ConnectError> {
        debug!("[{}] exec {}", self.node, command);
        self.handle.execute(command).await
    }

    pub async fn upload(&self, remote_path: &str, contents: &[u8]) -> Result<(), ConnectError> {
        self.handle.upload(remote_path, contents).await
    }

    pub async fn download(&self, remote_path: &str) -> Result<Vec<u8>, ConnectError> {
        self.handle.download(remote_path).await
    }

    async fn close(&self) {
        match self.handle.close().await {
            Ok(()) => debug!("Closed session {} to {}", self.id, self.node),
            Err(e) => warn!("Closing session {} to {} failed: {}", self.id, self.node, e),
        }
    }
}

/// Closes a scoped session that is dropped before [`close`](Self::close) runs
struct ScopedSession(Option<ConnectivitySession>);

impl ScopedSession {
    async fn close(mut self) {
        if let Some(session) = self.0.take() {
            session.close().await;
        }
    }
}

impl Drop for ScopedSession {
    fn drop(&mut self) {
        let Some(session) = self.0.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!("Closing abandoned session {} to {}", session.id, session.node);
                runtime.spawn(async move { session.close().await });
            }
            Err(_) => warn!(
                "Session {} to {} dropped outside a runtime, left open",
                session.id, session.node
            ),
        }
    }
}

async fn open_with_retry(
    transport: Arc<dyn ConnectivityTransport>,
    credentials: Arc<Credentials>,
    policy: RetryPolicy,
    node: LocalId,
    ip: IpAddr,
) -> Result<Box<dyn SessionHandle>, ConnectError> {
    let mut last = ConnectError::Closed;

    for attempt in 0..policy.max_attempts {
        debug!("Connecting to {} at {} (attempt {})", node, ip, attempt + 1);

        match timeout(policy.attempt_timeout(), transport.open(ip, &credentials)).await {
            Ok(Ok(handle)) => {
                info!("Connected to {} at {}", node, ip);
                return Ok(handle);
            }
            Ok(Err(e)) => {
                warn!("Connection to {} at {} failed: {}", node, ip, e);
                last = e;
            }
            Err(_) => {
                warn!("Connection to {} at {} timed out", node, ip);
                last = ConnectError::TimedOut(policy.attempt_timeout());
            }
        }

        if attempt + 1 < policy.max_attempts {
            let backoff = policy.calculate_backoff(attempt);
            debug!("Backing off for {:?} before retry", backoff);
            sleep(backoff).await;
        }
    }

    Err(ConnectError::Exhausted {
        attempts: policy.max_attempts,
        last: last.to_string(),
    })
}

type WorkerResult = (LocalId, Result<Box<dyn SessionHandle>, ConnectError>);

/// Owns every session of one slice
pub struct ConnectivityManager {
    transport: Arc<dyn ConnectivityTransport>,
    credentials: Arc<Credentials>,
    policy: RetryPolicy,
    sessions: Mutex<HashMap<LocalId, ConnectivitySession>>,
}

impl ConnectivityManager {
    pub fn new(
        transport: Arc<dyn ConnectivityTransport>,
        credentials: Credentials,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            credentials: Arc::new(credentials),
            policy,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Open sessions to every node that does not have one yet
    ///
    /// One worker per node. Returns the reachability of each node handled.
    /// On cancellation every session, including ones opened by this call,
    /// is closed before returning.
    pub async fn connect_all(
        &self,
        nodes: Vec<(LocalId, IpAddr)>,
        cancel: &CancelToken,
    ) -> SliceResult<Vec<ReachabilityOutcome>> {
        let mut outcomes = Vec::new();
        let mut pending = Vec::new();
        {
            let sessions = self.sessions.lock().await;
            for (node, ip) in nodes {
                if sessions.contains_key(&node) {
                    outcomes.push(ReachabilityOutcome {
                        node,
                        result: Ok(()),
                    });
                } else {
                    pending.push((node, ip));
                }
            }
        }
        if pending.is_empty() {
            return Ok(outcomes);
        }

        info!("Opening sessions to {} nodes", pending.len());
        let (tx, mut rx) = mpsc::channel::<WorkerResult>(pending.len());
        let mut workers = JoinSet::new();

        for (node, ip) in pending {
            let tx = tx.clone();
            let transport = self.transport.clone();
            let credentials = self.credentials.clone();
            let policy = self.policy.clone();

            workers.spawn(async move {
                let result = open_with_retry(transport, credentials, policy, node.clone(), ip).await;
                // Receiver only goes away on cancellation
                let _ = tx.send((node, result)).await;
            });
        }
        drop(tx);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    workers.abort_all();
                    while workers.join_next().await.is_some() {}
                    while let Ok((_, result)) = rx.try_recv() {
                        if let Ok(handle) = result {
                            let _ = handle.close().await;
                        }
                    }
                    self.close_all().await;
                    info!("Connectivity cancelled");
                    return Err(SliceError::Cancelled { snapshot: None });
                }
                received = rx.recv() => match received {
                    Some((node, Ok(handle))) => {
                        let session = ConnectivitySession::new(node.clone(), handle);
                        self.sessions.lock().await.insert(node.clone(), session);
                        outcomes.push(ReachabilityOutcome { node, result: Ok(()) });
                    }
                    Some((node, Err(e))) => {
                        warn!("Node {} is unreachable: {}", node, e);
                        outcomes.push(ReachabilityOutcome { node, result: Err(e.to_string()) });
                    }
                    None => break,
                },
            }
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!("Connectivity worker failed: {}", e);
            }
        }
        Ok(outcomes)
    }

    pub async fn session(&self, node: &str) -> Option<ConnectivitySession> {
        self.sessions.lock().await.get(node).cloned()
    }

    pub async fn open_sessions(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Probe a node's session; a dead session is dropped
    pub async fn probe(&self, node: &str) -> SliceResult<()> {
        let session = self
            .session(node)
            .await
            .ok_or_else(|| SliceError::Connect(format!("no session to {node}")))?;

        if let Err(e) = session.probe().await {
            warn!("Probe of {} failed: {}", node, e);
            self.release(node).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Run `operation` on a dedicated session that is closed afterwards
    ///
    /// The session is closed on every exit: completion, cancellation, or the
    /// returned future being dropped.
    pub async fn with_session<F, Fut, T>(
        &self,
        node: &str,
        management_ip: IpAddr,
        cancel: &CancelToken,
        operation: F,
    ) -> SliceResult<T>
    where
        F: FnOnce(ConnectivitySession) -> Fut,
        Fut: Future<Output = SliceResult<T>>,
    {
        let opening = open_with_retry(
            self.transport.clone(),
            self.credentials.clone(),
            self.policy.clone(),
            node.to_string(),
            management_ip,
        );
        let handle = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SliceError::Cancelled { snapshot: None }),
            opened = opening => opened?,
        };
        let session = ConnectivitySession::new(node.to_string(), handle);
        let scoped = ScopedSession(Some(session.clone()));

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Operation on {} cancelled", node);
                Err(SliceError::Cancelled { snapshot: None })
            }
            result = operation(session) => result,
        };
        scoped.close().await;
        result
    }

    /// Close and forget a node's session
    pub async fn release(&self, node: &str) -> bool {
        let removed = self.sessions.lock().await.remove(node);
        match removed {
            Some(session) => {
                session.close().await;
                true
            }
            None => false,
        }
    }

    pub async fn close_all(&self) {
        let sessions: Vec<_> = self.sessions.lock().await.drain().map(|(_, s)| s).collect();
        if sessions.is_empty() {
            return;
        }
        info!("Closing {} sessions", sessions.len());
        join_all(sessions.iter().map(|s| s.close())).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_ms: 1,
            factor: 2.0,
            jitter_percent: 0.0,
            max_ms: 5,
            attempt_timeout_ms: 200,
        }
    }

    fn manager(transport: Arc<ScriptedTransport>) -> ConnectivityManager {
        ConnectivityManager::new(transport, Credentials::new("ubuntu", "/tmp/key"), fast_policy())
    }

    #[tokio::test]
    async fn test_retries_until_node_answers() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.fail_first(ip(1), 2).await;
        let manager = manager(transport.clone());

        let outcomes = manager
            .connect_all(vec![("n1".into(), ip(1))], &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(outcomes[0].result, Ok(()));
        assert_eq!(transport.attempts(ip(1)).await, 3);
        assert!(manager.session("n1").await.is_some());
    }

    #[tokio::test]
    async fn test_exhausted_node_has_no_session() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.fail_first(ip(2), 3).await;
        let manager = manager(transport.clone());

        let outcomes = manager
            .connect_all(vec![("n2".into(), ip(2))], &CancelToken::new())
            .await
            .unwrap();

        assert!(outcomes[0].result.is_err());
        assert!(manager.session("n2").await.is_none());
    }

    #[tokio::test]
    async fn test_existing_session_is_reused() {
        let transport = Arc::new(ScriptedTransport::new());
        let manager = manager(transport.clone());
        let cancel = CancelToken::new();

        manager.connect_all(vec![("n1".into(), ip(1))], &cancel).await.unwrap();
        manager.connect_all(vec![("n1".into(), ip(1))], &cancel).await.unwrap();

        assert_eq!(transport.attempts(ip(1)).await, 1);
    }

    #[tokio::test]
    async fn test_scoped_session_closes_on_error() {
        let transport = Arc::new(ScriptedTransport::new());
        let manager = manager(transport.clone());

        let result: SliceResult<()> = manager
            .with_session("n1", ip(1), &CancelToken::new(), |session| async move {
                session.execute("false").await?;
                Err(SliceError::Connect("command failed".into()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(transport.closed().await, vec![ip(1)]);
        assert_eq!(manager.open_sessions().await, 0);
    }

    #[tokio::test]
    async fn test_failed_probe_drops_session() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.fail_probes(ip(1)).await;
        let manager = manager(transport.clone());
        manager
            .connect_all(vec![("n1".into(), ip(1))], &CancelToken::new())
            .await
            .unwrap();

        assert!(manager.probe("n1").await.is_err());
        assert!(manager.session("n1").await.is_none());
        assert_eq!(transport.closed().await, vec![ip(1)]);
    }
}
