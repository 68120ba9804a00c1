// Copyright (c) 2025 - Cowboy AI, Inc.
//! Single-writer snapshot publication
//!
//! The store owns the only mutable path to a slice's graph. Each update
//! replaces the whole snapshot, so readers see one merged poll round at a
//! time and never a partial update.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;

use super::TopologyGraph;

/// Writer side, held by the slice handle and lent to the engine
#[derive(Debug)]
pub struct TopologyStore {
    tx: watch::Sender<Arc<TopologyGraph>>,
    writer: Mutex<()>,
}

impl TopologyStore {
    pub fn new(graph: TopologyGraph) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(graph));
        Self {
            tx,
            writer: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> Arc<TopologyGraph> {
        self.tx.borrow().clone()
    }

    pub fn reader(&self) -> TopologyReader {
        TopologyReader {
            rx: self.tx.subscribe(),
        }
    }

    /// Derive the next graph from the current one and publish it
    ///
    /// Writers are serialised from the read through the publish, so two
    /// concurrent updates never overwrite each other. On `Err` nothing is
    /// published and readers are not woken. `step` must not call back into
    /// this store.
    pub(crate) fn update<T, E>(
        &self,
        step: impl FnOnce(&TopologyGraph) -> Result<(TopologyGraph, T), E>,
    ) -> Result<(Arc<TopologyGraph>, T), E> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.snapshot();
        let (next, extra) = step(&current)?;
        let next = Arc::new(next);
        self.tx.send_replace(next.clone());
        Ok((next, extra))
    }
}

/// Read-only view handed to callers
#[derive(Debug, Clone)]
pub struct TopologyReader {
    rx: watch::Receiver<Arc<TopologyGraph>>,
}

impl TopologyReader {
    pub fn snapshot(&self) -> Arc<TopologyGraph> {
        self.rx.borrow().clone()
    }

    /// Whether a snapshot was published since the last `changed`
    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }

    /// Wait for the next published snapshot
    ///
    /// Returns `None` once the store has been dropped.
    pub async fn changed(&mut self) -> Option<Arc<TopologyGraph>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}
