use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use errors::MutationError;
use parking_lot::Mutex;
use rc_core::{ConfigRpc, ResourceKind, ResourceParams};
use serde_json::Value;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    List,
    Create,
    Update,
    Delete,
}

/// Wraps an RPC and fails scripted calls.
///
/// Failures queued with [`FlakyRpc::fail_next`] are consumed one per call of
/// that verb; the inner RPC is not reached for a failed call.
pub struct FlakyRpc {
    inner: Arc<dyn ConfigRpc>,
    failures: Mutex<HashMap<Verb, VecDeque<MutationError>>>,
    calls: DashMap<Verb, usize>,
}

impl FlakyRpc {
    pub fn new(inner: Arc<dyn ConfigRpc>) -> Self {
        Self {
            inner,
            failures: Mutex::new(HashMap::new()),
            calls: DashMap::new(),
        }
    }

    pub fn fail_next(&self, verb: Verb, times: usize, error: MutationError) {
        let mut failures = self.failures.lock();
        let queue = failures.entry(verb).or_default();
        queue.extend(std::iter::repeat_n(error, times));
    }

    pub fn calls(&self, verb: Verb) -> usize {
        self.calls.get(&verb).map(|count| *count).unwrap_or(0)
    }

    fn enter(&self, verb: Verb) -> Result<(), MutationError> {
        *self.calls.entry(verb).or_insert(0) += 1;
        match self.failures.lock().get_mut(&verb).and_then(VecDeque::pop_front) {
            Some(error) => {
                tracing::debug!("Injecting {:?} failure: {}", verb, error);
                Err(error)
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ConfigRpc for FlakyRpc {
    async fn get(
        &self,
        kind: ResourceKind,
        key: &ResourceParams,
    ) -> Result<Option<Value>, MutationError> {
        self.enter(Verb::Get)?;
        self.inner.get(kind, key).await
    }

    async fn list(
        &self,
        kind: ResourceKind,
        filter: &ResourceParams,
    ) -> Result<Vec<Value>, MutationError> {
        self.enter(Verb::List)?;
        self.inner.list(kind, filter).await
    }

    async fn create(&self, kind: ResourceKind, payload: Value) -> Result<Value, MutationError> {
        self.enter(Verb::Create)?;
        self.inner.create(kind, payload).await
    }

    async fn update(&self, kind: ResourceKind, payload: Value) -> Result<Value, MutationError> {
        self.enter(Verb::Update)?;
        self.inner.update(kind, payload).await
    }

    async fn delete(&self, kind: ResourceKind, payload: Value) -> Result<Value, MutationError> {
        self.enter(Verb::Delete)?;
        self.inner.delete(kind, payload).await
    }
}

/// Wraps an RPC and, while closed, parks every `get`/`list` response until
/// [`GatedRpc::open`] is called. Writes pass straight through.
///
/// A parked read has already taken its answer from the inner RPC, so
/// releasing it delivers data older than any write made in the meantime.
pub struct GatedRpc {
    inner: Arc<dyn ConfigRpc>,
    open: watch::Sender<bool>,
    parked: AtomicUsize,
}

impl GatedRpc {
    pub fn new(inner: Arc<dyn ConfigRpc>) -> Self {
        let (open, _) = watch::channel(true);
        Self {
            inner,
            open,
            parked: AtomicUsize::new(0),
        }
    }

    pub fn close(&self) {
        self.open.send_replace(false);
    }

    pub fn open(&self) {
        self.open.send_replace(true);
    }

    /// Reads currently parked at the gate.
    pub fn parked(&self) -> usize {
        self.parked.load(Ordering::SeqCst)
    }

    /// Yield until at least `count` reads are parked.
    pub async fn wait_for_parked(&self, count: usize) {
        while self.parked() < count {
            tokio::task::yield_now().await;
        }
    }

    async fn pass(&self) {
        let mut open = self.open.subscribe();
        if *open.borrow() {
            return;
        }
        self.parked.fetch_add(1, Ordering::SeqCst);
        // The sender lives as long as `self`, so waiting cannot fail.
        let _ = open.wait_for(|is_open| *is_open).await;
        self.parked.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConfigRpc for GatedRpc {
    async fn get(
        &self,
        kind: ResourceKind,
        key: &ResourceParams,
    ) -> Result<Option<Value>, MutationError> {
        let response = self.inner.get(kind, key).await;
        self.pass().await;
        response
    }

    async fn list(
        &self,
        kind: ResourceKind,
        filter: &ResourceParams,
    ) -> Result<Vec<Value>, MutationError> {
        let response = self.inner.list(kind, filter).await;
        self.pass().await;
        response
    }

    async fn create(&self, kind: ResourceKind, payload: Value) -> Result<Value, MutationError> {
        self.inner.create(kind, payload).await
    }

    async fn update(&self, kind: ResourceKind, payload: Value) -> Result<Value, MutationError> {
        self.inner.update(kind, payload).await
    }

    async fn delete(&self, kind: ResourceKind, payload: Value) -> Result<Value, MutationError> {
        self.inner.delete(kind, payload).await
    }
}
