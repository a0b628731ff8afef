//! Request queue for work that cannot be serviced immediately.
//!
//! Ordering: highest priority first, FIFO within a priority. Draining is
//! sequential: the first rate-limit signal puts the item back at the front of
//! its bucket and ends the pass, so a throttled provider is not hammered with
//! the rest of the backlog.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::types::{Error, QueueConfig, RequestId, Result};

// =============================================================================
// Deferred work
// =============================================================================

/// Work deferred until a backend can take it.
///
/// Sync and async callables both go through this one method; see [`FnWork`]
/// and [`SyncFnWork`].
#[async_trait]
pub trait DeferredWork: Send + Sync {
    async fn execute(&self, args: Value) -> Result<Value>;
}

/// Async closure adapter.
pub struct FnWork {
    f: Box<dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>,
}

impl FnWork {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            f: Box::new(move |args| f(args).boxed()),
        }
    }

    pub fn shared<F, Fut>(f: F) -> Arc<dyn DeferredWork>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Arc::new(Self::new(f))
    }
}

impl std::fmt::Debug for FnWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnWork")
    }
}

#[async_trait]
impl DeferredWork for FnWork {
    async fn execute(&self, args: Value) -> Result<Value> {
        (self.f)(args).await
    }
}

/// Sync closure adapter.
pub struct SyncFnWork<F>(F);

impl<F> SyncFnWork<F>
where
    F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
{
    pub fn shared(f: F) -> Arc<dyn DeferredWork> {
        Arc::new(Self(f))
    }
}

impl<F> std::fmt::Debug for SyncFnWork<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SyncFnWork")
    }
}

#[async_trait]
impl<F> DeferredWork for SyncFnWork<F>
where
    F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
{
    async fn execute(&self, args: Value) -> Result<Value> {
        (self.0)(args)
    }
}

// =============================================================================
// Queue entries
// =============================================================================

/// A pending request.
#[derive(Clone)]
pub struct QueuedRequest {
    pub id: RequestId,
    pub created_at: DateTime<Utc>,
    pub priority: i32,
    pub args: Value,
    work: Arc<dyn DeferredWork>,
    /// Insertion order, breaks ties between equal timestamps.
    seq: u64,
}

impl std::fmt::Debug for QueuedRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedRequest")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("priority", &self.priority)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

impl PartialEq for QueuedRequest {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedRequest {}

impl Ord for QueuedRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is max-heap: higher priority wins
        self.priority
            .cmp(&other.priority)
            // Then FIFO: older first
            .then_with(|| other.created_at.cmp(&self.created_at))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// =============================================================================
// Outcomes and inspection
// =============================================================================

/// What happened to one item during a drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainStatus {
    Completed,
    Failed,
    TimedOut,
    Requeued,
}

/// Per-item drain result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrainOutcome {
    pub id: RequestId,
    pub status: DrainStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DrainOutcome {
    fn completed(id: RequestId, result: Value) -> Self {
        Self {
            id,
            status: DrainStatus::Completed,
            result: Some(result),
            error: None,
        }
    }

    fn with_error(id: RequestId, status: DrainStatus, error: impl Into<String>) -> Self {
        Self {
            id,
            status,
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == DrainStatus::Completed
    }
}

/// Pending item as shown on the admin surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingItem {
    pub id: RequestId,
    pub priority: i32,
    pub age_seconds: f64,
}

/// Queue summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueInfo {
    pub size: usize,
    pub max_size: usize,
    /// Popped by a running drain; still counted against `max_size`.
    pub in_flight: usize,
    pub timeout_seconds: u64,
    /// In drain order.
    pub items: Vec<PendingItem>,
}

// =============================================================================
// Request queue
// =============================================================================

/// Bounded priority queue of deferred requests.
///
/// Capacity covers pending items plus items whose work is currently running,
/// so a rate-limited item always has its slot back when it is requeued.
///
/// NOT an actor - wrapped by [`SharedQueue`] for concurrent use.
#[derive(Debug)]
pub struct RequestQueue {
    max_size: usize,
    timeout: Duration,
    heap: BinaryHeap<QueuedRequest>,
    next_seq: u64,
    in_flight: Arc<AtomicUsize>,
}

/// Slot held by a request whose work is running. Released on drop.
#[derive(Debug)]
pub struct InFlight {
    counter: Arc<AtomicUsize>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, AtomicOrdering::SeqCst);
    }
}

impl RequestQueue {
    pub fn new(config: &QueueConfig) -> Self {
        Self {
            max_size: config.max_size,
            timeout: Duration::from_std(config.timeout).unwrap_or_else(|_| Duration::minutes(5)),
            heap: BinaryHeap::new(),
            next_seq: 0,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Add a request stamped with the current time. `false` when full.
    pub fn enqueue(
        &mut self,
        id: RequestId,
        work: Arc<dyn DeferredWork>,
        args: Value,
        priority: i32,
    ) -> bool {
        self.enqueue_at(id, work, args, priority, Utc::now())
    }

    pub fn enqueue_at(
        &mut self,
        id: RequestId,
        work: Arc<dyn DeferredWork>,
        args: Value,
        priority: i32,
        created_at: DateTime<Utc>,
    ) -> bool {
        let in_flight = self.in_flight();
        if self.heap.len() + in_flight >= self.max_size {
            tracing::warn!(
                "queue_full: rejected id={}, size={}, in_flight={}, max_size={}",
                id,
                self.heap.len(),
                in_flight,
                self.max_size
            );
            return false;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        tracing::debug!("request_queued: id={}, priority={}", id, priority);
        self.heap.push(QueuedRequest {
            id,
            created_at,
            priority,
            args,
            work,
            seq,
        });
        true
    }

    /// Pop the next request and reserve its slot until the returned
    /// [`InFlight`] is dropped.
    pub fn pop_in_flight(&mut self) -> Option<(QueuedRequest, InFlight)> {
        let request = self.heap.pop()?;
        self.in_flight.fetch_add(1, AtomicOrdering::SeqCst);
        let slot = InFlight {
            counter: self.in_flight.clone(),
        };
        Some((request, slot))
    }

    /// Put an in-flight request back in the slot it held. Its original
    /// timestamp and sequence keep it at the front of its priority bucket.
    pub fn requeue(&mut self, request: QueuedRequest, slot: InFlight) {
        self.heap.push(request);
        drop(slot);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(AtomicOrdering::SeqCst)
    }

    pub fn is_expired_at(&self, request: &QueuedRequest, now: DateTime<Utc>) -> bool {
        now - request.created_at > self.timeout
    }

    pub fn clear(&mut self) -> usize {
        let removed = self.heap.len();
        self.heap.clear();
        tracing::info!("queue_cleared: removed={}", removed);
        removed
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn info_at(&self, now: DateTime<Utc>) -> QueueInfo {
        let mut ordered = self.heap.clone().into_sorted_vec();
        ordered.reverse();

        QueueInfo {
            size: self.heap.len(),
            max_size: self.max_size,
            in_flight: self.in_flight(),
            timeout_seconds: self.timeout.num_seconds().max(0) as u64,
            items: ordered
                .into_iter()
                .map(|r| PendingItem {
                    age_seconds: (now - r.created_at).num_milliseconds() as f64 / 1000.0,
                    id: r.id,
                    priority: r.priority,
                })
                .collect(),
        }
    }
}

// =============================================================================
// Shared queue + drain
// =============================================================================

/// Queue shared between request handlers and the drain loop.
///
/// The queue lock is only held for pops and pushes, never while work runs, so
/// work may enqueue or report back freely. Drain passes are serialized by a
/// separate lock.
#[derive(Debug)]
pub struct SharedQueue {
    queue: Mutex<RequestQueue>,
    drain_lock: Mutex<()>,
}

impl SharedQueue {
    pub fn new(config: &QueueConfig) -> Self {
        Self {
            queue: Mutex::new(RequestQueue::new(config)),
            drain_lock: Mutex::new(()),
        }
    }

    pub async fn enqueue(
        &self,
        id: RequestId,
        work: Arc<dyn DeferredWork>,
        args: Value,
        priority: i32,
    ) -> bool {
        self.queue.lock().await.enqueue(id, work, args, priority)
    }

    pub async fn enqueue_at(
        &self,
        id: RequestId,
        work: Arc<dyn DeferredWork>,
        args: Value,
        priority: i32,
        created_at: DateTime<Utc>,
    ) -> bool {
        self.queue
            .lock()
            .await
            .enqueue_at(id, work, args, priority, created_at)
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }

    pub async fn info(&self) -> QueueInfo {
        self.queue.lock().await.info_at(Utc::now())
    }

    pub async fn clear(&self) -> usize {
        self.queue.lock().await.clear()
    }

    /// Run one drain pass and return the outcome of every item touched.
    pub async fn drain(&self) -> Vec<DrainOutcome> {
        let _pass = self.drain_lock.lock().await;
        let mut outcomes = Vec::new();

        loop {
            let (request, slot, expired) = {
                let mut queue = self.queue.lock().await;
                let Some((request, slot)) = queue.pop_in_flight() else {
                    break;
                };
                let expired = queue.is_expired_at(&request, Utc::now());
                (request, slot, expired)
            };

            if expired {
                drop(slot);
                tracing::warn!("queued_request_timed_out: id={}", request.id);
                outcomes.push(DrainOutcome::with_error(
                    request.id,
                    DrainStatus::TimedOut,
                    "Request timed out in queue",
                ));
                continue;
            }

            match run_work(&request).await {
                Ok(result) => {
                    drop(slot);
                    tracing::debug!("queued_request_completed: id={}", request.id);
                    outcomes.push(DrainOutcome::completed(request.id, result));
                }
                Err(e) if e.is_rate_limit() => {
                    tracing::warn!(
                        "queue_drain_halted: id={} hit rate limit, requeued: {}",
                        request.id,
                        e
                    );
                    let id = request.id.clone();
                    self.queue.lock().await.requeue(request, slot);
                    outcomes.push(DrainOutcome::with_error(id, DrainStatus::Requeued, e.to_string()));
                    break;
                }
                Err(e) => {
                    drop(slot);
                    tracing::warn!("queued_request_failed: id={}, error={}", request.id, e);
                    outcomes.push(DrainOutcome::with_error(
                        request.id,
                        DrainStatus::Failed,
                        e.to_string(),
                    ));
                }
            }
        }

        outcomes
    }
}

/// Execute a request's work, turning a panic into a failure.
async fn run_work(request: &QueuedRequest) -> Result<Value> {
    let future = request.work.execute(request.args.clone());
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!("queued_work_panicked: id={}", request.id);
            Err(Error::work(format!("work for {} panicked", request.id)))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
