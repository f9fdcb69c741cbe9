//! Worker boundary: runs the classifier and planner on a dedicated thread and
//! exposes them to async callers through correlation-id tagged messages.
//!
//! Route requests never fail at this layer. When the worker cannot answer
//! (not started, no data, crashed, timed out) the caller gets the direct line
//! back with `success: false` and a reason.

pub mod protocol;
mod runner;
mod supervisor;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use seaway_core::{
    BoundingBox, ClassifierStats, FailureReason, GeoPoint, PlannerConfig, RouteRequest,
    RouteResult, SourceError, WaterClassification, WaterClassifier,
};

use protocol::{Command, Envelope, Reply};

/// Builds the classifier for each worker generation. Runs on the worker thread.
pub type ClassifierFactory = dyn Fn() -> Result<WaterClassifier, SourceError> + Send + Sync;

#[derive(Debug, Error)]
pub enum BoundaryError {
    #[error("worker is not running")]
    Unavailable,
    #[error("water data is unavailable")]
    DataUnavailable,
    #[error("worker did not answer within {0:?}")]
    Timeout(Duration),
    #[error("worker exited before answering")]
    WorkerExited,
    #[error("worker boundary is shutting down")]
    ShuttingDown,
    #[error("worker sent an unexpected reply to {0}")]
    UnexpectedReply(&'static str),
    #[error(transparent)]
    Source(#[from] SourceError),
}

impl BoundaryError {
    /// Reason reported on the degraded route for this error.
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            BoundaryError::DataUnavailable => FailureReason::DataUnavailable,
            BoundaryError::Timeout(_) => FailureReason::Timeout,
            _ => FailureReason::WorkerUnavailable,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub request_timeout: Duration,
    pub max_restarts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub queue_capacity: usize,
    pub planner: PlannerConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_restarts: 3,
            backoff_base: Duration::from_millis(250),
            backoff_max: Duration::from_secs(4),
            queue_capacity: 64,
            planner: PlannerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Starting,
    Ready,
    Unavailable,
    ShuttingDown,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundaryStatus {
    pub state: WorkerState,
    pub generation: u64,
    pub restarts: u32,
    pub in_flight: usize,
    /// Set when the data source could not be attached; routes degrade until restart.
    pub data_absent: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug)]
struct Lifecycle {
    state: WorkerState,
    generation: u64,
    restarts: u32,
    data_absent: bool,
    started_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    sender: Option<mpsc::Sender<Envelope>>,
}

pub(crate) struct Shared {
    config: WorkerConfig,
    factory: Arc<ClassifierFactory>,
    next_id: AtomicU64,
    pending: DashMap<u64, oneshot::Sender<Reply>>,
    lifecycle: Mutex<Lifecycle>,
    shutdown: broadcast::Sender<()>,
}

impl Shared {
    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_generation(&self) -> u64 {
        let mut life = self.lifecycle();
        life.generation += 1;
        life.state = WorkerState::Starting;
        life.generation
    }

    fn mark_ready(&self, sender: mpsc::Sender<Envelope>) {
        let mut life = self.lifecycle();
        life.sender = Some(sender);
        life.data_absent = false;
        life.started_at = Some(Utc::now());
        if life.state != WorkerState::ShuttingDown {
            life.state = WorkerState::Ready;
        }
    }

    fn mark_data_unavailable(&self, reason: String) {
        let mut life = self.lifecycle();
        life.data_absent = true;
        life.last_error = Some(reason);
        life.sender = None;
        if life.state != WorkerState::ShuttingDown {
            life.state = WorkerState::Unavailable;
        }
    }

    fn mark_unavailable(&self, reason: String) {
        let mut life = self.lifecycle();
        life.last_error = Some(reason);
        life.sender = None;
        if life.state != WorkerState::ShuttingDown {
            life.state = WorkerState::Unavailable;
        }
    }

    fn record_restart(&self) {
        let mut life = self.lifecycle();
        life.restarts += 1;
        life.last_error = Some("worker exited".to_string());
    }

    fn take_sender(&self) -> Option<mpsc::Sender<Envelope>> {
        self.lifecycle().sender.take()
    }

    /// The worker is gone; refuse requests until the next generation is ready.
    fn mark_exited(&self) {
        let mut life = self.lifecycle();
        life.sender = None;
        if life.state != WorkerState::ShuttingDown {
            life.state = WorkerState::Starting;
        }
    }

    /// Drop every waiting caller; their receivers see the worker as exited.
    fn reject_in_flight(&self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    fn sender(&self) -> Result<mpsc::Sender<Envelope>, BoundaryError> {
        let life = self.lifecycle();
        match (&life.sender, life.state) {
            (_, WorkerState::ShuttingDown) => Err(BoundaryError::ShuttingDown),
            (Some(sender), WorkerState::Ready) => Ok(sender.clone()),
            _ if life.data_absent => Err(BoundaryError::DataUnavailable),
            _ => Err(BoundaryError::Unavailable),
        }
    }
}

/// Handle to the worker. Cheap to clone; all clones talk to the same worker.
#[derive(Clone)]
pub struct WorkerBoundary {
    shared: Arc<Shared>,
    supervisor: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl WorkerBoundary {
    pub fn new<F>(config: WorkerConfig, factory: F) -> Self
    where
        F: Fn() -> Result<WaterClassifier, SourceError> + Send + Sync + 'static,
    {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            shared: Arc::new(Shared {
                config,
                factory: Arc::new(factory),
                next_id: AtomicU64::new(1),
                pending: DashMap::new(),
                lifecycle: Mutex::new(Lifecycle {
                    state: WorkerState::Unavailable,
                    generation: 0,
                    restarts: 0,
                    data_absent: false,
                    started_at: None,
                    last_error: None,
                    sender: None,
                }),
                shutdown,
            }),
            supervisor: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the worker and wait until it has attached its data, or until
    /// startup has definitely failed. Calling it again is a no-op.
    pub async fn initialize(&self) -> Result<(), BoundaryError> {
        let (init_tx, init_rx) = oneshot::channel();
        {
            let mut guard = self.supervisor.lock().unwrap_or_else(PoisonError::into_inner);
            if guard.is_some() {
                return Ok(());
            }
            let shutdown = self.shared.shutdown.subscribe();
            *guard = Some(tokio::spawn(supervisor::supervise(
                self.shared.clone(),
                shutdown,
                init_tx,
            )));
        }
        init_rx.await.unwrap_or(Err(BoundaryError::Unavailable))
    }

    /// Plan a route on the worker. Always returns a result; failures at the
    /// boundary degrade to the direct line.
    pub async fn find_route(&self, request: RouteRequest) -> RouteResult {
        match self.call(Command::FindRoute(request)).await {
            Ok(Reply::Route(result)) => result,
            Ok(_) => {
                tracing::error!("Worker answered find_route with the wrong reply");
                RouteResult::failed(request.start, request.end, FailureReason::WorkerUnavailable)
            }
            Err(err) => {
                tracing::warn!("Route request degraded to direct line: {}", err);
                RouteResult::failed(request.start, request.end, err.failure_reason())
            }
        }
    }

    pub async fn classify(&self, point: GeoPoint) -> Result<WaterClassification, BoundaryError> {
        match self.call(Command::Classify(point)).await? {
            Reply::Classification(class) => Ok(class),
            _ => Err(BoundaryError::UnexpectedReply("classify")),
        }
    }

    pub async fn is_water(&self, point: GeoPoint) -> Result<bool, BoundaryError> {
        Ok(self.classify(point).await?.is_water())
    }

    /// Make data for `bounds` resident on the worker.
    pub async fn preload(&self, bounds: BoundingBox) -> Result<usize, BoundaryError> {
        match self.call(Command::Preload(bounds)).await? {
            Reply::Preloaded(result) => Ok(result?),
            _ => Err(BoundaryError::UnexpectedReply("preload")),
        }
    }

    pub async fn worker_stats(&self) -> Result<ClassifierStats, BoundaryError> {
        match self.call(Command::Stats).await? {
            Reply::Stats(stats) => Ok(stats),
            _ => Err(BoundaryError::UnexpectedReply("stats")),
        }
    }

    pub fn status(&self) -> BoundaryStatus {
        let life = self.shared.lifecycle();
        BoundaryStatus {
            state: life.state,
            generation: life.generation,
            restarts: life.restarts,
            in_flight: self.shared.pending.len(),
            data_absent: life.data_absent,
            started_at: life.started_at,
            last_error: life.last_error.clone(),
        }
    }

    /// Stop accepting requests, let the worker answer what is already
    /// queued, and join it. Callers still waiting after that are rejected.
    pub async fn shutdown(&self) {
        self.shared.lifecycle().state = WorkerState::ShuttingDown;
        let _ = self.shared.shutdown.send(());
        let handle = self
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::error!("Worker supervisor task failed: {}", err);
            }
        }
        self.shared.reject_in_flight();
    }

    async fn call(&self, command: Command) -> Result<Reply, BoundaryError> {
        let sender = self.shared.sender()?;
        let timeout = self.shared.config.request_timeout;
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();
        self.shared.pending.insert(id, reply_tx);

        let exchange = async {
            sender
                .send(Envelope { id, command })
                .await
                .map_err(|_| BoundaryError::WorkerExited)?;
            reply_rx.await.map_err(|_| BoundaryError::WorkerExited)
        };
        let outcome = match tokio::time::timeout(timeout, exchange).await {
            Ok(outcome) => outcome,
            Err(_) => Err(BoundaryError::Timeout(timeout)),
        };
        if outcome.is_err() {
            self.shared.pending.remove(&id);
        }
        outcome
    }
}

impl std::fmt::Debug for WorkerBoundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerBoundary")
            .field("status", &self.status())
            .finish()
    }
}
