//! The dedicated worker thread that owns the classifier and planner.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use seaway_core::{PlannerConfig, RoutePlanner, WaterClassifier};
use tokio::sync::{mpsc, oneshot};

use super::protocol::{Command, Envelope, Reply, ReplyEnvelope};
use super::ClassifierFactory;

/// Channels and thread handle for one worker generation.
pub(crate) struct WorkerHandle {
    pub thread: JoinHandle<()>,
    pub requests: mpsc::Sender<Envelope>,
    pub replies: mpsc::UnboundedReceiver<ReplyEnvelope>,
    /// `Ok` once data is attached, `Err` with the reason when it could not be.
    /// Dropped without a value if the thread dies during startup.
    pub ready: oneshot::Receiver<Result<(), String>>,
}

pub(crate) fn spawn(
    generation: u64,
    factory: Arc<ClassifierFactory>,
    planner: PlannerConfig,
    queue_capacity: usize,
) -> std::io::Result<WorkerHandle> {
    let (request_tx, request_rx) = mpsc::channel(queue_capacity);
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();
    let (ready_tx, ready_rx) = oneshot::channel();

    let thread = std::thread::Builder::new()
        .name(format!("seaway-worker-{}", generation))
        .spawn(move || {
            let started = Instant::now();
            let classifier = match factory() {
                Ok(classifier) if classifier.has_source() => classifier,
                Ok(_) => {
                    let _ = ready_tx.send(Err("no water source configured".to_string()));
                    return;
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err.to_string()));
                    return;
                }
            };
            tracing::info!(
                "Worker generation {} ready in {:?}",
                generation,
                started.elapsed()
            );
            if ready_tx.send(Ok(())).is_err() {
                return;
            }
            run(classifier, RoutePlanner::new(planner), request_rx, reply_tx);
            tracing::info!("Worker generation {} stopped", generation);
        })?;

    Ok(WorkerHandle {
        thread,
        requests: request_tx,
        replies: reply_rx,
        ready: ready_rx,
    })
}

fn run(
    mut classifier: WaterClassifier,
    planner: RoutePlanner,
    mut requests: mpsc::Receiver<Envelope>,
    replies: mpsc::UnboundedSender<ReplyEnvelope>,
) {
    while let Some(Envelope { id, command }) = requests.blocking_recv() {
        let started = Instant::now();
        let name = command.name();
        let reply = match command {
            Command::Shutdown => break,
            Command::FindRoute(request) => {
                Reply::Route(planner.find_route(&mut classifier, &request))
            }
            Command::Classify(point) => Reply::Classification(classifier.classify(point)),
            Command::Preload(bounds) => Reply::Preloaded(classifier.preload(&bounds)),
            Command::Stats => Reply::Stats(classifier.stats()),
        };
        tracing::debug!("Worker handled {} #{} in {:?}", name, id, started.elapsed());

        if replies.send(ReplyEnvelope { id, reply }).is_err() {
            break;
        }
    }
}
