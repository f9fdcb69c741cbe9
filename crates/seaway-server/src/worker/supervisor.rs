//! Starts worker generations, routes their replies, and restarts them when
//! they die.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};

use super::protocol::{Command, Envelope, ReplyEnvelope};
use super::runner::{self, WorkerHandle};
use super::{BoundaryError, Shared};
use crate::backoff::Backoff;

enum PumpEnd {
    WorkerExited,
    Shutdown,
}

pub(crate) async fn supervise(
    shared: Arc<Shared>,
    mut shutdown: broadcast::Receiver<()>,
    init: oneshot::Sender<Result<(), BoundaryError>>,
) {
    let mut init = Some(init);
    let mut backoff = Backoff::new(shared.config.backoff_base, shared.config.backoff_max);

    loop {
        let generation = shared.begin_generation();
        let handle = match runner::spawn(
            generation,
            shared.factory.clone(),
            shared.config.planner.clone(),
            shared.config.queue_capacity,
        ) {
            Ok(handle) => handle,
            Err(err) => {
                tracing::error!("Failed to spawn worker thread: {}", err);
                shared.mark_unavailable(format!("spawn failed: {}", err));
                notify(&mut init, Err(BoundaryError::Unavailable));
                return;
            }
        };
        let WorkerHandle {
            thread,
            requests,
            mut replies,
            ready,
        } = handle;

        let end = match ready.await {
            Ok(Ok(())) => {
                shared.mark_ready(requests.clone());
                // Restart budget counts consecutive failures only.
                backoff.reset();
                notify(&mut init, Ok(()));
                pump(&shared, &mut replies, &mut shutdown).await
            }
            Ok(Err(reason)) => {
                tracing::warn!("Water data unavailable, routes will degrade: {}", reason);
                join(thread).await;
                shared.mark_data_unavailable(reason);
                notify(&mut init, Err(BoundaryError::DataUnavailable));
                return;
            }
            Err(_) => PumpEnd::WorkerExited,
        };

        match end {
            PumpEnd::Shutdown => {
                shared.take_sender();
                if requests
                    .send(Envelope {
                        id: 0,
                        command: Command::Shutdown,
                    })
                    .await
                    .is_err()
                {
                    tracing::debug!("Worker already gone at shutdown");
                }
                drop(requests);
                // Queued work ahead of the Shutdown envelope still gets answered.
                let delivered = drain(&shared, &mut replies).await;
                if delivered > 0 {
                    tracing::debug!("Delivered {} replies while shutting down", delivered);
                }
                join(thread).await;
                shared.reject_in_flight();
                tracing::info!("Worker boundary shut down");
                return;
            }
            PumpEnd::WorkerExited => {
                shared.mark_exited();
                drop(requests);
                join(thread).await;
                let rejected = shared.reject_in_flight();
                tracing::warn!(
                    "Worker generation {} exited, rejected {} in-flight requests",
                    generation,
                    rejected
                );
            }
        }

        if backoff.attempts() >= shared.config.max_restarts {
            tracing::error!(
                "Worker restart limit ({}) reached, routes will degrade",
                shared.config.max_restarts
            );
            shared.mark_unavailable("restart limit reached".to_string());
            notify(&mut init, Err(BoundaryError::Unavailable));
            return;
        }

        let delay = backoff.fail();
        shared.record_restart();
        tracing::info!("Restarting worker in {:?} (attempt {})", delay, backoff.attempts());
        tokio::select! {
            _ = shutdown.recv() => {
                shared.mark_unavailable("shut down while restarting".to_string());
                notify(&mut init, Err(BoundaryError::ShuttingDown));
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Deliver replies to their waiting callers until the worker goes away or
/// shutdown is requested.
async fn pump(
    shared: &Shared,
    replies: &mut mpsc::UnboundedReceiver<ReplyEnvelope>,
    shutdown: &mut broadcast::Receiver<()>,
) -> PumpEnd {
    loop {
        tokio::select! {
            _ = shutdown.recv() => return PumpEnd::Shutdown,
            reply = replies.recv() => match reply {
                Some(envelope) => deliver(shared, envelope),
                None => return PumpEnd::WorkerExited,
            },
        }
    }
}

/// Forward replies until the worker closes its side of the channel.
async fn drain(shared: &Shared, replies: &mut mpsc::UnboundedReceiver<ReplyEnvelope>) -> usize {
    let mut delivered = 0;
    while let Some(envelope) = replies.recv().await {
        deliver(shared, envelope);
        delivered += 1;
    }
    delivered
}

fn deliver(shared: &Shared, ReplyEnvelope { id, reply }: ReplyEnvelope) {
    match shared.pending.remove(&id) {
        Some((_, waiter)) => {
            if waiter.send(reply).is_err() {
                tracing::debug!("Caller for #{} went away", id);
            }
        }
        None => tracing::debug!("Dropping late reply #{}", id),
    }
}

async fn join(thread: std::thread::JoinHandle<()>) {
    match tokio::task::spawn_blocking(move || thread.join()).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => tracing::error!("Worker thread panicked"),
        Err(err) => tracing::error!("Failed to join worker thread: {}", err),
    }
}

fn notify(
    init: &mut Option<oneshot::Sender<Result<(), BoundaryError>>>,
    outcome: Result<(), BoundaryError>,
) {
    if let Some(tx) = init.take() {
        let _ = tx.send(outcome);
    }
}
