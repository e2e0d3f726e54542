//! Background write-through of progress snapshots.
//!
//! The engine never awaits the store. It pushes requests into an unbounded
//! channel and a spawned task drains them in order.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::tutorial::Track;

use super::{ProgressPatch, ProgressStore};

/// A single queued write.
#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub user_id: String,
    pub track: Track,
    pub patch: ProgressPatch,
}

enum WriteCommand {
    Save(SaveRequest),
    Flush(oneshot::Sender<()>),
}

/// Cloneable handle for queuing writes.
#[derive(Clone)]
pub struct ProgressWriter {
    tx: mpsc::UnboundedSender<WriteCommand>,
}

impl ProgressWriter {
    /// Queue a write. Returns false if the writer task is gone.
    pub fn submit(&self, request: SaveRequest) -> bool {
        if self.tx.send(WriteCommand::Save(request)).is_err() {
            warn!("Progress writer stopped; dropping save");
            return false;
        }
        true
    }

    /// Wait until every write queued before this call has been attempted.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(WriteCommand::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

/// Spawn the writer task. It exits once every [`ProgressWriter`] is dropped.
pub fn spawn_progress_writer(store: Arc<dyn ProgressStore>) -> (ProgressWriter, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<WriteCommand>();

    let handle = tokio::spawn(async move {
        info!("Progress writer started");
        while let Some(command) = rx.recv().await {
            match command {
                WriteCommand::Save(request) => {
                    match store
                        .save_progress(&request.user_id, request.track, &request.patch)
                        .await
                    {
                        Ok(()) => debug!(
                            user_id = %request.user_id,
                            track = %request.track,
                            "Progress written"
                        ),
                        // Retried implicitly: the next save carries a full snapshot.
                        Err(e) => warn!(
                            user_id = %request.user_id,
                            track = %request.track,
                            error = %e,
                            "Failed to save progress"
                        ),
                    }
                }
                WriteCommand::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        info!("Progress writer shutting down");
    });

    (ProgressWriter { tx }, handle)
}
