use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use crate::errors::{WorkerError, WorkerResult};

/// A request to generate the PDF for one worksheet row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationJob {
    pub worksheet_id: i64,
}

/// Receiving side, shared by every worker.
pub type JobReceiver = Arc<Mutex<mpsc::UnboundedReceiver<GenerationJob>>>;

#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<GenerationJob>,
}

impl JobQueue {
    pub fn channel() -> (Self, JobReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, Arc::new(Mutex::new(rx)))
    }

    pub fn enqueue(&self, job: GenerationJob) -> WorkerResult<()> {
        self.tx.send(job).map_err(|_| WorkerError::QueueClosed)?;
        tracing::debug!("Queued generation job for worksheet {}", job.worksheet_id);
        Ok(())
    }
}
