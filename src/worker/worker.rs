use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::errors::{AppResult, WorkerError, WorkerResult};
use crate::generator::WorksheetGenerator;
use crate::models::WorksheetStatus;
use crate::services::{Database, GenerationJob, JobReceiver};

/// What a worker needs to run a job.
#[derive(Clone)]
pub struct WorkerContext {
    pub db: Database,
    pub generator: Arc<WorksheetGenerator>,
    pub job_timeout: Duration,
}

/// Starts `worker_count` workers sharing one receiver. At most
/// `semaphore.available_permits()` jobs run at the same time.
pub fn spawn_workers(
    ctx: WorkerContext,
    receiver: JobReceiver,
    worker_count: usize,
    semaphore: Arc<Semaphore>,
) -> Vec<JoinHandle<()>> {
    (0..worker_count)
        .map(|id| {
            let ctx = ctx.clone();
            let receiver = receiver.clone();
            let semaphore = semaphore.clone();
            tokio::spawn(async move {
                worker_process(id, ctx, receiver, semaphore).await;
            })
        })
        .collect()
}

pub async fn worker_process(
    id: usize,
    ctx: WorkerContext,
    receiver: JobReceiver,
    semaphore: Arc<Semaphore>,
) {
    tracing::info!("Worker {} started", id);

    loop {
        // Take a permit before taking a job so queued jobs stay queued
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                tracing::error!("Worker {} lost its semaphore: {}", id, e);
                break;
            }
        };

        let job = receiver.lock().await.recv().await;
        let Some(job) = job else {
            tracing::info!("Job queue closed, worker {} exiting", id);
            break;
        };

        tracing::debug!("Worker {} picked up worksheet {}", id, job.worksheet_id);
        if let Err(e) = process_job(&ctx, job).await {
            tracing::error!("Worksheet {} could not be processed: {}", job.worksheet_id, e);
        }
        drop(permit);
    }
}

/// Runs one job and records the outcome on the worksheet row. Generation
/// failures mark the worksheet `Failed`; only bookkeeping errors are returned.
pub async fn process_job(ctx: &WorkerContext, job: GenerationJob) -> AppResult<()> {
    let Some(worksheet) = ctx.db.get_worksheet(job.worksheet_id).await? else {
        tracing::warn!("Worksheet {} was deleted before generation", job.worksheet_id);
        return Ok(());
    };

    ctx.db
        .set_worksheet_status(worksheet.id, WorksheetStatus::Processing)
        .await?;

    match generate_with_timeout(ctx, worksheet.id, worksheet.request()).await {
        Ok(path) => {
            let path = path.to_string_lossy().into_owned();
            if ctx.db.complete_worksheet(worksheet.id, &path).await? {
                tracing::info!("Worksheet {} completed", worksheet.id);
            } else {
                // row removed while generating
                tracing::warn!("Worksheet {} vanished, removing {}", worksheet.id, path);
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    tracing::warn!("Failed to remove orphaned file {}: {}", path, e);
                }
            }
        }
        Err(e) => {
            tracing::error!("Worksheet {} failed: {}", worksheet.id, e);
            ctx.db
                .set_worksheet_status(worksheet.id, WorksheetStatus::Failed)
                .await?;
            let partial = ctx.generator.pdf_path(worksheet.id);
            match tokio::fs::remove_file(&partial).await {
                Ok(()) => tracing::debug!("Removed partial output {}", partial.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to remove {}: {}", partial.display(), e),
            }
        }
    }
    Ok(())
}

async fn generate_with_timeout(
    ctx: &WorkerContext,
    worksheet_id: i64,
    request: crate::models::WorksheetRequest,
) -> WorkerResult<PathBuf> {
    let generator = ctx.generator.clone();
    let secs = ctx.job_timeout.as_secs();

    // Spawned so a panic in the pipeline surfaces as a JoinError
    let mut handle =
        tokio::spawn(async move { generator.generate(&request, worksheet_id).await });
    let result = tokio::time::timeout(ctx.job_timeout, &mut handle).await;

    match result {
        Ok(Ok(generated)) => generated,
        Ok(Err(e)) => {
            tracing::error!("Generation task panicked: {}", e);
            Err(WorkerError::TaskPanic(e.to_string()))
        }
        Err(_) => {
            handle.abort();
            tracing::error!("Generation timed out after {} seconds", secs);
            Err(WorkerError::Timeout(secs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::tests::{CannedProvider, CopyRenderer};
    use crate::models::{Worksheet, WorksheetRequest};
    use crate::services::{CompletionProvider, JobQueue, PdfRenderer};
    use async_trait::async_trait;
    use std::path::Path;
    use tempfile::TempDir;

    const REPLY: &str = r#"{"problems": [{"problem": "What is $1+1$?", "answer": "2"}]}"#;

    struct SlowProvider;

    #[async_trait]
    impl CompletionProvider for SlowProvider {
        async fn complete(&self, _system: &str, _user: &str) -> WorkerResult<String> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(REPLY.into())
        }
    }

    /// Finishes shortly after a short job timeout and counts completions.
    struct LateProvider {
        finished: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl CompletionProvider for LateProvider {
        async fn complete(&self, _system: &str, _user: &str) -> WorkerResult<String> {
            tokio::time::sleep(Duration::from_millis(300)).await;
            self.finished
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(REPLY.into())
        }
    }

    struct PanickingProvider;

    #[async_trait]
    impl CompletionProvider for PanickingProvider {
        async fn complete(&self, _system: &str, _user: &str) -> WorkerResult<String> {
            panic!("provider blew up");
        }
    }

    /// Writes the PDF, then reports a failure.
    struct HalfRenderer;

    #[async_trait]
    impl PdfRenderer for HalfRenderer {
        async fn render(&self, _html_path: &Path, pdf_path: &Path) -> WorkerResult<()> {
            std::fs::write(pdf_path, b"%PDF-1.4 truncated")?;
            Err(WorkerError::Pdf("printer crashed".into()))
        }
    }

    async fn setup(
        provider: Arc<dyn CompletionProvider>,
        timeout: Duration,
    ) -> (TempDir, WorkerContext, Worksheet) {
        setup_with(provider, Arc::new(CopyRenderer::default()), timeout).await
    }

    async fn setup_with(
        provider: Arc<dyn CompletionProvider>,
        renderer: Arc<dyn PdfRenderer>,
        timeout: Duration,
    ) -> (TempDir, WorkerContext, Worksheet) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("test.sqlite").display());
        let db = Database::connect(&url).await.unwrap();
        let user = db.create_user("ada", None, "hash").await.unwrap();
        let worksheet = db
            .create_worksheet(
                user.id,
                &WorksheetRequest {
                    subject: "Arithmetic".into(),
                    difficulty: "easy".into(),
                    num_problems: 1,
                    additional_info: String::new(),
                },
            )
            .await
            .unwrap();

        let generator = WorksheetGenerator::new(
            provider,
            renderer,
            "system".into(),
            "<html><body>".into(),
            dir.path().join("pdfs"),
            16.0,
        );
        let ctx = WorkerContext {
            db,
            generator: Arc::new(generator),
            job_timeout: timeout,
        };
        (dir, ctx, worksheet)
    }

    #[tokio::test]
    async fn successful_job_completes_worksheet() {
        let (dir, ctx, worksheet) =
            setup(Arc::new(CannedProvider::new(REPLY)), Duration::from_secs(10)).await;

        process_job(&ctx, GenerationJob { worksheet_id: worksheet.id })
            .await
            .unwrap();

        let stored = ctx.db.get_worksheet(worksheet.id).await.unwrap().unwrap();
        assert_eq!(stored.status, WorksheetStatus::Completed);
        assert!(stored.completed_at.is_some());
        let path = PathBuf::from(stored.file_path.unwrap());
        assert_eq!(
            path,
            dir.path().join("pdfs").join(format!("worksheet_{}.pdf", worksheet.id))
        );
        assert!(path.exists());
    }

    #[tokio::test]
    async fn malformed_reply_marks_failed() {
        let (_dir, ctx, worksheet) =
            setup(Arc::new(CannedProvider::new("nope")), Duration::from_secs(10)).await;

        process_job(&ctx, GenerationJob { worksheet_id: worksheet.id })
            .await
            .unwrap();

        let stored = ctx.db.get_worksheet(worksheet.id).await.unwrap().unwrap();
        assert_eq!(stored.status, WorksheetStatus::Failed);
        assert!(stored.file_path.is_none());
    }

    #[tokio::test]
    async fn timeout_marks_failed() {
        let (_dir, ctx, worksheet) = setup(Arc::new(SlowProvider), Duration::from_millis(50)).await;

        process_job(&ctx, GenerationJob { worksheet_id: worksheet.id })
            .await
            .unwrap();

        let stored = ctx.db.get_worksheet(worksheet.id).await.unwrap().unwrap();
        assert_eq!(stored.status, WorksheetStatus::Failed);
    }

    #[tokio::test]
    async fn timed_out_generation_is_cancelled() {
        let provider = Arc::new(LateProvider {
            finished: std::sync::atomic::AtomicUsize::new(0),
        });
        let (_dir, ctx, worksheet) = setup(provider.clone(), Duration::from_millis(50)).await;

        process_job(&ctx, GenerationJob { worksheet_id: worksheet.id })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(800)).await;

        let stored = ctx.db.get_worksheet(worksheet.id).await.unwrap().unwrap();
        assert_eq!(stored.status, WorksheetStatus::Failed);
        assert!(stored.file_path.is_none());
        assert_eq!(provider.finished.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert!(!ctx.generator.pdf_path(worksheet.id).exists());
    }

    #[tokio::test]
    async fn failed_render_leaves_no_pdf() {
        let (_dir, ctx, worksheet) = setup_with(
            Arc::new(CannedProvider::new(REPLY)),
            Arc::new(HalfRenderer),
            Duration::from_secs(10),
        )
        .await;

        process_job(&ctx, GenerationJob { worksheet_id: worksheet.id })
            .await
            .unwrap();

        let stored = ctx.db.get_worksheet(worksheet.id).await.unwrap().unwrap();
        assert_eq!(stored.status, WorksheetStatus::Failed);
        assert!(!ctx.generator.pdf_path(worksheet.id).exists());
    }

    #[tokio::test]
    async fn panic_marks_failed() {
        let (_dir, ctx, worksheet) =
            setup(Arc::new(PanickingProvider), Duration::from_secs(10)).await;

        process_job(&ctx, GenerationJob { worksheet_id: worksheet.id })
            .await
            .unwrap();

        let stored = ctx.db.get_worksheet(worksheet.id).await.unwrap().unwrap();
        assert_eq!(stored.status, WorksheetStatus::Failed);
    }

    #[tokio::test]
    async fn deleted_worksheet_is_skipped() {
        let (_dir, ctx, worksheet) =
            setup(Arc::new(CannedProvider::new(REPLY)), Duration::from_secs(10)).await;
        ctx.db.delete_worksheet(worksheet.id).await.unwrap();

        process_job(&ctx, GenerationJob { worksheet_id: worksheet.id })
            .await
            .unwrap();
        assert!(ctx.db.get_worksheet(worksheet.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn workers_drain_queue_and_exit_when_closed() {
        let (_dir, ctx, worksheet) =
            setup(Arc::new(CannedProvider::new(REPLY)), Duration::from_secs(10)).await;
        let (queue, receiver) = JobQueue::channel();
        let handles = spawn_workers(ctx.clone(), receiver, 2, Arc::new(Semaphore::new(1)));

        queue
            .enqueue(GenerationJob { worksheet_id: worksheet.id })
            .unwrap();
        drop(queue);

        for handle in handles {
            tokio::time::timeout(Duration::from_secs(10), handle)
                .await
                .unwrap()
                .unwrap();
        }
        let stored = ctx.db.get_worksheet(worksheet.id).await.unwrap().unwrap();
        assert_eq!(stored.status, WorksheetStatus::Completed);
    }
}
