use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Job timed out after {0} seconds")]
    Timeout(u64),

    #[error("Job panicked: {0}")]
    TaskPanic(String),

    #[error("Completion request failed: {0}")]
    Completion(String),

    #[error("Model returned malformed worksheet JSON: {0}")]
    MalformedOutput(#[from] serde_json::Error),

    #[error("Math rendering failed: {0}")]
    Render(String),

    #[error("PDF rendering failed: {0}")]
    Pdf(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Job queue is closed")]
    QueueClosed,
}

impl From<reqwest::Error> for WorkerError {
    fn from(e: reqwest::Error) -> Self {
        WorkerError::Completion(e.to_string())
    }
}

pub type WorkerResult<T> = Result<T, WorkerError>;
