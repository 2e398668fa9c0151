mod worker;

pub use worker::{process_job, spawn_workers, worker_process, WorkerContext};
