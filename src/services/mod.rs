pub mod auth;
mod database;
mod job_queue;
pub mod llm;
pub mod pdf;
mod templates;

pub use database::Database;
pub use job_queue::{GenerationJob, JobQueue, JobReceiver};
pub use llm::{CompletionProvider, OpenAiClient};
pub use pdf::{ChromiumRenderer, PdfRenderer};
pub use templates::{escape_html, fill, PageRenderer};
