pub mod html;
pub mod math;
pub mod prompt;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::errors::{WorkerError, WorkerResult};
use crate::models::WorksheetRequest;
use crate::services::{CompletionProvider, PdfRenderer};

pub const SYSTEM_PROMPT_FILE: &str = "description.txt";
pub const START_TEMPLATE_FILE: &str = "start.html";

/// Runs one worksheet from request to PDF:
/// prompt, completion, parse, math images, HTML, PDF.
pub struct WorksheetGenerator {
    provider: Arc<dyn CompletionProvider>,
    renderer: Arc<dyn PdfRenderer>,
    system_prompt: String,
    start_template: String,
    pdf_dir: PathBuf,
    math_font_size: f64,
}

impl WorksheetGenerator {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        renderer: Arc<dyn PdfRenderer>,
        system_prompt: String,
        start_template: String,
        pdf_dir: PathBuf,
        math_font_size: f64,
    ) -> Self {
        Self {
            provider,
            renderer,
            system_prompt,
            start_template,
            pdf_dir,
            math_font_size,
        }
    }

    /// Reads the system prompt and start template from the worksheet
    /// templates directory.
    pub fn from_config(
        config: &Config,
        provider: Arc<dyn CompletionProvider>,
        renderer: Arc<dyn PdfRenderer>,
    ) -> WorkerResult<Self> {
        let dir = &config.storage.worksheet_templates_dir;
        let system_prompt = read_template(dir, SYSTEM_PROMPT_FILE)?;
        let start_template = read_template(dir, START_TEMPLATE_FILE)?;
        Ok(Self::new(
            provider,
            renderer,
            system_prompt,
            start_template,
            config.storage.pdf_dir.clone(),
            config.storage.math_font_size,
        ))
    }

    pub fn pdf_path(&self, worksheet_id: i64) -> PathBuf {
        self.pdf_dir.join(format!("worksheet_{}.pdf", worksheet_id))
    }

    pub async fn generate(
        &self,
        request: &WorksheetRequest,
        worksheet_id: i64,
    ) -> WorkerResult<PathBuf> {
        tracing::info!(
            "Generating worksheet {}: {} problems on '{}' ({})",
            worksheet_id,
            request.num_problems,
            request.subject,
            request.difficulty
        );

        let user_prompt = prompt::build_user_prompt(request);
        let raw = self.provider.complete(&self.system_prompt, &user_prompt).await?;
        tracing::debug!("Model response for worksheet {}: {}", worksheet_id, raw);

        let set = prompt::parse_problem_set(&raw).map_err(|e| {
            tracing::error!("Model output for worksheet {} is not valid JSON: {}", worksheet_id, e);
            e
        })?;
        tracing::debug!("Parsed {} problems", set.problems.len());

        let scratch = tempfile::Builder::new().prefix("worksheet-").tempdir()?;
        let tag = uuid::Uuid::new_v4().simple().to_string()[..16].to_string();

        let result = async {
            let html = html::assemble(
                &set,
                request,
                scratch.path(),
                &tag,
                &self.start_template,
                self.math_font_size,
            )?;
            let html_path = scratch.path().join("worksheet.html");
            tokio::fs::write(&html_path, html).await?;

            tokio::fs::create_dir_all(&self.pdf_dir).await?;
            let pdf_path = self.pdf_path(worksheet_id);
            self.renderer.render(&html_path, &pdf_path).await?;
            Ok::<_, WorkerError>(pdf_path)
        }
        .await;

        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            tracing::warn!("Failed to remove scratch dir {}: {}", scratch_path.display(), e);
        }

        let pdf_path = result?;
        tracing::info!("Worksheet {} written to {}", worksheet_id, pdf_path.display());
        Ok(pdf_path)
    }
}

fn read_template(dir: &Path, name: &str) -> WorkerResult<String> {
    let path = dir.join(name);
    std::fs::read_to_string(&path)
        .map_err(|e| WorkerError::Template(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Returns a canned reply and records the prompts it was given.
    pub(crate) struct CannedProvider {
        pub reply: String,
        pub prompts: Mutex<Vec<(String, String)>>,
    }

    impl CannedProvider {
        pub(crate) fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionProvider for CannedProvider {
        async fn complete(&self, system: &str, user: &str) -> WorkerResult<String> {
            self.prompts
                .lock()
                .unwrap()
                .push((system.to_string(), user.to_string()));
            Ok(self.reply.clone())
        }
    }

    /// Copies the HTML into the PDF path and remembers the scratch dir it saw.
    #[derive(Default)]
    pub(crate) struct CopyRenderer {
        pub seen: Mutex<Option<(PathBuf, Vec<String>)>>,
    }

    #[async_trait]
    impl PdfRenderer for CopyRenderer {
        async fn render(&self, html_path: &Path, pdf_path: &Path) -> WorkerResult<()> {
            let dir = html_path.parent().unwrap().to_path_buf();
            let mut files: Vec<String> = std::fs::read_dir(&dir)?
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect();
            files.sort();
            *self.seen.lock().unwrap() = Some((dir, files));
            std::fs::copy(html_path, pdf_path)?;
            Ok(())
        }
    }

    struct FailingRenderer;

    #[async_trait]
    impl PdfRenderer for FailingRenderer {
        async fn render(&self, _html_path: &Path, _pdf_path: &Path) -> WorkerResult<()> {
            Err(WorkerError::Pdf("no browser".into()))
        }
    }

    const REPLY: &str = r#"{"problems": [
        {"problem": "Solve $x + 1 = 3$.", "answer": "$x = 2$"},
        {"problem": "What is 5 * 5?", "answer": "25"}
    ]}"#;

    fn request() -> WorksheetRequest {
        WorksheetRequest {
            subject: "Algebra".into(),
            difficulty: "easy".into(),
            num_problems: 2,
            additional_info: "no fractions".into(),
        }
    }

    fn generator(
        provider: Arc<dyn CompletionProvider>,
        renderer: Arc<dyn PdfRenderer>,
        pdf_dir: PathBuf,
    ) -> WorksheetGenerator {
        WorksheetGenerator::new(
            provider,
            renderer,
            "You write worksheets.".into(),
            "<html><body><h1>{{subject}}</h1>".into(),
            pdf_dir,
            16.0,
        )
    }

    #[tokio::test]
    async fn generates_pdf_and_removes_scratch_dir() {
        let out = tempfile::tempdir().unwrap();
        let provider = Arc::new(CannedProvider::new(REPLY));
        let renderer = Arc::new(CopyRenderer::default());
        let generator = generator(provider.clone(), renderer.clone(), out.path().join("pdfs"));

        let path = generator.generate(&request(), 42).await.unwrap();
        assert_eq!(path, out.path().join("pdfs").join("worksheet_42.pdf"));

        let document = std::fs::read_to_string(&path).unwrap();
        assert!(document.contains("<h1>Algebra</h1>"));
        assert!(document.contains("What is 5 * 5?"));

        let (scratch, files) = renderer.seen.lock().unwrap().clone().unwrap();
        assert!(files.contains(&"worksheet.html".to_string()));
        assert_eq!(files.iter().filter(|f| f.ends_with(".svg")).count(), 2);
        assert!(!scratch.exists());

        let prompts = provider.prompts.lock().unwrap();
        assert_eq!(prompts[0].0, "You write worksheets.");
        assert!(prompts[0].1.contains("no fractions"));
    }

    #[tokio::test]
    async fn malformed_reply_fails_without_output() {
        let out = tempfile::tempdir().unwrap();
        let generator = generator(
            Arc::new(CannedProvider::new("not json at all")),
            Arc::new(CopyRenderer::default()),
            out.path().to_path_buf(),
        );

        let err = generator.generate(&request(), 1).await.unwrap_err();
        assert!(matches!(err, WorkerError::MalformedOutput(_)));
        assert!(!generator.pdf_path(1).exists());
    }

    #[tokio::test]
    async fn render_failure_is_reported() {
        let out = tempfile::tempdir().unwrap();
        let generator = generator(
            Arc::new(CannedProvider::new(REPLY)),
            Arc::new(FailingRenderer),
            out.path().to_path_buf(),
        );

        let err = generator.generate(&request(), 7).await.unwrap_err();
        assert!(matches!(err, WorkerError::Pdf(_)));
    }

    #[test]
    fn from_config_reads_bundled_templates() {
        let mut config = crate::config::tests::default_config();
        config.storage.worksheet_templates_dir =
            PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/worksheet_templates"));
        let generator = WorksheetGenerator::from_config(
            &config,
            Arc::new(CannedProvider::new(REPLY)),
            Arc::new(CopyRenderer::default()),
        )
        .unwrap();
        assert!(generator.start_template.contains("{{subject}}"));
        assert!(generator.system_prompt.contains("problems"));
    }
}
