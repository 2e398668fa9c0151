use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use url::Url;

use crate::errors::{WorkerError, WorkerResult};

/// Turns an HTML file on disk into a PDF file.
#[async_trait]
pub trait PdfRenderer: Send + Sync {
    async fn render(&self, html_path: &Path, pdf_path: &Path) -> WorkerResult<()>;
}

/// Renders through a headless Chromium launched per job.
pub struct ChromiumRenderer {
    executable: Option<PathBuf>,
}

impl ChromiumRenderer {
    pub fn new(executable: Option<PathBuf>) -> Self {
        Self { executable }
    }

    fn browser_config(&self) -> WorkerResult<BrowserConfig> {
        let mut builder = BrowserConfig::builder().new_headless_mode().args(vec![
            "--disable-gpu",
            "--no-sandbox",
            "--disable-dev-shm-usage",
            "--allow-file-access-from-files",
        ]);
        if let Some(exe) = &self.executable {
            builder = builder.chrome_executable(exe);
        }
        builder.build().map_err(WorkerError::Pdf)
    }
}

fn cdp_err(context: &str) -> impl Fn(chromiumoxide::error::CdpError) -> WorkerError + '_ {
    move |e| WorkerError::Pdf(format!("{}: {}", context, e))
}

#[async_trait]
impl PdfRenderer for ChromiumRenderer {
    async fn render(&self, html_path: &Path, pdf_path: &Path) -> WorkerResult<()> {
        let html_path = std::fs::canonicalize(html_path)?;
        let url = Url::from_file_path(&html_path).map_err(|_| {
            WorkerError::Pdf(format!("not an absolute path: {}", html_path.display()))
        })?;

        debug!("Launching headless browser for {}", url);
        let (mut browser, mut handler) = Browser::launch(self.browser_config()?)
            .await
            .map_err(cdp_err("failed to launch browser"))?;

        let events = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        let printed = async {
            let page = browser
                .new_page(url.as_str())
                .await
                .map_err(cdp_err("failed to open page"))?;
            page.wait_for_navigation()
                .await
                .map_err(cdp_err("page did not finish loading"))?;
            let params = PrintToPdfParams {
                print_background: Some(true),
                prefer_css_page_size: Some(true),
                ..Default::default()
            };
            page.pdf(params).await.map_err(cdp_err("print to PDF failed"))
        }
        .await;

        if let Err(e) = browser.close().await {
            warn!("Failed to close browser cleanly: {}", e);
        }
        let _ = browser.wait().await;
        events.abort();

        let bytes = printed?;
        if let Some(parent) = pdf_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(pdf_path, &bytes).await?;

        info!("Wrote PDF {} ({} bytes)", pdf_path.display(), bytes.len());
        Ok(())
    }
}
