use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub llm: LlmConfig,
    pub worker: WorkerConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub secret_key: String,
    pub algorithm: String,
    pub access_token_expire_minutes: i64,
    pub bcrypt_cost: u32,
    pub secure_cookie: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_retries: usize,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    pub worker_count: usize,
    pub max_concurrent_tasks: usize,
    pub job_timeout_secs: u64,
    pub max_problems: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub templates_dir: PathBuf,
    pub worksheet_templates_dir: PathBuf,
    pub static_dir: PathBuf,
    pub pdf_dir: PathBuf,
    pub chromium_executable: Option<PathBuf>,
    pub math_font_size: f64,
}

impl Config {
    /// Loads `config/default.toml`, then applies `APP_*` environment
    /// overrides, e.g. `APP_LLM__API_KEY`.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.auth.secret_key.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "auth.secret_key must be set (APP_AUTH__SECRET_KEY)".into(),
            ));
        }
        if self.worker.worker_count == 0 || self.worker.max_concurrent_tasks == 0 {
            return Err(config::ConfigError::Message(
                "worker.worker_count and worker.max_concurrent_tasks must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
