use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub planner: PlannerConfig,
    pub http: HttpConfig,
    pub services: ServicesConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PlannerConfig {
    /// `ollama` asks an LLM which fetch tools to run, `static` runs them all.
    pub provider: String,
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3.1".to_string(),
            temperature: 0.2,
            top_p: 0.9,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Base URLs of the remote APIs. Overridable so tests can point at a mock server.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServicesConfig {
    pub gmail_api: String,
    pub calendar_api: String,
    pub slack_api: String,
    pub github_api: String,
    pub notion_api: String,
    pub notion_version: String,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            gmail_api: "https://gmail.googleapis.com/gmail/v1".to_string(),
            calendar_api: "https://www.googleapis.com/calendar/v3".to_string(),
            slack_api: "https://slack.com/api".to_string(),
            github_api: "https://api.github.com".to_string(),
            notion_api: "https://api.notion.com/v1".to_string(),
            notion_version: "2022-06-28".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context("Failed to read config file")?;

        let mut config: Config = toml::from_str(&content)
            .context("Failed to parse config file")?;

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            return Self::from_file(path);
        }

        let mut config = Config::default();
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        // Hosting platforms inject the listening port
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
    }
}

/// Credential material, read only from the environment.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub slack_bot_token: Option<String>,
    pub github_token: Option<String>,
    pub notion_api_key: Option<String>,
    pub notion_database_id: Option<String>,
    pub google_token_json: Option<String>,
    pub google_credentials_json: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        Self {
            slack_bot_token: var("SLACK_BOT_TOKEN"),
            github_token: var("GITHUB_TOKEN"),
            notion_api_key: var("NOTION_API_KEY"),
            notion_database_id: var("NOTION_DATABASE_ID"),
            google_token_json: var("GOOGLE_TOKEN_JSON"),
            google_credentials_json: var("GOOGLE_CREDENTIALS_JSON"),
        }
    }
}
