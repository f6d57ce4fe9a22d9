use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{alog_debug, Error, Result};

pub const DEFAULT_API_VERSION: &str = "2024-12-01-preview";
pub const DEFAULT_AGENT_DEPLOYMENT: &str = "gpt-4o";
pub const DEFAULT_REVIEW_DEPLOYMENT: &str = "gpt-5-model";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub azure: AzureConfig,
    #[serde(default)]
    pub models: ModelConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AzureConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            api_version: default_api_version(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub agent_deployment: String,
    /// Deployment used for the final quality review.
    pub review_deployment: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            agent_deployment: DEFAULT_AGENT_DEPLOYMENT.to_string(),
            review_deployment: DEFAULT_REVIEW_DEPLOYMENT.to_string(),
            max_tokens: 1500,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkflowConfig {
    pub call_timeout_secs: u64,
    pub max_concurrent: usize,
    /// Whether failed tasks still raise the confidence score.
    pub count_failed_tasks: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: 120,
            max_concurrent: 4,
            count_failed_tasks: false,
        }
    }
}

impl WorkflowConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub ttl_secs: u64,
    pub max_sessions: usize,
    pub max_context_chars: usize,
    /// Persist sessions to ~/.archai/sessions.json between runs.
    pub persist: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            max_sessions: 256,
            max_context_chars: 16_000,
            persist: false,
        }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

impl Config {
    pub fn archai_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".archai"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::archai_dir()?.join("archai.toml"))
    }

    pub fn sessions_path() -> Result<PathBuf> {
        Ok(Self::archai_dir()?.join("sessions.json"))
    }

    /// Load from the default path and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        alog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            alog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        alog_debug!(
            "Config loaded: endpoint={:?}, agent_deployment={}, review_deployment={}",
            config.azure.endpoint,
            config.models.agent_deployment,
            config.models.review_deployment
        );
        Ok(config)
    }

    /// Overlay values from the environment. Empty variables are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("AZURE_OPENAI_ENDPOINT") {
            self.azure.endpoint = Some(v);
        }
        if let Some(v) = get("AZURE_OPENAI_API_KEY") {
            self.azure.api_key = Some(v);
        }
        if let Some(v) = get("AZURE_OPENAI_API_VERSION") {
            self.azure.api_version = v;
        }
        if let Some(v) = get("ARCHAI_AGENT_DEPLOYMENT") {
            self.models.agent_deployment = v;
        }
        if let Some(v) = get("ARCHAI_REVIEW_DEPLOYMENT") {
            self.models.review_deployment = v;
        }
    }

    /// Presence check for everything a remote call needs.
    pub fn validate_remote(&self) -> Result<()> {
        let present = |v: &Option<String>| v.as_deref().map_or(false, |s| !s.trim().is_empty());
        if !present(&self.azure.endpoint) {
            return Err(Error::MissingConfig("AZURE_OPENAI_ENDPOINT".to_string()));
        }
        if !present(&self.azure.api_key) {
            return Err(Error::MissingConfig("AZURE_OPENAI_API_KEY".to_string()));
        }
        if self.workflow.max_concurrent == 0 {
            return Err(Error::Validation(
                "workflow.max_concurrent must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Copy of the config that is safe to print.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.azure.api_key.is_some() {
            copy.azure.api_key = Some("********".to_string());
        }
        copy
    }

    pub fn save(&self) -> Result<()> {
        let dir = Self::archai_dir()?;
        if !dir.exists() {
            alog_debug!("Creating archai directory: {}", dir.display());
            fs::create_dir_all(&dir)?;
        }
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        fs::write(path, toml::to_string_pretty(self)?)?;
        alog_debug!("Config saved to {}", path.display());
        Ok(())
    }
}
