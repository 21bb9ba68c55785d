//! Settings Models
//!
//! Application configuration stored in `~/.incito/config.json`.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use incito_llm::sidecar::{HealthPolling, DEFAULT_SIDECAR_URL};
use incito_prompt::HistoryConfig;

/// Sidecar process and connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SidecarSettings {
    /// Base URL of the sidecar HTTP API
    pub base_url: String,
    /// Path to the `claude-code-server` binary
    pub binary_path: String,
    /// Custom Claude Code executable; `None` lets the sidecar resolve it
    pub claude_executable_path: Option<String>,
    pub health_poll_attempts: u32,
    pub health_poll_interval_ms: u64,
    pub health_timeout_ms: u64,
}

impl Default for SidecarSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SIDECAR_URL.to_string(),
            binary_path: "claude-code-server".to_string(),
            claude_executable_path: None,
            health_poll_attempts: 20,
            health_poll_interval_ms: 500,
            health_timeout_ms: 2000,
        }
    }
}

/// Form history settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    pub max_history_size: usize,
    pub debounce_ms: u64,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            max_history_size: 50,
            debounce_ms: 500,
        }
    }
}

/// One provider column of a comparison run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub id: String,
    #[serde(default)]
    pub model: Option<String>,
}

/// Application configuration stored in config.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sidecar: SidecarSettings,
    pub history: HistorySettings,
    /// Model used by run mode; `None` uses the sidecar default
    pub default_model: Option<String>,
    /// Providers used for comparison runs
    pub providers: Vec<ProviderSettings>,
    /// Base URL of the LLM-judge endpoint; defaults to the sidecar
    pub judge_base_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sidecar: SidecarSettings::default(),
            history: HistorySettings::default(),
            default_model: None,
            providers: vec![ProviderSettings {
                id: "claude".to_string(),
                model: None,
            }],
            judge_base_url: None,
        }
    }
}

/// Settings update request (partial update).
///
/// For optional settings an empty string clears the value.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SettingsUpdate {
    pub sidecar_base_url: Option<String>,
    pub sidecar_binary_path: Option<String>,
    pub claude_executable_path: Option<String>,
    pub default_model: Option<String>,
    pub judge_base_url: Option<String>,
    pub max_history_size: Option<usize>,
    pub debounce_ms: Option<u64>,
    pub providers: Option<Vec<ProviderSettings>>,
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl AppConfig {
    /// Apply a partial update to the configuration
    pub fn apply_update(&mut self, update: SettingsUpdate) {
        if let Some(url) = update.sidecar_base_url {
            self.sidecar.base_url = url;
        }
        if let Some(path) = update.sidecar_binary_path {
            self.sidecar.binary_path = path;
        }
        if let Some(path) = update.claude_executable_path {
            self.sidecar.claude_executable_path = non_empty(path);
        }
        if let Some(model) = update.default_model {
            self.default_model = non_empty(model);
        }
        if let Some(url) = update.judge_base_url {
            self.judge_base_url = non_empty(url);
        }
        if let Some(size) = update.max_history_size {
            self.history.max_history_size = size;
        }
        if let Some(ms) = update.debounce_ms {
            self.history.debounce_ms = ms;
        }
        if let Some(providers) = update.providers {
            self.providers = providers;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        let url = &self.sidecar.base_url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(format!("Invalid sidecar base_url: {}", url));
        }
        if let Some(judge) = &self.judge_base_url {
            if !(judge.starts_with("http://") || judge.starts_with("https://")) {
                return Err(format!("Invalid judge_base_url: {}", judge));
            }
        }

        if self.sidecar.binary_path.trim().is_empty() {
            return Err("sidecar binary_path must not be empty".to_string());
        }
        if self.sidecar.health_poll_attempts == 0 {
            return Err("health_poll_attempts must be at least 1".to_string());
        }
        if self.sidecar.health_poll_interval_ms < 10 {
            return Err("health_poll_interval_ms must be at least 10".to_string());
        }

        if self.history.max_history_size == 0 || self.history.max_history_size > 1000 {
            return Err("max_history_size must be between 1 and 1000".to_string());
        }

        let mut seen = HashSet::new();
        for provider in &self.providers {
            if provider.id.trim().is_empty() {
                return Err("provider id must not be empty".to_string());
            }
            if !seen.insert(provider.id.as_str()) {
                return Err(format!("Duplicate provider id: {}", provider.id));
            }
        }

        Ok(())
    }

    pub fn history_config(&self) -> HistoryConfig {
        HistoryConfig {
            max_history_size: self.history.max_history_size,
            debounce: Duration::from_millis(self.history.debounce_ms),
        }
    }

    pub fn health_polling(&self) -> HealthPolling {
        HealthPolling {
            attempts: self.sidecar.health_poll_attempts,
            interval: Duration::from_millis(self.sidecar.health_poll_interval_ms),
        }
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.sidecar.health_timeout_ms)
    }

    pub fn judge_url(&self) -> &str {
        self.judge_base_url
            .as_deref()
            .unwrap_or(&self.sidecar.base_url)
    }
}
