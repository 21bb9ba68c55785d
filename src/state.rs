//! Application State
//!
//! Long-lived services shared by the CLI and any embedding host.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};

use incito_graders::HttpJudgeClient;
use incito_llm::sidecar::{ProcessLauncher, SidecarClient, SidecarManager, SidecarProvider};
use incito_llm::LlmProvider;

use crate::models::response::HealthResponse;
use crate::models::settings::{AppConfig, SettingsUpdate};
use crate::services::comparison::ComparisonRunner;
use crate::services::run_mode::{RunModeController, RunModeEvent};
use crate::services::runs::RunService;
use crate::storage::{ConfigService, Database};
use crate::utils::error::{AppError, AppResult};

/// Application state
pub struct AppState {
    /// SQLite database with connection pool
    database: Arc<RwLock<Option<Database>>>,
    /// Configuration service for app settings
    config: Arc<RwLock<Option<ConfigService>>>,
    /// Sidecar lifecycle; rebuilt when its settings change
    sidecar: Arc<RwLock<Option<Arc<SidecarManager>>>>,
    /// Whether the state has been initialized
    initialized: Arc<RwLock<bool>>,
}

impl AppState {
    /// Create a new uninitialized app state
    pub fn new() -> Self {
        Self {
            database: Arc::new(RwLock::new(None)),
            config: Arc::new(RwLock::new(None)),
            sidecar: Arc::new(RwLock::new(None)),
            initialized: Arc::new(RwLock::new(false)),
        }
    }

    /// Initialize all services from `~/.incito`
    pub async fn initialize(&self) -> AppResult<()> {
        self.initialize_with(ConfigService::new, Database::new).await
    }

    /// Initialize with an explicit config file and database
    pub async fn initialize_at(&self, config_path: PathBuf, database: Database) -> AppResult<()> {
        self.initialize_with(move || ConfigService::open(config_path), move || Ok(database))
            .await
    }

    async fn initialize_with<C, D>(&self, config: C, database: D) -> AppResult<()>
    where
        C: FnOnce() -> AppResult<ConfigService>,
        D: FnOnce() -> AppResult<Database>,
    {
        let mut initialized = self.initialized.write().await;
        if *initialized {
            return Ok(());
        }

        // Initialize database
        {
            let db = database()?;
            db.seed_builtin_graders()?;
            *self.database.write().await = Some(db);
        }

        // Initialize config
        let app_config = {
            let config = config()?;
            let app_config = config.get_config_clone();
            *self.config.write().await = Some(config);
            app_config
        };

        *self.sidecar.write().await = Some(Arc::new(build_sidecar_manager(&app_config)?));

        *initialized = true;
        info!("[State] initialized");
        Ok(())
    }

    /// Check if database is healthy
    pub fn is_database_healthy(&self) -> bool {
        // Use try_read to avoid blocking
        if let Ok(guard) = self.database.try_read() {
            if let Some(ref db) = *guard {
                return db.is_healthy();
            }
        }
        false
    }

    /// Check if config is healthy
    pub fn is_config_healthy(&self) -> bool {
        if let Ok(guard) = self.config.try_read() {
            if let Some(ref config) = *guard {
                return config.is_healthy();
            }
        }
        false
    }

    /// Get the current configuration
    pub async fn get_config(&self) -> AppResult<AppConfig> {
        let guard = self.config.read().await;
        match &*guard {
            Some(config) => Ok(config.get_config_clone()),
            None => Err(AppError::config("Config service not initialized")),
        }
    }

    /// Update the configuration; sidecar settings take effect immediately
    pub async fn update_config(&self, update: SettingsUpdate) -> AppResult<AppConfig> {
        let touches_sidecar = update.sidecar_base_url.is_some()
            || update.sidecar_binary_path.is_some();

        let updated = {
            let mut guard = self.config.write().await;
            match &mut *guard {
                Some(config) => config.update_config(update)?,
                None => return Err(AppError::config("Config service not initialized")),
            }
        };

        if touches_sidecar {
            let manager = Arc::new(build_sidecar_manager(&updated)?);
            let previous = self.sidecar.write().await.replace(manager);
            if let Some(previous) = previous {
                if let Err(e) = previous.stop().await {
                    warn!("[State] could not stop previous sidecar: {}", e);
                }
            }
        }
        Ok(updated)
    }

    /// Get database access for direct queries
    pub async fn with_database<F, T>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&Database) -> AppResult<T>,
    {
        let guard = self.database.read().await;
        match &*guard {
            Some(db) => f(db),
            None => Err(AppError::database("Database not initialized")),
        }
    }

    pub async fn sidecar_manager(&self) -> AppResult<Arc<SidecarManager>> {
        self.sidecar
            .read()
            .await
            .clone()
            .ok_or_else(|| AppError::config("Sidecar not initialized"))
    }

    /// Start the sidecar if needed, honoring the configured Claude executable
    pub async fn ensure_sidecar(&self) -> AppResult<bool> {
        let config = self.get_config().await?;
        let manager = self.sidecar_manager().await?;
        Ok(manager
            .ensure_server_running(config.sidecar.claude_executable_path.as_deref())
            .await?)
    }

    /// One provider per configured comparison column
    pub async fn providers(&self) -> AppResult<Vec<Arc<dyn LlmProvider>>> {
        let config = self.get_config().await?;
        let client = self.sidecar_manager().await?.client().clone();
        Ok(config
            .providers
            .iter()
            .map(|settings| {
                let mut provider = SidecarProvider::new(&settings.id, client.clone());
                if let Some(model) = settings.model.as_ref().or(config.default_model.as_ref()) {
                    provider = provider.with_model(model);
                }
                Arc::new(provider) as Arc<dyn LlmProvider>
            })
            .collect())
    }

    pub async fn run_service(&self) -> AppResult<RunService> {
        let config = self.get_config().await?;
        let db = self.with_database(|db| Ok(db.clone())).await?;
        let judge = HttpJudgeClient::new(config.judge_url())?;
        let comparison = ComparisonRunner::new(self.providers().await?);
        Ok(RunService::new(db, comparison, Arc::new(judge)))
    }

    /// A run-mode controller on the default model
    pub async fn run_mode_controller(
        &self,
        events: Option<mpsc::UnboundedSender<RunModeEvent>>,
    ) -> AppResult<RunModeController> {
        let config = self.get_config().await?;
        let client = self.sidecar_manager().await?.client().clone();
        let mut provider = SidecarProvider::new("run-mode", client);
        if let Some(model) = &config.default_model {
            provider = provider.with_model(model);
        }

        let controller = RunModeController::new(Arc::new(provider));
        Ok(match events {
            Some(tx) => controller.with_events(tx),
            None => controller,
        })
    }

    /// Health of every service, plus sidecar authentication when reachable
    pub async fn health(&self) -> HealthResponse {
        let mut health = HealthResponse {
            database: self.is_database_healthy(),
            config: self.is_config_healthy(),
            ..Default::default()
        };

        if let Ok(manager) = self.sidecar_manager().await {
            let client = manager.client();
            health.sidecar = client.health().await;
            if health.sidecar {
                health.authenticated = client.auth_status().await.ok().map(|s| s.authenticated);
            }
        }

        if !health.is_healthy() {
            health.status = "degraded".to_string();
        }
        health
    }
}

fn build_sidecar_manager(config: &AppConfig) -> AppResult<SidecarManager> {
    let client =
        SidecarClient::new(&config.sidecar.base_url)?.with_health_timeout(config.health_timeout());
    let launcher = ProcessLauncher::new(&config.sidecar.binary_path);
    Ok(SidecarManager::new(Arc::new(client), Arc::new(launcher))
        .with_polling(config.health_polling()))
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("initialized", &self.initialized)
            .finish()
    }
}
