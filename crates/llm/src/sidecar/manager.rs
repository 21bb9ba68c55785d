//! Sidecar Lifecycle Manager
//!
//! Owns the one sidecar process of the app and remembers which Claude
//! executable it was started with, so a path change forces a restart.
//! `ensure_server_running` is single-flight: concurrent callers queue on the
//! origin lock and observe the first caller's result.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{info, warn};

use super::client::SidecarClient;
use super::process::SidecarLauncher;
use crate::types::LlmResult;

/// How the currently reachable server came to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerOrigin {
    /// Nothing started by us (fresh manager, after `stop`, or an external server)
    Unknown,
    /// Started by this manager with the given executable path
    Started { executable_path: Option<String> },
}

/// Health polling after a start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthPolling {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for HealthPolling {
    fn default() -> Self {
        Self {
            attempts: 20,
            interval: Duration::from_millis(500),
        }
    }
}

pub struct SidecarManager {
    client: Arc<SidecarClient>,
    launcher: Arc<dyn SidecarLauncher>,
    origin: Mutex<ServerOrigin>,
    polling: HealthPolling,
}

impl SidecarManager {
    pub fn new(client: Arc<SidecarClient>, launcher: Arc<dyn SidecarLauncher>) -> Self {
        Self {
            client,
            launcher,
            origin: Mutex::new(ServerOrigin::Unknown),
            polling: HealthPolling::default(),
        }
    }

    pub fn with_polling(mut self, polling: HealthPolling) -> Self {
        self.polling = polling;
        self
    }

    pub fn client(&self) -> &Arc<SidecarClient> {
        &self.client
    }

    pub async fn origin(&self) -> ServerOrigin {
        self.origin.lock().await.clone()
    }

    /// Make sure a healthy sidecar is running with `executable_path`.
    ///
    /// Returns `Ok(false)` when the server never became healthy within the
    /// polling budget; launch failures (e.g. missing binary) are errors.
    pub async fn ensure_server_running(&self, executable_path: Option<&str>) -> LlmResult<bool> {
        let requested = executable_path
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string);

        let mut origin = self.origin.lock().await;

        if self.client.health().await {
            let needs_restart = match &*origin {
                ServerOrigin::Started { executable_path } => *executable_path != requested,
                ServerOrigin::Unknown => requested.is_some(),
            };
            if !needs_restart {
                return Ok(true);
            }
            info!(
                "[Sidecar] executable path changed to {:?}, restarting",
                requested
            );
            self.launcher.stop().await?;
        } else if self.launcher.is_running().await {
            warn!("[Sidecar] process alive but not responding, restarting");
            self.launcher.stop().await?;
        }

        *origin = ServerOrigin::Unknown;
        self.launcher.start(requested.as_deref()).await?;
        *origin = ServerOrigin::Started {
            executable_path: requested,
        };

        Ok(self.wait_for_health().await)
    }

    async fn wait_for_health(&self) -> bool {
        for attempt in 1..=self.polling.attempts {
            tokio::time::sleep(self.polling.interval).await;
            if self.client.health().await {
                info!("[Sidecar] healthy after {} poll(s)", attempt);
                return true;
            }
        }
        warn!(
            "[Sidecar] not healthy after {} polls of {:?}",
            self.polling.attempts, self.polling.interval
        );
        false
    }

    /// Stop the sidecar and forget how it was started.
    pub async fn stop(&self) -> LlmResult<bool> {
        let mut origin = self.origin.lock().await;
        let stopped = self.launcher.stop().await?;
        *origin = ServerOrigin::Unknown;
        Ok(stopped)
    }

    pub async fn is_process_running(&self) -> bool {
        self.launcher.is_running().await
    }
}
