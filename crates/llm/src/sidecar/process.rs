//! Sidecar Process
//!
//! Spawning and stopping the `claude-code-server` sidecar, plus discovery
//! and probing of the Claude Code executable it wraps.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::types::{LlmError, LlmResult};

/// Environment variable the sidecar reads the Claude executable path from
pub const CLAUDE_PATH_ENV: &str = "CLAUDE_CODE_EXECUTABLE_PATH";

const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Starts and stops the sidecar process.
#[async_trait]
pub trait SidecarLauncher: Send + Sync {
    /// Spawn the sidecar; returns its pid. Fails if one is already running.
    async fn start(&self, executable_path: Option<&str>) -> LlmResult<u32>;

    /// Kill the sidecar. Returns false when nothing was running.
    async fn stop(&self) -> LlmResult<bool>;

    /// Whether a spawned sidecar is still alive.
    async fn is_running(&self) -> bool;
}

/// Launches the sidecar binary as a child process.
pub struct ProcessLauncher {
    binary: PathBuf,
    child: Mutex<Option<Child>>,
}

impl ProcessLauncher {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            child: Mutex::new(None),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

#[async_trait]
impl SidecarLauncher for ProcessLauncher {
    async fn start(&self, executable_path: Option<&str>) -> LlmResult<u32> {
        let mut guard = self.child.lock().await;

        if let Some(child) = guard.as_mut() {
            match child.try_wait() {
                Ok(None) => return Err(LlmError::other("Server is already running")),
                Ok(Some(status)) => debug!("[Sidecar] previous process exited with {}", status),
                Err(e) => warn!("[Sidecar] could not poll previous process: {}", e),
            }
            *guard = None;
        }

        let mut cmd = Command::new(&self.binary);
        if let Some(path) = executable_path {
            cmd.env(CLAUDE_PATH_ENV, path);
            cmd.arg("--claude-path").arg(path);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LlmError::configuration(
                    format!("Sidecar binary not found at {}", self.binary.display()),
                    Some("Set sidecar.binary_path in ~/.incito/config.json"),
                )
            } else {
                LlmError::other(format!("Failed to spawn sidecar: {}", e))
            }
        })?;

        let pid = child.id().unwrap_or(0);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pipe_to_log(stdout, "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pipe_to_log(stderr, "stderr"));
        }

        info!(
            "[Sidecar] started pid {} (claude path: {})",
            pid,
            executable_path.unwrap_or("default")
        );
        *guard = Some(child);
        Ok(pid)
    }

    async fn stop(&self) -> LlmResult<bool> {
        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(false);
        };
        child
            .kill()
            .await
            .map_err(|e| LlmError::other(format!("Failed to kill sidecar: {}", e)))?;
        info!("[Sidecar] stopped");
        Ok(true)
    }

    async fn is_running(&self) -> bool {
        let mut guard = self.child.lock().await;
        match guard.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }
}

async fn pipe_to_log<R: AsyncRead + Unpin>(reader: R, stream: &'static str) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!("[Sidecar] {}: {}", stream, line);
    }
}

// ============================================================================
// Claude executable discovery
// ============================================================================

/// Outcome of locating or probing a Claude Code executable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaudeExecutableInfo {
    pub found: bool,
    pub path: Option<String>,
    pub version: Option<String>,
    pub error: Option<String>,
}

impl ClaudeExecutableInfo {
    fn missing(path: Option<String>, error: impl Into<String>) -> Self {
        Self {
            found: false,
            path,
            version: None,
            error: Some(error.into()),
        }
    }
}

/// Search `PATH` for `claude` and check whatever is found.
pub async fn find_claude_executable() -> ClaudeExecutableInfo {
    let locator = if cfg!(windows) { "where" } else { "which" };

    let output = match Command::new(locator).arg("claude").output().await {
        Ok(output) => output,
        Err(e) => {
            return ClaudeExecutableInfo::missing(None, format!("Failed to run {}: {}", locator, e))
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let first = stdout.lines().map(str::trim).find(|l| !l.is_empty());
    match first {
        Some(path) if output.status.success() => check_claude_executable(path).await,
        _ => ClaudeExecutableInfo::missing(None, "Claude Code not found in PATH"),
    }
}

/// Verify `path` exists and answers `--version` within five seconds.
pub async fn check_claude_executable(path: &str) -> ClaudeExecutableInfo {
    let owned = Some(path.to_string());
    if !Path::new(path).exists() {
        return ClaudeExecutableInfo::missing(owned, format!("File not found: {}", path));
    }

    let mut cmd = Command::new(path);
    cmd.arg("--version").kill_on_drop(true);

    match tokio::time::timeout(VERSION_CHECK_TIMEOUT, cmd.output()).await {
        Err(_) => ClaudeExecutableInfo::missing(owned, "Timed out waiting for --version"),
        Ok(Err(e)) => ClaudeExecutableInfo::missing(owned, format!("Failed to execute: {}", e)),
        Ok(Ok(output)) if !output.status.success() => {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            ClaudeExecutableInfo::missing(
                owned,
                if stderr.is_empty() {
                    format!("--version exited with {}", output.status)
                } else {
                    stderr
                },
            )
        }
        Ok(Ok(output)) => {
            let version = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty());
            ClaudeExecutableInfo {
                found: true,
                path: owned,
                version,
                error: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_check_missing_file() {
        let info = check_claude_executable("/definitely/not/here/claude").await;
        assert!(!info.found);
        assert!(info.error.unwrap().contains("File not found"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_configuration_error() {
        let launcher = ProcessLauncher::new("/definitely/not/here/claude-code-server");
        let err = launcher.start(None).await.unwrap_err();
        assert!(matches!(err, LlmError::Configuration { .. }));
        assert!(!launcher.is_running().await);
    }

    #[tokio::test]
    async fn test_stop_without_process() {
        let launcher = ProcessLauncher::new("claude-code-server");
        assert!(!launcher.stop().await.unwrap());
    }
}
