//! Data Models
//!
//! Types shared by storage, services and the CLI.

pub mod prompt;
pub mod response;
pub mod run;
pub mod settings;

pub use prompt::PromptDocument;
pub use response::{CommandResponse, HealthResponse};
pub use run::{ComparisonEvent, ProviderRunResult, RunContext, RunRecord, RunStatus};
pub use settings::{AppConfig, HistorySettings, ProviderSettings, SettingsUpdate, SidecarSettings};
