//! Incito Desktop - Rust Backend Library
//!
//! Application layer of the Incito prompt workbench:
//! - Commands returning the uniform `CommandResponse` envelope
//! - Run mode, comparison runs and run execution services
//! - Storage layer (SQLite, JSON config)
//! - Data models and utilities
//!
//! Variables, interpolation and form history live in `incito-prompt`; the
//! sidecar client in `incito-llm`; graders in `incito-graders`.

pub mod commands;
pub mod models;
pub mod services;
pub mod state;
pub mod storage;
pub mod utils;

pub use models::response::*;
pub use models::settings::{AppConfig, SettingsUpdate};
pub use state::AppState;
pub use utils::error::{AppError, AppResult};
