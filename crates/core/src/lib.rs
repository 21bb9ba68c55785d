//! Incito Core
//!
//! Foundational error and streaming types shared by every crate in the
//! Incito Desktop workspace. This crate has zero dependencies on
//! application-level code (sidecar process, database, graders, etc.).
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `streaming` - Unified stream event types and adapter trait
//!
//! ## Design Principles
//!
//! 1. **Zero external dependencies beyond serde/thiserror** - keeps build times minimal
//! 2. **Unidirectional dependency** - this crate depends on nothing else in the workspace

pub mod error;
pub mod streaming;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Streaming Types ────────────────────────────────────────────────────
pub use streaming::{AdapterError, StreamAdapter, UnifiedStreamEvent};
