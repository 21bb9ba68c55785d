//! Integration Tests Module
//!
//! End-to-end tests for the Incito workbench core. The sidecar and the judge
//! endpoint are served by wiremock; databases are in-memory or in temp dirs.

// AppState, commands and run execution against a mocked sidecar
mod workbench_test;

// Run mode over the real SSE client
mod run_mode_test;

// File-backed SQLite persistence
mod storage_test;

// Prompt editing, form history and rendering
mod form_test;
