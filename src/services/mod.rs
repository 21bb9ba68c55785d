//! Services
//!
//! Business logic on top of storage and the model providers.

pub mod comparison;
pub mod run_mode;
pub mod runs;

pub use comparison::ComparisonRunner;
pub use run_mode::RunModeController;
pub use runs::{ExecutedRun, RunService};
