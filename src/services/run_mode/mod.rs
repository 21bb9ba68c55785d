//! Run Mode
//!
//! Guided conversation that fills in a prompt's variables with the help of
//! a model calling the run-mode tools.

pub mod controller;
pub mod prompt_builder;
pub mod types;

pub use controller::RunModeController;
pub use prompt_builder::{build_system_prompt, KICKOFF_MESSAGE};
pub use types::{
    RunModeError, RunModeEvent, RunModeMessage, RunModePhase, RunModeProgress, RunModeResult,
    RunModeSnapshot, RunModeState, TurnOutcome,
};
