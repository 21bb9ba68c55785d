//! Commands
//!
//! Entry points for a host (the CLI or an embedding UI). Every command
//! returns the uniform `CommandResponse` envelope instead of an error.

pub mod graders;
pub mod health;
pub mod prompts;
pub mod runs;
pub mod settings;

pub use graders::*;
pub use health::*;
pub use prompts::*;
pub use runs::*;
pub use settings::*;
