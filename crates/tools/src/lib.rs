//! Incito Tools
//!
//! The tools a model may call while collecting variable values in run mode:
//! - `definitions` - JSON-schema tool definitions sent with each request
//! - `call` - typed parsing of completed tool calls (`RunModeToolCall`)

pub mod call;
pub mod definitions;

pub use call::RunModeToolCall;
pub use definitions::{
    run_mode_tools, ASK_FOLLOW_UP, COMPLETE_FIELD, DISPLAY_FIELD, FINISH_RUN,
};
