//! Incito Prompt
//!
//! Prompt-side building blocks that carry no I/O:
//!
//! - `variables` - Typed variable definitions and values
//! - `template` - `{{key}}` interpolation and template/variable synchronization
//! - `history` - Undo/redo form history with debounced user edits

pub mod history;
pub mod template;
pub mod variables;

pub use history::{FieldChange, FormHistory, FormValues, HistoryConfig, HistoryEntry, HistorySource};
pub use template::{extract_variable_keys, interpolate, resolve_value, sync_variables};
pub use variables::{
    humanize_key, is_valid_key, missing_required, ListFormat, SelectOption, Variable, VariableType,
    VariableValue,
};
