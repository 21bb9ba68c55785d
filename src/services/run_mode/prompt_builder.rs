//! System prompt for run-mode turns.
//!
//! Rebuilt on every turn from the current state so the model always sees
//! up-to-date progress.

use std::fmt::Write;

use incito_prompt::{resolve_value, Variable, VariableType};
use incito_tools::{ASK_FOLLOW_UP, COMPLETE_FIELD, DISPLAY_FIELD, FINISH_RUN};

use super::types::RunModeState;

/// User message sent when the conversation has no messages yet.
pub const KICKOFF_MESSAGE: &str = "Let's start filling in the prompt.";

pub fn build_system_prompt(state: &RunModeState) -> String {
    let mut out = String::new();
    let prompt = match &state.prompt {
        Some(prompt) => prompt,
        None => return out,
    };

    out.push_str(
        "You help the user fill in the variables of a prompt template, one field at a time. \
         Ask short, friendly questions and record answers with the tools below.\n\n",
    );

    let _ = writeln!(out, "## Prompt: {}", prompt.name);
    if let Some(description) = &prompt.description {
        let _ = writeln!(out, "{}", description);
    }
    let _ = writeln!(out, "\n<template>\n{}\n</template>\n", prompt.template);

    out.push_str("## Fields\n");
    for variable in &prompt.variables {
        let _ = writeln!(out, "- {}", describe_variable(variable));
    }

    let progress = state.progress();
    let _ = writeln!(
        out,
        "\n## Progress\nRequired fields completed: {}/{}",
        progress.completed, progress.total
    );

    if state.completed_fields.is_empty() {
        out.push_str("Completed: none\n");
    } else {
        out.push_str("Completed:\n");
        for key in &state.completed_fields {
            let value = resolve_value(key, &state.values, &prompt.variables);
            let _ = writeln!(out, "- {} = {}", key, one_line(&value));
        }
    }

    let remaining = state.remaining_fields();
    if remaining.is_empty() {
        out.push_str("Remaining: none\n");
    } else {
        let keys: Vec<&str> = remaining.iter().map(|v| v.key.as_str()).collect();
        let _ = writeln!(out, "Remaining: {}", keys.join(", "));
    }
    if let Some(key) = &state.displayed_field {
        let _ = writeln!(out, "Currently asking for: {}", key);
    }

    if let Some(instructions) = &state.custom_instructions {
        let _ = writeln!(out, "\n## Additional instructions\n{}", instructions.trim());
    }

    let _ = write!(
        out,
        "\n## Tools\n\
         - Call `{display}` before asking about a field so the user gets an input for it.\n\
         - Call `{complete}` as soon as the user's answer gives a field's value.\n\
         - Call `{follow_up}` when an answer is ambiguous.\n\
         - Call `{finish}` once every required field is completed.\n\
         Only use the field keys listed above.\n",
        display = DISPLAY_FIELD,
        complete = COMPLETE_FIELD,
        follow_up = ASK_FOLLOW_UP,
        finish = FINISH_RUN,
    );

    out
}

fn describe_variable(variable: &Variable) -> String {
    let mut line = format!(
        "`{}` ({}) \"{}\"",
        variable.key,
        variable.var_type.as_str(),
        variable.label
    );
    if variable.required {
        line.push_str(", required");
    }
    if matches!(
        variable.var_type,
        VariableType::Select | VariableType::MultiSelect
    ) && !variable.options.is_empty()
    {
        let options: Vec<&str> = variable.options.iter().map(|o| o.value.as_str()).collect();
        let _ = write!(line, ", options: {}", options.join(" | "));
    }
    if let (Some(min), Some(max)) = (variable.min, variable.max) {
        let _ = write!(line, ", range {}..{}", min, max);
    }
    if let Some(default) = &variable.default {
        if !default.is_empty() {
            let _ = write!(line, ", default: {}", one_line(&default.render(variable.list_format())));
        }
    }
    line
}

fn one_line(value: &str) -> String {
    value.replace('\n', " / ")
}
