//! Form Integration Tests
//!
//! Prompt template edits, the undo/redo form history configured from app
//! settings, and rendering of the resulting values.

use std::time::{Duration, Instant};

use incito_desktop::models::prompt::PromptDocument;
use incito_desktop::AppConfig;
use incito_prompt::{FormHistory, HistorySource, ListFormat, VariableType, VariableValue};

fn brief_prompt() -> PromptDocument {
    let mut prompt = PromptDocument::new(
        "prompt-brief",
        "Brief",
        "Write a {{tone}} brief about {{subject}}.\n{{steps}}",
    );
    prompt.variables[0].default = Some(VariableValue::from("neutral"));
    prompt.variables[2].var_type = VariableType::Array;
    prompt.variables[2].format = Some(ListFormat::Numbered);
    prompt
}

#[test]
fn test_template_edit_keeps_variable_settings() {
    let mut prompt = brief_prompt();
    prompt.set_template("A {{tone}} note on {{subject}} for {{reader}}.");

    let keys: Vec<&str> = prompt.variables.iter().map(|v| v.key.as_str()).collect();
    assert_eq!(keys, vec!["tone", "subject", "reader"]);
    assert_eq!(
        prompt.variable("tone").unwrap().default,
        Some(VariableValue::from("neutral"))
    );
    assert_eq!(prompt.variable("reader").unwrap().var_type, VariableType::Text);
    assert!(prompt.validate().is_ok());
}

#[test]
fn test_history_from_settings_then_render() {
    let mut config = AppConfig::default();
    config.history.debounce_ms = 100;
    config.history.max_history_size = 2;

    let prompt = brief_prompt();
    let mut history = FormHistory::with_values(prompt.default_values(), config.history_config());
    let start = Instant::now();

    history.set_value_at("subject", VariableValue::from("caching"), start);
    history.set_value_at(
        "subject",
        VariableValue::from("cache eviction"),
        start + Duration::from_millis(50),
    );
    assert!(history.poll(start + Duration::from_millis(200)));
    assert_eq!(history.past_len(), 1);

    history.set_values(
        [
            ("tone", VariableValue::from("formal")),
            (
                "steps",
                VariableValue::from(vec!["measure", "pick a policy"]),
            ),
        ],
        HistorySource::AiFill,
    );
    assert_eq!(
        prompt.render(history.values()),
        "Write a formal brief about cache eviction.\n1. measure\n2. pick a policy"
    );

    assert!(history.undo());
    assert_eq!(
        prompt.render(history.values()),
        "Write a neutral brief about cache eviction.\n"
    );

    assert!(history.undo());
    assert!(history.value("subject").is_none());
    assert!(!history.undo());

    assert!(history.redo());
    assert!(history.redo());
    assert_eq!(history.value("tone"), Some(&VariableValue::from("formal")));

    history.set_values([("tone", VariableValue::from("casual"))], HistorySource::AiRefine);
    assert_eq!(history.past_len(), 2);
    assert!(!history.can_redo());
}
