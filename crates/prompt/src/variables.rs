//! Prompt Variables
//!
//! Typed placeholders collected from the user (or the model in run mode)
//! before a prompt template is rendered.

use std::collections::HashMap;
use std::sync::OnceLock;

use incito_core::{CoreError, CoreResult};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Input control type of a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VariableType {
    Text,
    Textarea,
    Number,
    Slider,
    Select,
    MultiSelect,
    Array,
}

impl VariableType {
    /// Whether values of this type are lists of strings
    pub fn is_list(&self) -> bool {
        matches!(self, VariableType::MultiSelect | VariableType::Array)
    }

    /// Whether values of this type are numeric
    pub fn is_numeric(&self) -> bool {
        matches!(self, VariableType::Number | VariableType::Slider)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VariableType::Text => "text",
            VariableType::Textarea => "textarea",
            VariableType::Number => "number",
            VariableType::Slider => "slider",
            VariableType::Select => "select",
            VariableType::MultiSelect => "multi-select",
            VariableType::Array => "array",
        }
    }
}

impl std::fmt::Display for VariableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How list values are joined when rendered into a template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListFormat {
    /// `a, b, c`
    #[default]
    Comma,
    /// One item per line
    Newline,
    /// `1. a` / `2. b`
    Numbered,
    /// `- a` / `- b`
    Bullet,
}

impl ListFormat {
    /// Join items according to this format.
    pub fn join(&self, items: &[String]) -> String {
        match self {
            ListFormat::Comma => items.join(", "),
            ListFormat::Newline => items.join("\n"),
            ListFormat::Numbered => items
                .iter()
                .enumerate()
                .map(|(i, item)| format!("{}. {}", i + 1, item))
                .collect::<Vec<_>>()
                .join("\n"),
            ListFormat::Bullet => items
                .iter()
                .map(|item| format!("- {}", item))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A value held by a variable.
///
/// Serialized untagged so that JSON strings, numbers and string arrays map
/// directly onto the variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Text(String),
    Number(f64),
    List(Vec<String>),
}

impl VariableValue {
    /// Empty text and empty lists count as "no value"; numbers never do.
    pub fn is_empty(&self) -> bool {
        match self {
            VariableValue::Text(s) => s.is_empty(),
            VariableValue::Number(_) => false,
            VariableValue::List(items) => items.is_empty(),
        }
    }

    /// Render the value as plain text, joining lists with `format`.
    pub fn render(&self, format: ListFormat) -> String {
        match self {
            VariableValue::Text(s) => s.clone(),
            VariableValue::Number(n) => format_number(*n),
            VariableValue::List(items) => format.join(items),
        }
    }
}

impl std::fmt::Display for VariableValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render(ListFormat::Comma))
    }
}

impl From<&str> for VariableValue {
    fn from(value: &str) -> Self {
        VariableValue::Text(value.to_string())
    }
}

impl From<String> for VariableValue {
    fn from(value: String) -> Self {
        VariableValue::Text(value)
    }
}

impl From<f64> for VariableValue {
    fn from(value: f64) -> Self {
        VariableValue::Number(value)
    }
}

impl From<Vec<String>> for VariableValue {
    fn from(value: Vec<String>) -> Self {
        VariableValue::List(value)
    }
}

impl From<Vec<&str>> for VariableValue {
    fn from(value: Vec<&str>) -> Self {
        VariableValue::List(value.into_iter().map(str::to_string).collect())
    }
}

/// Integral numbers print without a fractional part (`5`, not `5.0`).
fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// One choice of a select / multi-select variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
}

impl SelectOption {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// A named, typed placeholder in a prompt template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    /// Identifier matching `{{key}}` occurrences in the template
    pub key: String,
    /// Input control type
    #[serde(rename = "type")]
    pub var_type: VariableType,
    /// Human-readable label
    pub label: String,
    /// Whether a value must be provided before the prompt can run
    #[serde(default)]
    pub required: bool,
    /// Default value used when no explicit value is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<VariableValue>,
    /// Choices for select types
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SelectOption>,
    /// Slider lower bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Slider upper bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Slider step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    /// Join format for array / multi-select values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<ListFormat>,
    /// Optional input placeholder text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

impl Variable {
    /// Create a variable with the given key and type and a humanized label.
    pub fn new(key: impl Into<String>, var_type: VariableType) -> Self {
        let key = key.into();
        Self {
            label: humanize_key(&key),
            key,
            var_type,
            required: false,
            default: None,
            options: Vec::new(),
            min: None,
            max: None,
            step: None,
            format: None,
            placeholder: None,
        }
    }

    /// Shorthand for a plain text variable
    pub fn text(key: impl Into<String>) -> Self {
        Self::new(key, VariableType::Text)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_default(mut self, value: impl Into<VariableValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_format(mut self, format: ListFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_options(mut self, options: Vec<SelectOption>) -> Self {
        self.options = options;
        self
    }

    pub fn with_range(mut self, min: f64, max: f64, step: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self.step = Some(step);
        self
    }

    /// Join format, falling back to comma-separated.
    pub fn list_format(&self) -> ListFormat {
        self.format.unwrap_or_default()
    }

    /// The explicit value if present and non-empty, else the non-empty default.
    pub fn effective_value<'a>(
        &'a self,
        explicit: Option<&'a VariableValue>,
    ) -> Option<&'a VariableValue> {
        explicit
            .filter(|v| !v.is_empty())
            .or_else(|| self.default.as_ref().filter(|v| !v.is_empty()))
    }

    /// Convert `value` to the shape this variable's type expects.
    ///
    /// Text for a list type is split on commas, numeric text for a number or
    /// slider becomes a number, and numbers or lists given to a text-like
    /// variable are rendered to text. Anything else is kept as is.
    pub fn coerce(&self, value: VariableValue) -> VariableValue {
        if self.var_type.is_list() {
            return match value {
                VariableValue::Text(raw) => VariableValue::List(
                    raw.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect(),
                ),
                VariableValue::Number(n) => VariableValue::List(vec![format_number(n)]),
                list => list,
            };
        }
        if self.var_type.is_numeric() {
            return match value {
                VariableValue::Text(raw) => match raw.trim().parse::<f64>() {
                    Ok(n) => VariableValue::Number(n),
                    Err(_) => VariableValue::Text(raw),
                },
                other => other,
            };
        }
        match value {
            VariableValue::Text(raw) => VariableValue::Text(raw),
            other => VariableValue::Text(other.render(self.list_format())),
        }
    }

    /// Check structural consistency of the definition.
    pub fn validate(&self) -> CoreResult<()> {
        if !is_valid_key(&self.key) {
            return Err(CoreError::validation(format!(
                "Invalid variable key '{}': must start with a letter or underscore and contain only letters, digits and underscores",
                self.key
            )));
        }

        match self.var_type {
            VariableType::Select | VariableType::MultiSelect if self.options.is_empty() => {
                Err(CoreError::validation(format!(
                    "Variable '{}' of type {} needs at least one option",
                    self.key, self.var_type
                )))
            }
            VariableType::Slider => match (self.min, self.max) {
                (Some(min), Some(max)) if min > max => Err(CoreError::validation(format!(
                    "Variable '{}' has min {} greater than max {}",
                    self.key, min, max
                ))),
                _ => Ok(()),
            },
            _ => Ok(()),
        }
    }
}

/// Whether `key` is usable as a `{{key}}` placeholder name.
pub fn is_valid_key(key: &str) -> bool {
    static KEY: OnceLock<Regex> = OnceLock::new();
    KEY.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"))
        .is_match(key)
}

/// `first_name` / `firstName` -> `First Name`
pub fn humanize_key(key: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for c in key.chars() {
        if c == '_' || c == '-' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
        .iter()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Keys of required variables that have neither a value nor a default.
pub fn missing_required(
    variables: &[Variable],
    values: &HashMap<String, VariableValue>,
) -> Vec<String> {
    variables
        .iter()
        .filter(|v| v.required && v.effective_value(values.get(&v.key)).is_none())
        .map(|v| v.key.clone())
        .collect()
}
