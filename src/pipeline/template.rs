//! Template rendering for generator arguments and pull request text.

use super::{PipelineError, PipelineResult};
use minijinja::Environment;
use serde_json::{Map, Value};

/// Values exposed to templates.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext(Map<String, Value>);

impl TemplateContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a string value.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.0.insert(key.to_owned(), Value::String(value.into()));
        self
    }

    /// Adds a list of strings.
    #[must_use]
    pub fn with_list(mut self, key: &str, values: &[String]) -> Self {
        let items = values.iter().cloned().map(Value::String).collect();
        self.0.insert(key.to_owned(), Value::Array(items));
        self
    }

    /// Adds a value that may be absent; absent keys render as empty.
    #[must_use]
    pub fn with_optional(mut self, key: &str, value: Option<String>) -> Self {
        if let Some(present) = value {
            self.0.insert(key.to_owned(), Value::String(present));
        }
        self
    }
}

/// Renders `template` with `context`.
///
/// # Errors
///
/// Returns [`PipelineError::Template`] when the template does not parse or
/// fails to evaluate.
pub fn render(name: &str, template: &str, context: &TemplateContext) -> PipelineResult<String> {
    let environment = Environment::new();
    environment
        .render_str(template, &context.0)
        .map_err(|error| PipelineError::Template {
            name: name.to_owned(),
            reason: error.to_string(),
        })
}
