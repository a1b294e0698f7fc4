//! Correlation id templates.
//!
//! A template is literal text with `${...}` placeholders. A placeholder is
//! either a dotted path into the run's merged model (`${run.id}`,
//! `${order.header.number}`) or a function call. The only function is
//! `uuid()`, which yields a fresh v4 id on every evaluation.

use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::extraction::FieldPath;
use crate::runtime::context::RunContext;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Unterminated placeholder in template '{0}'")]
    Unterminated(String),

    #[error("Empty placeholder in template '{0}'")]
    EmptyPlaceholder(String),

    #[error("Unknown template function '{0}()'")]
    UnknownFunction(String),

    #[error("Template variable '{0}' is not defined")]
    MissingVariable(String),

    #[error("Invalid placeholder pattern: {0}")]
    Pattern(String),
}

const PLACEHOLDER_PATTERN: &str = r"\$\{([^}]*)\}";

#[derive(Debug, Clone, PartialEq)]
enum Part {
    Literal(String),
    Variable(FieldPath),
    Uuid,
}

/// A parsed correlation template.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationTemplate {
    source: String,
    parts: Vec<Part>,
}

impl CorrelationTemplate {
    /// Parse template text.
    ///
    /// # Errors
    /// Unterminated or empty placeholders and unknown functions
    ///
    /// # Example
    /// ```
    /// use nomroute::routing::CorrelationTemplate;
    /// use serde_json::json;
    ///
    /// let template = CorrelationTemplate::parse("order-${order.id}").unwrap();
    /// let rendered = template.render(&json!({"order": {"id": 42}})).unwrap();
    /// assert_eq!(rendered, "order-42");
    /// ```
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let placeholder = Regex::new(PLACEHOLDER_PATTERN)
            .map_err(|e| TemplateError::Pattern(e.to_string()))?;

        let mut parts = Vec::new();
        let mut last = 0;

        for captures in placeholder.captures_iter(source) {
            let (Some(whole), Some(expression)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            push_literal(&mut parts, &source[last..whole.start()], source)?;

            parts.push(parse_placeholder(expression.as_str().trim(), source)?);
            last = whole.end();
        }
        push_literal(&mut parts, &source[last..], source)?;

        Ok(Self {
            source: source.to_string(),
            parts,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Render against a model object.
    pub fn render(&self, model: &Value) -> Result<String, TemplateError> {
        let mut rendered = String::new();

        for part in &self.parts {
            match part {
                Part::Literal(text) => rendered.push_str(text),
                Part::Uuid => rendered.push_str(&Uuid::new_v4().to_string()),
                Part::Variable(path) => match path.resolve(model) {
                    None | Some(Value::Null) => {
                        return Err(TemplateError::MissingVariable(path.raw.clone()));
                    }
                    Some(Value::String(s)) => rendered.push_str(s),
                    Some(other) => rendered.push_str(&other.to_string()),
                },
            }
        }

        Ok(rendered)
    }
}

fn push_literal(parts: &mut Vec<Part>, text: &str, source: &str) -> Result<(), TemplateError> {
    if text.contains("${") {
        return Err(TemplateError::Unterminated(source.to_string()));
    }
    if !text.is_empty() {
        parts.push(Part::Literal(text.to_string()));
    }
    Ok(())
}

fn parse_placeholder(expression: &str, source: &str) -> Result<Part, TemplateError> {
    if expression.is_empty() {
        return Err(TemplateError::EmptyPlaceholder(source.to_string()));
    }

    match expression.strip_suffix("()") {
        Some("uuid") => Ok(Part::Uuid),
        Some(function) => Err(TemplateError::UnknownFunction(function.to_string())),
        None => Ok(Part::Variable(FieldPath::from_dotted(expression))),
    }
}

/// Correlation header policy of a router: header name plus template.
#[derive(Debug, Clone, PartialEq)]
pub struct Correlation {
    pub header_name: String,
    pub template: CorrelationTemplate,
}

impl Correlation {
    /// Render the correlation id for a run.
    pub fn compute(&self, run: &RunContext) -> Result<String, TemplateError> {
        self.template.render(&run.merged_model())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_literal_only() {
        let template = CorrelationTemplate::parse("static-id").unwrap();
        assert_eq!(template.render(&json!({})).unwrap(), "static-id");
    }

    #[test]
    fn test_variables_and_literals() {
        let template =
            CorrelationTemplate::parse("${source}:${order.number}/${order.lines}").unwrap();
        let model = json!({"source": "edi", "order": {"number": 7, "lines": 3}});

        assert_eq!(template.render(&model).unwrap(), "edi:7/3");
    }

    #[test]
    fn test_missing_variable_is_error() {
        let template = CorrelationTemplate::parse("${order.number}").unwrap();
        assert_eq!(
            template.render(&json!({"order": {}})),
            Err(TemplateError::MissingVariable("order.number".to_string()))
        );
    }

    #[test]
    fn test_uuid_function_is_fresh_per_render() {
        let template = CorrelationTemplate::parse("${uuid()}").unwrap();
        let a = template.render(&json!({})).unwrap();
        let b = template.render(&json!({})).unwrap();

        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            CorrelationTemplate::parse("abc-${run.id"),
            Err(TemplateError::Unterminated(_))
        ));
        assert!(matches!(
            CorrelationTemplate::parse("${ }"),
            Err(TemplateError::EmptyPlaceholder(_))
        ));
        assert_eq!(
            CorrelationTemplate::parse("${now()}"),
            Err(TemplateError::UnknownFunction("now".to_string()))
        );
    }

    #[test]
    fn test_run_id_is_stable_within_a_run() {
        let correlation = Correlation {
            header_name: "correlationId".to_string(),
            template: CorrelationTemplate::parse("${run.id}").unwrap(),
        };
        let run = RunContext::empty();

        let first = correlation.compute(&run).unwrap();
        assert_eq!(first, run.run_id().to_string());
        assert_eq!(correlation.compute(&run).unwrap(), first);
        assert_ne!(correlation.compute(&RunContext::empty()).unwrap(), first);
    }
}
