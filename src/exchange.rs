//! Message exchange handed through a processing pipeline.
//!
//! An [`Exchange`] carries the inbound body the processor runs over, the
//! headers, and string-keyed properties that steer result conversion.

use encoding_rs::Encoding;
use indexmap::IndexMap;
use serde_json::Value;

use crate::dispatch::Headers;
use crate::error::CartridgeError;
use crate::runtime::engine::{ResultMap, RunResult};

/// Property holding the id of the run that produced the current body.
pub const RUN_ID_PROPERTY: &str = "NomrouteRunId";

/// Property naming the character set of a byte body, e.g. `ISO-8859-1`.
/// Byte bodies are read as UTF-8 when it is unset.
pub const CHARSET_PROPERTY: &str = "NomrouteCharsetName";

/// Body of an exchange.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Body {
    #[default]
    Empty,
    Json(Value),
    Text(String),
    Bytes(Vec<u8>),
    /// Exported beans of a run
    Result(ResultMap),
}

impl Body {
    /// Read the body as a JSON source document.
    ///
    /// Text and byte bodies are parsed as JSON; a result body becomes an
    /// object keyed by bean id.
    ///
    /// # Errors
    /// `Transform` for an empty body, `Json` when text is not valid JSON
    pub fn to_source(&self) -> Result<Value, CartridgeError> {
        self.to_source_in(None)
    }

    /// Read the body as a JSON source document, decoding a byte body with
    /// `charset` first.
    ///
    /// # Errors
    /// `Transform` for an empty body, an unknown charset label or bytes that
    /// are not valid in that charset; `Json` when the text is not valid JSON
    pub fn to_source_in(&self, charset: Option<&str>) -> Result<Value, CartridgeError> {
        match self {
            Body::Empty => Err(CartridgeError::Transform(
                "Exchange has no body to transform".to_string(),
            )),
            Body::Json(value) => Ok(value.clone()),
            Body::Text(text) => Ok(serde_json::from_str(text)?),
            Body::Bytes(bytes) => match charset {
                Some(label) => Ok(serde_json::from_str(&decode(bytes, label)?)?),
                None => Ok(serde_json::from_slice(bytes)?),
            },
            Body::Result(map) => Ok(serde_json::to_value(map)?),
        }
    }
}

fn decode(bytes: &[u8], label: &str) -> Result<String, CartridgeError> {
    let encoding = Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| CartridgeError::Transform(format!("Unknown charset '{}'", label)))?;

    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(CartridgeError::Transform(format!(
            "Body is not valid {} text",
            encoding.name()
        )));
    }
    Ok(text.into_owned())
}

impl From<RunResult> for Body {
    fn from(result: RunResult) -> Self {
        match result {
            RunResult::Java(map) => Body::Result(map),
            RunResult::Text(text) => Body::Text(text),
        }
    }
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        Body::Json(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Exchange {
    pub body: Body,
    pub headers: Headers,
    pub properties: IndexMap<String, Value>,
}

impl Exchange {
    pub fn new(body: impl Into<Body>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: Value) -> Self {
        self.headers.insert(name.into(), value);
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: Value) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: Value) {
        self.properties.insert(name.into(), value);
    }

    pub fn charset(&self) -> Option<&str> {
        self.property(CHARSET_PROPERTY).and_then(Value::as_str)
    }

    /// The body as a source document, honouring [`CHARSET_PROPERTY`].
    pub fn source(&self) -> Result<Value, CartridgeError> {
        self.body.to_source_in(self.charset())
    }

    /// String headers, used as global context fields of a run.
    pub fn string_headers(&self) -> impl Iterator<Item = (&String, &str)> {
        self.headers
            .iter()
            .filter_map(|(name, value)| value.as_str().map(|s| (name, s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_body_is_parsed_as_json() {
        let body = Body::Text(r#"{"a": 1}"#.to_string());
        assert_eq!(body.to_source().unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_invalid_text_body_is_json_error() {
        let body = Body::Text("<coords/>".to_string());
        assert!(matches!(body.to_source(), Err(CartridgeError::Json(_))));
    }

    #[test]
    fn test_byte_body_decoded_with_charset_property() {
        let exchange = Exchange::new(Body::Bytes(b"{\"name\": \"Jos\xe9\"}".to_vec()))
            .with_property(CHARSET_PROPERTY, json!("ISO-8859-1"));

        assert_eq!(exchange.source().unwrap(), json!({"name": "José"}));
    }

    #[test]
    fn test_latin1_bytes_without_charset_are_rejected() {
        let body = Body::Bytes(b"{\"name\": \"Jos\xe9\"}".to_vec());
        assert!(matches!(body.to_source(), Err(CartridgeError::Json(_))));
    }

    #[test]
    fn test_unknown_charset_is_transform_error() {
        let body = Body::Bytes(b"{}".to_vec());

        let err = body.to_source_in(Some("no-such-charset")).unwrap_err();
        assert!(matches!(err, CartridgeError::Transform(_)));
        assert!(err.to_string().contains("no-such-charset"));
    }

    #[test]
    fn test_empty_body_is_rejected() {
        assert!(matches!(Body::Empty.to_source(), Err(CartridgeError::Transform(_))));
    }

    #[test]
    fn test_run_result_into_body() {
        let mut map = ResultMap::new();
        map.insert("x".to_string(), json!(1));

        assert_eq!(Body::from(RunResult::Java(map.clone())), Body::Result(map));
        assert_eq!(
            Body::from(RunResult::Text("{}".to_string())),
            Body::Text("{}".to_string())
        );
    }

    #[test]
    fn test_string_headers() {
        let exchange = Exchange::new(json!({}))
            .with_header("filename", json!("coords.json"))
            .with_header("size", json!(12));

        let headers: Vec<_> = exchange.string_headers().collect();
        assert_eq!(headers, vec![(&"filename".to_string(), "coords.json")]);
    }
}
