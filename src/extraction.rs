//! Path-based bean extraction from JSON source documents.
//!
//! Beans are located in the source by a [`FieldPath`] such as
//! `coords/coord` or `order.items.[0]`.

use std::fmt;

use serde_json::Value;

use crate::runtime::context::RunContext;
use crate::runtime::engine::BeanExtractor;

/// Path to a node in a source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    /// The raw path string
    pub raw: String,
    /// Parsed path segments
    pub segments: Vec<PathSegment>,
}

/// A segment in a field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// A named object member (e.g., "coords")
    Field(String),
    /// An array index (e.g., [0], [5])
    Index(usize),
}

impl FieldPath {
    /// Parse a field path with a given delimiter
    ///
    /// # Example
    ///
    /// ```
    /// use nomroute::FieldPath;
    ///
    /// let path = FieldPath::parse("order.address.city", ".");
    /// assert_eq!(path.segments.len(), 3);
    /// ```
    pub fn parse(path: &str, delimiter: &str) -> Self {
        let segments = path
            .split(delimiter)
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s.starts_with('[') && s.ends_with(']') {
                    if let Ok(index) = s[1..s.len() - 1].parse::<usize>() {
                        return PathSegment::Index(index);
                    }
                }
                PathSegment::Field(s.to_string())
            })
            .collect();

        Self {
            raw: path.to_string(),
            segments,
        }
    }

    pub fn from_dotted(path: &str) -> Self {
        Self::parse(path, ".")
    }

    /// Parse a selector-style path. `/` separates segments when present,
    /// otherwise `.` does.
    pub fn from_selector(path: &str) -> Self {
        if path.contains('/') {
            Self::parse(path, "/")
        } else {
            Self::from_dotted(path)
        }
    }

    /// `true` when both paths address the same node, whatever delimiter
    /// they were written with.
    pub fn same_node(&self, other: &FieldPath) -> bool {
        self.segments == other.segments
    }

    /// `true` for the empty path, which addresses the document root.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Walk the path from `root`.
    ///
    /// # Returns
    /// The addressed node, or `None` if any segment is missing
    pub fn resolve<'v>(&self, root: &'v Value) -> Option<&'v Value> {
        self.segments.iter().try_fold(root, |node, segment| match segment {
            PathSegment::Field(name) => node.get(name.as_str()),
            PathSegment::Index(index) => node.get(*index),
        })
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Extracts the subtree at a fixed path as a bean.
///
/// A repeated extractor expects an array at its path and announces one bean
/// per element, in document order.
#[derive(Debug, Clone)]
pub struct PathExtractor {
    bean_id: String,
    path: FieldPath,
    repeated: bool,
    required: bool,
}

impl PathExtractor {
    pub fn new(bean_id: impl Into<String>, path: &str) -> Self {
        Self {
            bean_id: bean_id.into(),
            path: FieldPath::from_selector(path),
            repeated: false,
            required: false,
        }
    }

    pub fn repeated(mut self, repeated: bool) -> Self {
        self.repeated = repeated;
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn path(&self) -> &FieldPath {
        &self.path
    }
}

impl BeanExtractor for PathExtractor {
    fn extract(&self, _run: &RunContext, source: &Value) -> Result<Option<Value>, String> {
        match self.path.resolve(source) {
            Some(Value::Null) | None => Ok(None),
            Some(value) if self.repeated && !value.is_array() => Err(format!(
                "Expected a list at '{}', found {}",
                self.path,
                value_kind(value)
            )),
            Some(value) => Ok(Some(value.clone())),
        }
    }

    fn bean_id(&self) -> &str {
        &self.bean_id
    }

    fn selector(&self) -> &str {
        &self.path.raw
    }

    fn is_repeated(&self) -> bool {
        self.repeated
    }

    fn is_required(&self) -> bool {
        self.required
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
