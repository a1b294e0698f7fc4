//! Result type converters.
//!
//! Conversions from a run's result to the types a pipeline asks for. All of
//! them are total: a result that does not fit yields `None`, never an error.
//! The [`ConverterRegistry`] picks a converter by target type and falls back
//! to scanning the result values for the first one that deserializes into
//! the target.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::exchange::{Body, Exchange};
use crate::runtime::engine::{ResultMap, RunResult};

/// Exchange property naming the result entry `to_list` returns.
pub const RESULT_KEY_PROPERTY: &str = "NomrouteResultKey";

/// The only value of a single-entry result.
///
/// # Returns
/// `None` unless the result holds exactly one entry
pub fn to_single(result: &ResultMap) -> Option<&Value> {
    if result.len() == 1 {
        result.values().next()
    } else {
        None
    }
}

/// The value stored under `key`.
pub fn by_key<'r>(result: &'r ResultMap, key: &str) -> Option<&'r Value> {
    result.get(key)
}

/// A list from the result.
///
/// Uses the entry named by the [`RESULT_KEY_PROPERTY`] exchange property when
/// set, otherwise the single entry of the result.
pub fn to_list(result: &ResultMap, exchange: &Exchange) -> Option<Vec<Value>> {
    let value = match exchange.property(RESULT_KEY_PROPERTY).and_then(Value::as_str) {
        Some(key) => by_key(result, key),
        None => to_single(result),
    };

    value.and_then(Value::as_array).cloned()
}

pub fn to_integer(result: &ResultMap) -> Option<i64> {
    to_single(result).and_then(Value::as_i64)
}

pub fn to_double(result: &ResultMap) -> Option<f64> {
    to_single(result).and_then(Value::as_f64)
}

/// Text of a text result.
pub fn to_text(result: &RunResult) -> Option<&str> {
    match result {
        RunResult::Text(text) => Some(text),
        RunResult::Java(_) => None,
    }
}

/// The result as a JSON object keyed by bean id.
pub fn to_map(result: &ResultMap) -> Map<String, Value> {
    result
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// First result value that deserializes into `T`.
pub fn convert_to<T: DeserializeOwned>(result: &ResultMap) -> Option<T> {
    result
        .values()
        .find_map(|value| serde_json::from_value(value.clone()).ok())
}

type ConverterFn = Box<dyn Fn(&ResultMap, &Exchange) -> Option<Box<dyn Any>> + Send + Sync>;

/// Type-directed converter lookup.
pub struct ConverterRegistry {
    converters: HashMap<TypeId, ConverterFn>,
}

impl ConverterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            converters: HashMap::new(),
        }
    }

    /// Registry with the built-in result converters.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(|result, exchange| to_list(result, exchange));
        registry.register(|result, _| to_integer(result));
        registry.register(|result, _| to_double(result));
        registry.register(|result, _| Some(to_map(result)));
        registry
    }

    /// Register the converter for target type `T`, replacing any existing one.
    pub fn register<T, F>(&mut self, converter: F)
    where
        T: 'static,
        F: Fn(&ResultMap, &Exchange) -> Option<T> + Send + Sync + 'static,
    {
        self.converters.insert(
            TypeId::of::<T>(),
            Box::new(move |result, exchange| {
                converter(result, exchange).map(|value| Box::new(value) as Box<dyn Any>)
            }),
        );
    }

    pub fn has_converter<T: 'static>(&self) -> bool {
        self.converters.contains_key(&TypeId::of::<T>())
    }

    /// Convert a result to `T`.
    ///
    /// A registered converter for `T` wins; otherwise the first result value
    /// that deserializes into `T` is returned.
    pub fn convert<T>(&self, result: &ResultMap, exchange: &Exchange) -> Option<T>
    where
        T: DeserializeOwned + 'static,
    {
        match self.converters.get(&TypeId::of::<T>()) {
            Some(converter) => converter(result, exchange)
                .and_then(|value| value.downcast::<T>().ok())
                .map(|value| *value),
            None => convert_to(result),
        }
    }

    /// Convert the exchange body to `T`.
    pub fn convert_body<T>(&self, exchange: &Exchange) -> Option<T>
    where
        T: DeserializeOwned + 'static,
    {
        match &exchange.body {
            Body::Result(result) => self.convert(result, exchange),
            Body::Text(text) => serde_json::from_value(Value::String(text.clone())).ok(),
            Body::Json(value) => serde_json::from_value(value.clone()).ok(),
            Body::Bytes(_) | Body::Empty => None,
        }
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
