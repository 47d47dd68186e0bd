//! Configuration document handling.
//!
//! The installer's global configuration is a YAML document; each job
//! receives one slice of it as a [`JobConfig`]: a mapping from string keys
//! to arbitrarily nested values. Unknown keys are ignored by jobs; the
//! typed accessors distinguish "key absent" (caller applies its default)
//! from "key present with the wrong type" (a configuration error).

use anyhow::{bail, Context, Result};
use serde_yaml::{Mapping, Value};

use crate::job::JobError;

pub mod descriptor;

/// One job's slice of the configuration document.
#[derive(Debug, Clone, Default)]
pub struct JobConfig {
    map: Mapping,
}

impl JobConfig {
    /// Empty slice; every lookup reports the key as absent.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_mapping(map: Mapping) -> Self {
        Self { map }
    }

    /// Parse a standalone YAML mapping, e.g. a per-job config file.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(text).context("parsing job configuration YAML")?;
        match value {
            Value::Mapping(map) => Ok(Self { map }),
            Value::Null => Ok(Self::default()),
            other => bail!(
                "job configuration must be a mapping, got {}",
                value_type_name(&other)
            ),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Raw lookup. Prefer the typed accessors.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.map.get(key)
    }

    /// String value of `key`. `Ok(None)` if absent or null.
    pub fn str_value(&self, key: &str) -> Result<Option<&str>, JobError> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(type_error(key, "a string", other)),
        }
    }

    /// Boolean value of `key`. `Ok(None)` if absent or null.
    pub fn bool_value(&self, key: &str) -> Result<Option<bool>, JobError> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(type_error(key, "a boolean", other)),
        }
    }

    /// Unsigned integer value of `key`. `Ok(None)` if absent or null.
    pub fn u64_value(&self, key: &str) -> Result<Option<u64>, JobError> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .map(Some)
                .ok_or_else(|| type_error(key, "a non-negative integer", &Value::Number(n.clone()))),
            Some(other) => Err(type_error(key, "a non-negative integer", other)),
        }
    }

    /// Nested mapping under `key`. `Ok(None)` if absent or null.
    pub fn mapping(&self, key: &str) -> Result<Option<&Mapping>, JobError> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Mapping(m)) => Ok(Some(m)),
            Some(other) => Err(type_error(key, "a mapping", other)),
        }
    }

    /// Sequence under `key`. `Ok(None)` if absent or null.
    pub fn sequence(&self, key: &str) -> Result<Option<&Vec<Value>>, JobError> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Sequence(seq)) => Ok(Some(seq)),
            Some(other) => Err(type_error(key, "a sequence", other)),
        }
    }
}

fn type_error(key: &str, expected: &str, got: &Value) -> JobError {
    JobError::configuration(format!(
        "config key '{}' must be {}, got {}",
        key,
        expected,
        value_type_name(got)
    ))
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
