//! Typed access to stage options.
//!
//! Stage factories pull each option they declare out of a [`StageOptions`],
//! converting it to the declared type. A value that does not parse is a
//! fatal [`PipelineError::InvalidOption`]. Keys nobody asked for are logged
//! and ignored when the factory is done.

use crate::{PipelineError, Result};
use mediagraph_core::Rational;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// An option value after typed parsing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OptionValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Rational(Rational),
    Str(String),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Rational(v) => write!(f, "{}", v),
            Self::Str(v) => f.write_str(v),
        }
    }
}

/// Raw option map of one stage plus the values applied so far.
#[derive(Debug, Clone)]
pub struct StageOptions {
    stage: String,
    raw: BTreeMap<String, String>,
    applied: BTreeMap<String, OptionValue>,
}

impl StageOptions {
    pub fn new(stage: impl Into<String>, raw: BTreeMap<String, String>) -> Self {
        Self {
            stage: stage.into(),
            raw,
            applied: BTreeMap::new(),
        }
    }

    /// Stage these options belong to.
    pub fn stage(&self) -> &str {
        &self.stage
    }

    fn invalid(&self, key: &str, value: &str, expected: &'static str) -> PipelineError {
        PipelineError::InvalidOption {
            stage: self.stage.clone(),
            key: key.to_string(),
            value: value.to_string(),
            expected,
        }
    }

    fn take_with<T>(
        &mut self,
        key: &str,
        default: T,
        expected: &'static str,
        parse: impl Fn(&str) -> Option<T>,
        record: impl Fn(&T) -> OptionValue,
    ) -> Result<T> {
        let value = match self.raw.remove(key) {
            Some(text) => parse(text.trim()).ok_or_else(|| self.invalid(key, &text, expected))?,
            None => default,
        };
        self.applied.insert(key.to_string(), record(&value));
        Ok(value)
    }

    /// Signed integer option.
    pub fn int(&mut self, key: &str, default: i64) -> Result<i64> {
        self.take_with(key, default, "integer", |s| s.parse().ok(), |v| OptionValue::Int(*v))
    }

    /// Non-negative integer option that fits in `u32`.
    pub fn unsigned(&mut self, key: &str, default: u32) -> Result<u32> {
        self.take_with(
            key,
            default,
            "non-negative integer",
            |s| s.parse().ok(),
            |v| OptionValue::Int(i64::from(*v)),
        )
    }

    /// Floating point option.
    pub fn float(&mut self, key: &str, default: f64) -> Result<f64> {
        self.take_with(
            key,
            default,
            "number",
            |s| s.parse::<f64>().ok().filter(|v| v.is_finite()),
            |v| OptionValue::Float(*v),
        )
    }

    /// Boolean option: `true`/`false`, `1`/`0`, `yes`/`no`.
    pub fn boolean(&mut self, key: &str, default: bool) -> Result<bool> {
        self.take_with(
            key,
            default,
            "boolean",
            |s| match s.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => Some(true),
                "0" | "false" | "no" => Some(false),
                _ => None,
            },
            |v| OptionValue::Bool(*v),
        )
    }

    /// Rational option written as `num/den`, `num:den` or an integer.
    pub fn rational(&mut self, key: &str, default: Rational) -> Result<Rational> {
        self.take_with(
            key,
            default,
            "rational",
            |s| s.parse::<Rational>().ok(),
            |v| OptionValue::Rational(*v),
        )
    }

    /// Optional string option.
    pub fn string(&mut self, key: &str) -> Option<String> {
        let value = self.raw.remove(key)?;
        self.applied.insert(key.to_string(), OptionValue::Str(value.clone()));
        Some(value)
    }

    /// String option that must be present and non-empty.
    pub fn required_string(&mut self, key: &str) -> Result<String> {
        match self.string(key) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(PipelineError::config(format!(
                "stage {} needs option {}",
                self.stage, key
            ))),
        }
    }

    /// Option parsed through `FromStr`, for format and mode enums.
    pub fn parsed<T>(&mut self, key: &str, default: T, expected: &'static str) -> Result<T>
    where
        T: FromStr + fmt::Display,
    {
        self.take_with(
            key,
            default,
            expected,
            |s| s.parse().ok(),
            |v| OptionValue::Str(v.to_string()),
        )
    }

    /// Finish parsing: warn about unused keys and return the applied values.
    pub fn finish(self) -> BTreeMap<String, OptionValue> {
        for (key, value) in &self.raw {
            warn!(stage = %self.stage, key = %key, value = %value, "ignoring unknown stage option");
        }
        self.applied
    }
}
