//! Codec option dictionaries.
//!
//! Codecs take the keys they understand out of the dictionary while opening.
//! Anything left over afterwards is an error: a misspelt option must not be
//! silently ignored.

use crate::error::{CodecError, Result};
use std::collections::BTreeMap;
use std::str::FromStr;

/// String-to-string options handed to a codec at open time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodecOptions {
    entries: BTreeMap<String, String>,
}

impl CodecOptions {
    /// Create an empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an option, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Builder-style [`set`](Self::set).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Look at a value without consuming it.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Remove and return a raw value.
    pub fn take(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    /// Remove and parse a value.
    pub fn take_parsed<T: FromStr>(&mut self, key: &str) -> Result<Option<T>> {
        match self.entries.remove(key) {
            None => Ok(None),
            Some(value) => value.parse::<T>().map(Some).map_err(|_| CodecError::InvalidOption {
                key: key.to_string(),
                value,
            }),
        }
    }

    /// Fail if any option was not taken by `codec`.
    pub fn ensure_consumed(&self, codec: &str) -> Result<()> {
        if self.entries.is_empty() {
            return Ok(());
        }
        Err(CodecError::UnconsumedOptions {
            codec: codec.to_string(),
            keys: self.entries.keys().cloned().collect(),
        })
    }

    /// Number of options.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no options are set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<BTreeMap<String, String>> for CodecOptions {
    fn from(entries: BTreeMap<String, String>) -> Self {
        Self { entries }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CodecOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_parsed() {
        let mut opts = CodecOptions::new().with("frame_size", "960").with("delay", "two");
        assert_eq!(opts.take_parsed::<usize>("frame_size").unwrap(), Some(960));
        assert_eq!(opts.take_parsed::<usize>("missing").unwrap(), None);
        assert!(matches!(
            opts.take_parsed::<usize>("delay"),
            Err(CodecError::InvalidOption { .. })
        ));
        assert!(opts.is_empty());
    }

    #[test]
    fn test_ensure_consumed_lists_leftovers() {
        let mut opts: CodecOptions = [("b", "1"), ("a", "2"), ("flags", "+ildct")].into_iter().collect();
        opts.take("flags");
        match opts.ensure_consumed("rawvideo") {
            Err(CodecError::UnconsumedOptions { codec, keys }) => {
                assert_eq!(codec, "rawvideo");
                assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
