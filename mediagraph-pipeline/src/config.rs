//! Session configuration.

use mediagraph_core::TimeBase;
use serde::Deserialize;
use std::fmt;

/// How the caller observes fan-out work.
///
/// Fixed when the session starts and handed read-only to every stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum DispatchMode {
    /// Every call returns only after all downstream work for it is done.
    #[default]
    Sync,
    /// Asynchronous fan-outs return as soon as work is queued.
    Async,
}

impl DispatchMode {
    /// Anything starting with `async` selects [`DispatchMode::Async`].
    pub fn parse(mode: &str) -> Self {
        if mode.starts_with("async") {
            Self::Async
        } else {
            Self::Sync
        }
    }

    pub fn is_sync(&self) -> bool {
        matches!(self, Self::Sync)
    }
}

impl From<String> for DispatchMode {
    fn from(mode: String) -> Self {
        Self::parse(&mode)
    }
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync => write!(f, "sync"),
            Self::Async => write!(f, "async"),
        }
    }
}

/// Session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Dispatch mode for the whole graph.
    pub mode: DispatchMode,
    /// Time base of the timestamps in input unit metadata.
    pub input_time_base: TimeBase,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: DispatchMode::Sync,
            input_time_base: TimeBase::MPEG,
        }
    }
}

impl SessionConfig {
    /// Set the dispatch mode.
    pub fn with_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the time base of input timestamps.
    pub fn with_input_time_base(mut self, time_base: TimeBase) -> Self {
        self.input_time_base = time_base;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!(DispatchMode::parse("async"), DispatchMode::Async);
        assert_eq!(DispatchMode::parse("async_observed"), DispatchMode::Async);
        assert_eq!(DispatchMode::parse("sync"), DispatchMode::Sync);
        assert_eq!(DispatchMode::parse("anything"), DispatchMode::Sync);
        assert_eq!(DispatchMode::parse("Async"), DispatchMode::Sync);
    }

    #[test]
    fn test_config_from_json() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"mode": "async", "input_time_base": {"num": 1, "den": 1000}}"#).unwrap();
        assert_eq!(config.mode, DispatchMode::Async);
        assert_eq!(config.input_time_base, TimeBase::new(1, 1000));

        let config: SessionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SessionConfig::default());
    }
}
