//! Serialized graph descriptions.
//!
//! A description is a JSON tree:
//!
//! ```json
//! {
//!   "name": "raw audio input",
//!   "options": {"sample_rate": "48000", "channel_layout": "stereo", "sample_format": "s16"},
//!   "children": [
//!     {"name": "raw audio output", "options": {"pin_name": "audio"}}
//!   ]
//! }
//! ```
//!
//! `options`, `codec_options` and `children` may be omitted.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One node of a graph description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSpec {
    /// Registry name of the stage.
    pub name: String,
    /// Stage options, parsed into typed fields by the stage factory.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    /// Options handed verbatim to the codec library.
    #[serde(default)]
    pub codec_options: BTreeMap<String, String>,
    /// Downstream stages, in dispatch order.
    #[serde(default)]
    pub children: Vec<GraphSpec>,
}

impl GraphSpec {
    /// Create a node with no options or children.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Parse a description from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Parse a description from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Add a stage option.
    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.options.insert(key.into(), value.to_string());
        self
    }

    /// Add a codec option.
    #[must_use]
    pub fn with_codec_option(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.codec_options.insert(key.into(), value.to_string());
        self
    }

    /// Append a child.
    #[must_use]
    pub fn with_child(mut self, child: GraphSpec) -> Self {
        self.children.push(child);
        self
    }

    /// Longest root-to-leaf path, counting nodes.
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(GraphSpec::depth).max().unwrap_or(0)
    }

    /// Total number of nodes.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(GraphSpec::node_count).sum::<usize>()
    }
}
