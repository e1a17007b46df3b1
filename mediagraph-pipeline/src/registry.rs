//! Name-to-factory registry of stage implementations.

use crate::fanout::{AsyncParallel, SyncParallel};
use crate::options::StageOptions;
use crate::stage::{Stage, StageKind};
use crate::stages;
use crate::Result;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Builds a stage from its options.
pub type StageFactory = Arc<dyn Fn(&mut StageOptions) -> Result<Box<dyn Stage>> + Send + Sync>;

/// A registered stage implementation.
#[derive(Clone)]
pub struct StageDescriptor {
    pub name: String,
    pub kind: StageKind,
    pub factory: StageFactory,
}

impl fmt::Debug for StageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Stage implementations by registry name.
#[derive(Debug, Clone, Default)]
pub struct StageRegistry {
    stages: BTreeMap<String, StageDescriptor>,
}

impl StageRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in stage.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(SyncParallel::NAME, StageKind::Fanout, |_| Ok(Box::new(SyncParallel::new())));
        registry.register(AsyncParallel::NAME, StageKind::Fanout, |_| Ok(Box::new(AsyncParallel::new())));
        stages::register_builtin(&mut registry);
        registry
    }

    /// Register a stage, replacing any previous one with the same name.
    pub fn register<F>(&mut self, name: impl Into<String>, kind: StageKind, factory: F)
    where
        F: Fn(&mut StageOptions) -> Result<Box<dyn Stage>> + Send + Sync + 'static,
    {
        let name = name.into();
        self.stages.insert(
            name.clone(),
            StageDescriptor {
                name,
                kind,
                factory: Arc::new(factory),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&StageDescriptor> {
        self.stages.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stages.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stages.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalogue() {
        let registry = StageRegistry::builtin();
        for name in [
            "raw audio input",
            "encoded audio input",
            "raw video input",
            "encoded video input",
            "audio resampler",
            "video rescaler",
            "effects processor",
            "stereo splitter",
            "silence detect",
            "black detect",
            "raw audio output",
            "raw video output",
            "encoded audio output",
            "encoded video output",
            "parallel",
            "async_parallel",
        ] {
            assert!(registry.contains(name), "missing {}", name);
        }
        assert_eq!(registry.len(), 16);
        assert_eq!(registry.get("parallel").unwrap().kind, StageKind::Fanout);
        assert_eq!(registry.get("black detect").unwrap().kind, StageKind::Transform);
    }

    #[test]
    fn test_factory_builds_stage() {
        let registry = StageRegistry::builtin();
        let descriptor = registry.get("silence detect").unwrap();
        let mut options = StageOptions::new("silence detect", [("noise".to_string(), "0.5".to_string())].into());
        let stage = (descriptor.factory)(&mut options).unwrap();
        assert_eq!(stage.name(), "silence detect");
        assert_eq!(stage.kind(), StageKind::Transform);
        assert!(registry.get("video generator").is_none());
    }
}
