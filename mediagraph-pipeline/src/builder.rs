//! Turns a [`GraphSpec`] into a live stage tree.
//!
//! Children are built and initialised before their parent so a fan-out
//! knows its degree when its own `init` runs.

use crate::config::DispatchMode;
use crate::graph::GraphSpec;
use crate::options::{OptionValue, StageOptions};
use crate::output::SharedOutput;
use crate::registry::StageRegistry;
use crate::stage::{Downstream, InputUnit, Stage, StageContext, StageKind};
use crate::{PipelineError, Result};
use mediagraph_codec::{CodecLibrary, CodecOptions};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Shape of a built graph, for inspection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Topology {
    pub name: String,
    pub kind: StageKind,
    /// Option values the stage factory applied, defaults included.
    pub options: BTreeMap<String, OptionValue>,
    pub children: Vec<Topology>,
}

impl Topology {
    /// Longest root-to-leaf path, counting nodes.
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(Topology::depth).max().unwrap_or(0)
    }

    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Topology::node_count).sum::<usize>()
    }

    /// First node with `name`, depth first.
    pub fn find(&self, name: &str) -> Option<&Topology> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }
}

/// A built stage tree.
pub struct Graph {
    root: Box<dyn Stage>,
    topology: Topology,
}

impl Graph {
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Deliver an external unit to the root.
    pub fn accept(&mut self, unit: InputUnit) -> Result<()> {
        self.root.accept(unit)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.root.flush()
    }
}

/// Builds graphs against a registry and codec library.
pub struct GraphBuilder<'a> {
    registry: &'a StageRegistry,
    codecs: Arc<dyn CodecLibrary>,
    output: SharedOutput,
    mode: DispatchMode,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(
        registry: &'a StageRegistry,
        codecs: Arc<dyn CodecLibrary>,
        output: SharedOutput,
        mode: DispatchMode,
    ) -> Self {
        Self {
            registry,
            codecs,
            output,
            mode,
        }
    }

    /// Build and initialise the whole tree.
    pub fn build(&self, spec: &GraphSpec) -> Result<Graph> {
        let (root, topology) = self.build_node(spec)?;
        info!(
            root = %topology.name,
            stages = topology.node_count(),
            depth = topology.depth(),
            "graph built"
        );
        Ok(Graph { root, topology })
    }

    fn build_node(&self, spec: &GraphSpec) -> Result<(Box<dyn Stage>, Topology)> {
        let descriptor = self
            .registry
            .get(&spec.name)
            .ok_or_else(|| PipelineError::UnknownStage(spec.name.clone()))?;

        let mut options = StageOptions::new(&spec.name, spec.options.clone());
        let mut stage = (descriptor.factory)(&mut options)?;
        let applied = options.finish();

        let mut children = Vec::with_capacity(spec.children.len());
        let mut child_topologies = Vec::with_capacity(spec.children.len());
        for child in &spec.children {
            let (stage, topology) = self.build_node(child)?;
            children.push(stage);
            child_topologies.push(topology);
        }

        stage.init(StageContext {
            downstream: Downstream::new(children),
            codec_options: CodecOptions::from(spec.codec_options.clone()),
            output: self.output.clone(),
            mode: self.mode,
            codecs: self.codecs.clone(),
        })?;
        debug!(stage = %spec.name, kind = %descriptor.kind, children = spec.children.len(), "stage initialised");

        Ok((
            stage,
            Topology {
                name: spec.name.clone(),
                kind: descriptor.kind,
                options: applied,
                children: child_topologies,
            },
        ))
    }
}
