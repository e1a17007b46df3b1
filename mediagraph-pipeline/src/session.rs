//! Port bridge between a controller and one graph.
//!
//! A [`Session`] owns the graph built from a description. The controller
//! feeds it input units one at a time and finally asks it to flush. In sync
//! mode every unit is acknowledged with a `frame_done` record once all work
//! for it has finished; a flush is always acknowledged with `flush_done`.

use crate::builder::{Graph, GraphBuilder, Topology};
use crate::config::SessionConfig;
use crate::graph::GraphSpec;
use crate::output::{DoneKind, SharedOutput};
use crate::registry::StageRegistry;
use crate::stage::{InputUnit, StageKind, UnitMetadata};
use crate::{PipelineError, Result};
use mediagraph_codec::CodecLibrary;
use mediagraph_core::{FrameInfo, TimeBase};
use std::sync::Arc;
use tracing::{debug, error, info};

/// A running graph.
pub struct Session {
    config: SessionConfig,
    graph: Graph,
    output: SharedOutput,
    units: u64,
}

impl Session {
    /// Build the graph and get ready for input.
    pub fn start(
        config: SessionConfig,
        spec: &GraphSpec,
        registry: &StageRegistry,
        codecs: Arc<dyn CodecLibrary>,
        output: SharedOutput,
    ) -> Result<Self> {
        let graph = GraphBuilder::new(registry, codecs, output.clone(), config.mode).build(spec)?;
        if graph.topology().kind != StageKind::Source {
            return Err(PipelineError::config(format!(
                "graph root {} is a {} stage, input needs a source",
                graph.topology().name,
                graph.topology().kind
            )));
        }
        info!(mode = %config.mode, root = %spec.name, "session started");
        Ok(Self {
            config,
            graph,
            output,
            units: 0,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn topology(&self) -> &Topology {
        self.graph.topology()
    }

    /// Number of input units processed so far.
    pub fn units(&self) -> u64 {
        self.units
    }

    /// Deliver one input unit to the root stage.
    ///
    /// Timestamps are given in the configured input time base.
    pub fn process_frame(&mut self, metadata: UnitMetadata, info: Vec<u8>, payload: Vec<u8>) -> Result<()> {
        let input_time_base = self.config.input_time_base;
        let unit = InputUnit {
            metadata: UnitMetadata {
                pts: input_time_base.convert(metadata.pts, TimeBase::MPEG),
                dts: input_time_base.convert(metadata.dts, TimeBase::MPEG),
            },
            info: FrameInfo::new(info),
            payload,
        };
        debug!(pts = unit.metadata.pts, bytes = unit.payload.len(), "input unit");

        if let Err(e) = self.graph.accept(unit) {
            error!(error = %e, unit = self.units, "processing failed");
            return Err(e);
        }
        self.units += 1;
        if self.config.mode.is_sync() {
            self.output.write_done(DoneKind::FrameDone)?;
        }
        Ok(())
    }

    /// Drain every stage and acknowledge.
    pub fn flush(&mut self) -> Result<()> {
        if let Err(e) = self.graph.flush() {
            error!(error = %e, "flush failed");
            return Err(e);
        }
        info!(units = self.units, "session flushed");
        self.output.write_done(DoneKind::FlushDone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatchMode;
    use crate::output::{MemoryChannel, OutputRecord};
    use mediagraph_codec::BuiltinCodecs;

    fn pcm_graph() -> GraphSpec {
        GraphSpec::new("raw audio input")
            .with_option("sample_rate", 8000)
            .with_option("channel_layout", "mono")
            .with_child(GraphSpec::new("raw audio output").with_option("pin_name", "pcm"))
    }

    fn start(config: SessionConfig, spec: &GraphSpec, channel: &MemoryChannel) -> Result<Session> {
        Session::start(
            config,
            spec,
            &StageRegistry::builtin(),
            Arc::new(BuiltinCodecs::new()),
            SharedOutput::new(channel.clone()),
        )
    }

    #[test]
    fn test_sync_mode_acknowledges_each_unit() {
        let channel = MemoryChannel::new();
        let mut session = start(SessionConfig::default(), &pcm_graph(), &channel).unwrap();
        session.process_frame(UnitMetadata::at(0), vec![1], vec![0; 4]).unwrap();
        session.flush().unwrap();

        let records = channel.records();
        assert_eq!(records.len(), 3);
        assert!(matches!(records[0], OutputRecord::OutputFrame(_)));
        assert_eq!(records[1], OutputRecord::Done(DoneKind::FrameDone));
        assert_eq!(records[2], OutputRecord::Done(DoneKind::FlushDone));
        assert_eq!(session.units(), 1);
    }

    #[test]
    fn test_async_mode_only_acknowledges_flush() {
        let channel = MemoryChannel::new();
        let config = SessionConfig::default().with_mode(DispatchMode::Async);
        let mut session = start(config, &pcm_graph(), &channel).unwrap();
        session.process_frame(UnitMetadata::at(0), Vec::new(), vec![0; 4]).unwrap();
        session.flush().unwrap();

        let done: Vec<_> = channel
            .records()
            .into_iter()
            .filter(|r| matches!(r, OutputRecord::Done(_)))
            .collect();
        assert_eq!(done, vec![OutputRecord::Done(DoneKind::FlushDone)]);
    }

    #[test]
    fn test_input_time_base_converted() {
        let channel = MemoryChannel::new();
        let config = SessionConfig::default().with_input_time_base(TimeBase::new(1, 1000));
        let mut session = start(config, &pcm_graph(), &channel).unwrap();
        session.process_frame(UnitMetadata::at(40), Vec::new(), vec![0; 2]).unwrap();
        assert_eq!(channel.frames()[0].pts, 3600);
    }

    #[test]
    fn test_root_must_be_source() {
        let channel = MemoryChannel::new();
        let spec = GraphSpec::new("raw audio output").with_option("pin_name", "x");
        assert!(matches!(
            start(SessionConfig::default(), &spec, &channel),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_failed_unit_is_not_acknowledged() {
        let channel = MemoryChannel::new();
        let mut session = start(SessionConfig::default(), &pcm_graph(), &channel).unwrap();
        assert!(session.process_frame(UnitMetadata::at(0), Vec::new(), vec![0; 3]).is_err());
        assert!(channel.is_empty());
    }
}
