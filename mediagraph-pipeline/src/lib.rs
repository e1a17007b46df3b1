//! Tree-shaped media processing graphs.
//!
//! A graph is built from a JSON description ([`GraphSpec`]) against a
//! [`StageRegistry`]. Every node is a [`Stage`]: sources turn input units
//! into frames, transforms change them, fan-outs replicate them to branches
//! on worker threads and sinks write [`OutputRecord`]s to a shared channel.
//!
//! ```no_run
//! use mediagraph_codec::BuiltinCodecs;
//! use mediagraph_pipeline::{
//!     GraphSpec, MemoryChannel, Session, SessionConfig, SharedOutput, StageRegistry, UnitMetadata,
//! };
//! use std::sync::Arc;
//!
//! let spec = GraphSpec::new("raw audio input")
//!     .with_child(GraphSpec::new("raw audio output").with_option("pin_name", "audio"));
//! let channel = MemoryChannel::new();
//! let mut session = Session::start(
//!     SessionConfig::default(),
//!     &spec,
//!     &StageRegistry::builtin(),
//!     Arc::new(BuiltinCodecs::new()),
//!     SharedOutput::new(channel.clone()),
//! )?;
//! session.process_frame(UnitMetadata::at(0), Vec::new(), vec![0; 4])?;
//! session.flush()?;
//! # Ok::<(), mediagraph_pipeline::PipelineError>(())
//! ```

mod builder;
mod config;
mod error;
mod fanout;
mod graph;
mod options;
mod output;
mod registry;
mod session;
mod stage;
pub mod stages;

pub use builder::{Graph, GraphBuilder, Topology};
pub use config::{DispatchMode, SessionConfig};
pub use error::{PipelineError, Result};
pub use fanout::{next_branch_id, AsyncParallel, SyncParallel};
pub use graph::GraphSpec;
pub use options::{OptionValue, StageOptions};
pub use output::{
    AudioHeader, DoneKind, JsonLinesChannel, MediaHeader, MemoryChannel, OutputChannel, OutputFrame,
    OutputRecord, SharedOutput, VideoHeader,
};
pub use registry::{StageDescriptor, StageFactory, StageRegistry};
pub use session::Session;
pub use stage::{Downstream, InputUnit, Stage, StageContext, StageKind, UnitMetadata};
