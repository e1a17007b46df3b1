//! # Mediagraph Core
//!
//! Core types shared by every mediagraph crate:
//! - Error handling types
//! - Rational numbers and time bases
//! - Audio and video frame buffers with their opaque per-frame metadata
//! - Encoded packets
//! - A blocking FIFO work queue and the PTS-keyed correlation queue

pub mod error;
pub mod rational;
pub mod timestamp;
pub mod sample;
pub mod frame;
pub mod packet;
pub mod queue;
pub mod correlation;

pub use correlation::CorrelationQueue;
pub use error::{CorrelationError, Error, Result};
pub use frame::{AudioBuffer, Frame, FrameData, FrameInfo, InfoFlags, MediaType, PixelFormat, VideoBuffer};
pub use packet::{Packet, PacketFlags};
pub use queue::WorkQueue;
pub use rational::Rational;
pub use sample::{ChannelLayout, SampleFormat};
pub use timestamp::{TimeBase, NO_PTS};
