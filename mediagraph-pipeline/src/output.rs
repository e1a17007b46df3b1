//! Records emitted back to the controller.
//!
//! Every sink writes through one [`SharedOutput`]. The channel behind it is
//! locked once per record, so records from concurrent branches never
//! interleave.

use crate::Result;
use mediagraph_core::Rational;
use parking_lot::Mutex;
use serde::Serialize;
use std::io::{self, Write};
use std::sync::Arc;

/// Audio stream description attached to an output frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioHeader {
    /// Codec name, `raw` for unencoded output.
    pub codec: String,
    pub profile: i32,
    pub level: i32,
    pub sample_rate: u32,
    pub sample_format: String,
    pub channel_layout: String,
    pub extradata: Vec<u8>,
}

/// Video stream description attached to an output frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoHeader {
    /// Codec name, `raw` for unencoded output.
    pub codec: String,
    pub profile: i32,
    pub level: i32,
    pub keyframe: bool,
    pub interlaced: bool,
    pub width: u32,
    pub height: u32,
    pub pixel_format: String,
    pub pixel_aspect_ratio: Rational,
    /// Frames per second, when the codec declares a time base.
    pub frame_rate: Option<Rational>,
    pub extradata: Vec<u8>,
}

/// Type-specific header.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaHeader {
    Audio(AudioHeader),
    Video(VideoHeader),
}

/// One emitted frame or packet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputFrame {
    /// Output pin the sink was configured with.
    pub pin: String,
    pub stream_id: i64,
    /// Caller metadata round-tripped from the matching input unit.
    pub info: Vec<u8>,
    /// Timestamps in 90 kHz units.
    pub pts: i64,
    pub dts: i64,
    pub duration: i64,
    /// Detection flags raised on the way through the graph.
    pub flags: u32,
    pub payload: Vec<u8>,
    pub header: MediaHeader,
}

/// Acknowledgements written after a call completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DoneKind {
    FrameDone,
    FlushDone,
}

/// Everything a session writes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputRecord {
    OutputFrame(OutputFrame),
    Done(DoneKind),
}

/// Destination for output records.
pub trait OutputChannel: Send {
    /// Write one record completely.
    fn write(&mut self, record: &OutputRecord) -> Result<()>;
}

/// Output channel shared by every sink in a graph.
#[derive(Clone)]
pub struct SharedOutput {
    channel: Arc<Mutex<Box<dyn OutputChannel>>>,
}

impl SharedOutput {
    pub fn new(channel: impl OutputChannel + 'static) -> Self {
        Self {
            channel: Arc::new(Mutex::new(Box::new(channel))),
        }
    }

    /// Write one record under the channel lock.
    pub fn write(&self, record: &OutputRecord) -> Result<()> {
        self.channel.lock().write(record)
    }

    pub fn write_frame(&self, frame: OutputFrame) -> Result<()> {
        self.write(&OutputRecord::OutputFrame(frame))
    }

    pub fn write_done(&self, kind: DoneKind) -> Result<()> {
        self.write(&OutputRecord::Done(kind))
    }
}

impl std::fmt::Debug for SharedOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedOutput").finish_non_exhaustive()
    }
}

/// Collects records in memory. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryChannel {
    records: Arc<Mutex<Vec<OutputRecord>>>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record written so far.
    pub fn records(&self) -> Vec<OutputRecord> {
        self.records.lock().clone()
    }

    /// Only the output frames, in write order.
    pub fn frames(&self) -> Vec<OutputFrame> {
        self.records
            .lock()
            .iter()
            .filter_map(|r| match r {
                OutputRecord::OutputFrame(f) => Some(f.clone()),
                OutputRecord::Done(_) => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl OutputChannel for MemoryChannel {
    fn write(&mut self, record: &OutputRecord) -> Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

/// Writes each record as one line of JSON.
pub struct JsonLinesChannel<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinesChannel<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> OutputChannel for JsonLinesChannel<W> {
    fn write(&mut self, record: &OutputRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record).map_err(io::Error::from)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio_frame() -> OutputFrame {
        OutputFrame {
            pin: "audio".into(),
            stream_id: 1,
            info: vec![7],
            pts: 900,
            dts: 900,
            duration: 0,
            flags: 1,
            payload: vec![0, 1],
            header: MediaHeader::Audio(AudioHeader {
                codec: "raw".into(),
                profile: -1,
                level: -1,
                sample_rate: 48000,
                sample_format: "s16".into(),
                channel_layout: "stereo".into(),
                extradata: Vec::new(),
            }),
        }
    }

    #[test]
    fn test_json_lines() {
        let mut channel = JsonLinesChannel::new(Vec::new());
        channel.write(&OutputRecord::OutputFrame(audio_frame())).unwrap();
        channel.write(&OutputRecord::Done(DoneKind::FlushDone)).unwrap();
        let text = String::from_utf8(channel.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with(r#"{"output_frame":{"pin":"audio","stream_id":1"#));
        assert!(lines[0].contains(r#""header":{"audio":{"codec":"raw""#));
        assert_eq!(lines[1], r#"{"done":"flush_done"}"#);
    }

    #[test]
    fn test_shared_memory_channel() {
        let memory = MemoryChannel::new();
        let output = SharedOutput::new(memory.clone());
        output.write_frame(audio_frame()).unwrap();
        output.write_done(DoneKind::FrameDone).unwrap();
        assert_eq!(memory.len(), 2);
        assert_eq!(memory.frames(), vec![audio_frame()]);
        assert_eq!(memory.records()[1], OutputRecord::Done(DoneKind::FrameDone));
    }
}
