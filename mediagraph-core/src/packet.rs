//! Encoded media packets.

use crate::timestamp::NO_PTS;
use bitflags::bitflags;

bitflags! {
    /// Flags for packet properties.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PacketFlags: u32 {
        /// This packet contains a keyframe.
        const KEYFRAME = 0x0001;
        /// Packet data is corrupted.
        const CORRUPT = 0x0002;
    }
}

/// An encoded media packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// The packet data.
    pub data: Vec<u8>,
    /// Presentation timestamp.
    pub pts: i64,
    /// Decode timestamp.
    pub dts: i64,
    /// Duration in the packet's time base, 0 when unknown.
    pub duration: i64,
    /// Packet flags.
    pub flags: PacketFlags,
}

impl Packet {
    /// Create a new packet with undefined timestamps.
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            pts: NO_PTS,
            dts: NO_PTS,
            duration: 0,
            flags: PacketFlags::empty(),
        }
    }

    /// Set presentation and decode timestamps.
    #[must_use]
    pub fn with_timestamps(mut self, pts: i64, dts: i64) -> Self {
        self.pts = pts;
        self.dts = dts;
        self
    }

    /// Check if this is a keyframe.
    pub fn is_keyframe(&self) -> bool {
        self.flags.contains(PacketFlags::KEYFRAME)
    }

    /// Get the packet size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Check if the packet is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_packet_is_undefined() {
        let pkt = Packet::new(vec![1, 2, 3]);
        assert_eq!(pkt.pts, NO_PTS);
        assert_eq!(pkt.size(), 3);
        assert!(!pkt.is_keyframe());
    }

    #[test]
    fn test_keyframe_flag() {
        let mut pkt = Packet::new(Vec::new()).with_timestamps(10, 8);
        pkt.flags |= PacketFlags::KEYFRAME;
        assert!(pkt.is_keyframe());
        assert!(pkt.is_empty());
        assert_eq!((pkt.pts, pkt.dts), (10, 8));
    }
}
