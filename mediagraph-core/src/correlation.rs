//! PTS-keyed correlation of caller metadata with codec output.
//!
//! Codecs may delay or reorder frames, so metadata cannot be handed over in
//! FIFO order. A stage stashes each frame's [`FrameInfo`] under the timestamp
//! it gives the codec and looks it up again when output with that timestamp
//! appears.

use crate::error::CorrelationError;
use crate::frame::FrameInfo;
use std::collections::VecDeque;
use tracing::trace;

/// Pending metadata, in insertion order.
#[derive(Debug, Default)]
pub struct CorrelationQueue {
    entries: VecDeque<(i64, FrameInfo)>,
}

impl CorrelationQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stash metadata under `pts`.
    pub fn insert(&mut self, pts: i64, info: FrameInfo) {
        self.entries.push_back((pts, info));
    }

    /// Remove and return the first entry whose pts equals `pts`.
    ///
    /// With `drop_stale`, entries with a smaller pts met before the match are
    /// discarded; they belong to frames the codec never produced. A missing
    /// entry is an integrity failure for the caller.
    pub fn match_and_remove(
        &mut self,
        pts: i64,
        drop_stale: bool,
    ) -> std::result::Result<FrameInfo, CorrelationError> {
        let mut index = 0;
        while index < self.entries.len() {
            let entry_pts = self.entries[index].0;
            if entry_pts == pts {
                if let Some((_, info)) = self.entries.remove(index) {
                    return Ok(info);
                }
                break;
            }
            if drop_stale && entry_pts < pts {
                self.entries.remove(index);
                trace!(stale = entry_pts, requested = pts, "dropped stale frame info");
                continue;
            }
            index += 1;
        }
        Err(CorrelationError::NotFound { pts })
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no entries are pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Discard every pending entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
