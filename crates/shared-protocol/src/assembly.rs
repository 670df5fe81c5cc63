//! Reassembles chunked video frames received out of order

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};

use crate::{ProtocolError, VideoChunk};

/// Bounds on incomplete frames held by the assembler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblerLimits {
    /// Most incomplete frames kept at once; oldest are evicted first
    pub max_pending_frames: Option<usize>,
    /// Incomplete frames untouched for longer than this are evicted
    pub max_age: Option<Duration>,
}

impl AssemblerLimits {
    /// Never evict. A frame that loses a chunk is held forever.
    pub fn unbounded() -> Self {
        Self {
            max_pending_frames: None,
            max_age: None,
        }
    }
}

impl Default for AssemblerLimits {
    fn default() -> Self {
        Self {
            max_pending_frames: Some(32),
            max_age: Some(Duration::from_secs(2)),
        }
    }
}

/// Result of storing one chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyOutcome {
    /// Stored; the frame is still missing chunks
    Pending,
    /// Every chunk arrived; payloads concatenated in index order
    Complete { frame_id: u32, data: Bytes },
    /// The chunk contradicts the frame it claims to belong to and was dropped
    Rejected(ProtocolError),
    /// A gap was found while concatenating; the buffer was discarded
    Aborted { frame_id: u32, missing_index: u16 },
}

/// Assembler counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblerStats {
    pub frames_completed: u64,
    pub frames_aborted: u64,
    pub frames_evicted: u64,
    pub chunks_rejected: u64,
}

struct FrameAssembly {
    total_chunks: u16,
    chunks: HashMap<u16, Bytes>,
    last_update: Instant,
}

/// Per-frame partial state keyed by frame id.
///
/// Owned by a single receive task; not synchronized.
pub struct FrameAssembler {
    frames: HashMap<u32, FrameAssembly>,
    limits: AssemblerLimits,
    stats: AssemblerStats,
}

impl FrameAssembler {
    pub fn new(limits: AssemblerLimits) -> Self {
        Self {
            frames: HashMap::new(),
            limits,
            stats: AssemblerStats::default(),
        }
    }

    /// Store a chunk, completing its frame if this was the last one missing
    pub fn push(&mut self, chunk: VideoChunk) -> AssemblyOutcome {
        self.push_at(chunk, Instant::now())
    }

    pub fn push_at(&mut self, chunk: VideoChunk, now: Instant) -> AssemblyOutcome {
        let header = chunk.header;
        if !header.is_in_range() {
            self.stats.chunks_rejected += 1;
            return AssemblyOutcome::Rejected(ProtocolError::InvalidChunkIndex {
                index: header.chunk_index,
                total: header.total_chunks,
            });
        }

        self.evict(now, header.frame_id);

        let entry = self
            .frames
            .entry(header.frame_id)
            .or_insert_with(|| FrameAssembly {
                total_chunks: header.total_chunks,
                chunks: HashMap::with_capacity(header.total_chunks as usize),
                last_update: now,
            });

        // the first chunk seen fixes the chunk count
        if entry.total_chunks != header.total_chunks {
            self.stats.chunks_rejected += 1;
            return AssemblyOutcome::Rejected(ProtocolError::ChunkCountMismatch {
                frame_id: header.frame_id,
                expected: entry.total_chunks,
                actual: header.total_chunks,
            });
        }

        entry.chunks.insert(header.chunk_index, chunk.payload);
        entry.last_update = now;

        if entry.chunks.len() < entry.total_chunks as usize {
            return AssemblyOutcome::Pending;
        }

        let Some(assembly) = self.frames.remove(&header.frame_id) else {
            return AssemblyOutcome::Pending;
        };

        let size = assembly.chunks.values().map(Bytes::len).sum();
        let mut data = BytesMut::with_capacity(size);
        for index in 0..assembly.total_chunks {
            match assembly.chunks.get(&index) {
                Some(payload) => data.extend_from_slice(payload),
                None => {
                    self.stats.frames_aborted += 1;
                    return AssemblyOutcome::Aborted {
                        frame_id: header.frame_id,
                        missing_index: index,
                    };
                }
            }
        }

        self.stats.frames_completed += 1;
        AssemblyOutcome::Complete {
            frame_id: header.frame_id,
            data: data.freeze(),
        }
    }

    /// Drop stale buffers and make room for `incoming` if it would be a new frame
    fn evict(&mut self, now: Instant, incoming: u32) {
        let before = self.frames.len();

        if let Some(max_age) = self.limits.max_age {
            self.frames
                .retain(|_, frame| now.saturating_duration_since(frame.last_update) <= max_age);
        }

        if let Some(max_pending) = self.limits.max_pending_frames {
            if !self.frames.contains_key(&incoming) {
                while self.frames.len() >= max_pending.max(1) {
                    let oldest = self
                        .frames
                        .iter()
                        .min_by_key(|(_, frame)| frame.last_update)
                        .map(|(id, _)| *id);
                    match oldest {
                        Some(id) => {
                            self.frames.remove(&id);
                        }
                        None => break,
                    }
                }
            }
        }

        self.stats.frames_evicted += (before - self.frames.len()) as u64;
    }

    /// Incomplete frames currently held
    pub fn pending_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn is_pending(&self, frame_id: u32) -> bool {
        self.frames.contains_key(&frame_id)
    }

    pub fn stats(&self) -> &AssemblerStats {
        &self.stats
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new(AssemblerLimits::default())
    }
}
