//! Video chunk datagrams
//!
//! ```text
//! +---------------+-------------------+------------------+-----------------+
//! | frame_id u32  | total_chunks u16  | chunk_index u16  | payload         |
//! | little-endian | little-endian     | little-endian    | <= max size     |
//! +---------------+-------------------+------------------+-----------------+
//! ```

use std::sync::atomic::{AtomicU32, Ordering};

use bytes::{BufMut, Bytes, BytesMut};

use crate::{ProtocolError, ProtocolResult};

/// Fixed chunk header size in bytes
pub const CHUNK_HEADER_LEN: usize = 8;

/// Largest UDP payload over IPv4
pub const MAX_UDP_PAYLOAD: usize = 65507;

/// Largest image payload that still fits one datagram
pub const MAX_CHUNK_PAYLOAD: usize = MAX_UDP_PAYLOAD - CHUNK_HEADER_LEN;

/// Default image bytes per chunk
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 60_000;

/// Chunk header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkHeader {
    pub frame_id: u32,
    pub total_chunks: u16,
    pub chunk_index: u16,
}

impl ChunkHeader {
    pub fn to_bytes(&self) -> [u8; CHUNK_HEADER_LEN] {
        let mut out = [0u8; CHUNK_HEADER_LEN];
        out[0..4].copy_from_slice(&self.frame_id.to_le_bytes());
        out[4..6].copy_from_slice(&self.total_chunks.to_le_bytes());
        out[6..8].copy_from_slice(&self.chunk_index.to_le_bytes());
        out
    }

    pub fn parse(data: &[u8]) -> ProtocolResult<Self> {
        if data.len() < CHUNK_HEADER_LEN {
            return Err(ProtocolError::ChunkTooShort(data.len()));
        }
        Ok(Self {
            frame_id: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            total_chunks: u16::from_le_bytes([data[4], data[5]]),
            chunk_index: u16::from_le_bytes([data[6], data[7]]),
        })
    }

    /// `chunk_index < total_chunks`
    pub fn is_in_range(&self) -> bool {
        self.chunk_index < self.total_chunks
    }
}

/// One chunk datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoChunk {
    pub header: ChunkHeader,
    pub payload: Bytes,
}

impl VideoChunk {
    /// Split a received datagram into header and payload without copying
    pub fn from_datagram(datagram: Bytes) -> ProtocolResult<Self> {
        let header = ChunkHeader::parse(&datagram)?;
        Ok(Self {
            header,
            payload: datagram.slice(CHUNK_HEADER_LEN..),
        })
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(CHUNK_HEADER_LEN + self.payload.len());
        out.put_slice(&self.header.to_bytes());
        out.put_slice(&self.payload);
        out.freeze()
    }
}

/// Number of chunks needed for `len` bytes
pub fn chunk_count(len: usize, max_chunk_size: usize) -> usize {
    len.div_ceil(max_chunk_size)
}

/// Split an encoded image into chunk datagrams, in index order
pub fn fragment_frame(
    frame_id: u32,
    image: &[u8],
    max_chunk_size: usize,
) -> ProtocolResult<Vec<Bytes>> {
    if max_chunk_size == 0 || max_chunk_size > MAX_CHUNK_PAYLOAD {
        return Err(ProtocolError::InvalidChunkSize {
            size: max_chunk_size,
            max: MAX_CHUNK_PAYLOAD,
        });
    }
    if image.is_empty() {
        return Err(ProtocolError::EmptyFrame);
    }

    let total = chunk_count(image.len(), max_chunk_size);
    let total_chunks =
        u16::try_from(total).map_err(|_| ProtocolError::TooManyChunks(total))?;

    Ok(image
        .chunks(max_chunk_size)
        .enumerate()
        .map(|(index, payload)| {
            VideoChunk {
                header: ChunkHeader {
                    frame_id,
                    total_chunks,
                    chunk_index: index as u16,
                },
                payload: Bytes::copy_from_slice(payload),
            }
            .to_bytes()
        })
        .collect())
}

/// Hands out frame ids, wrapping from `u32::MAX` back to 0.
///
/// After a wrap a new frame can share its id with a stale buffer still held
/// by a receiver. The two are not told apart; chunks of the new frame that
/// disagree on `total_chunks` are dropped and the stale buffer is eventually
/// evicted by age.
#[derive(Debug)]
pub struct FrameIdGenerator {
    next: AtomicU32,
}

impl FrameIdGenerator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u32) -> Self {
        Self {
            next: AtomicU32::new(first),
        }
    }

    pub fn next_id(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for FrameIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_is_little_endian() {
        let header = ChunkHeader {
            frame_id: 0x0403_0201,
            total_chunks: 0x0605,
            chunk_index: 0x0807,
        };
        assert_eq!(header.to_bytes(), [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(ChunkHeader::parse(&header.to_bytes()).unwrap(), header);
    }

    #[test]
    fn test_short_datagram_rejected() {
        assert_eq!(
            VideoChunk::from_datagram(Bytes::from_static(&[1, 2, 3])),
            Err(ProtocolError::ChunkTooShort(3))
        );
    }

    #[test]
    fn test_fragment_sizes() {
        let image: Vec<u8> = (0..10).collect();
        let chunks = fragment_frame(7, &image, 4).unwrap();
        assert_eq!(chunks.len(), 3);

        let parsed: Vec<VideoChunk> = chunks
            .into_iter()
            .map(|c| VideoChunk::from_datagram(c).unwrap())
            .collect();
        let sizes: Vec<usize> = parsed.iter().map(|c| c.payload.len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        for (i, chunk) in parsed.iter().enumerate() {
            assert_eq!(chunk.header.frame_id, 7);
            assert_eq!(chunk.header.total_chunks, 3);
            assert_eq!(chunk.header.chunk_index as usize, i);
        }
        assert_eq!(&parsed[2].payload[..], &[8, 9]);
    }

    #[test]
    fn test_fragment_limits() {
        assert_eq!(
            fragment_frame(1, &[], 10),
            Err(ProtocolError::EmptyFrame)
        );
        assert!(matches!(
            fragment_frame(1, &[1], 0),
            Err(ProtocolError::InvalidChunkSize { .. })
        ));
        assert!(matches!(
            fragment_frame(1, &[1], MAX_CHUNK_PAYLOAD + 1),
            Err(ProtocolError::InvalidChunkSize { .. })
        ));
        let image = vec![0u8; 65_536];
        assert_eq!(
            fragment_frame(1, &image, 1),
            Err(ProtocolError::TooManyChunks(65_536))
        );
    }

    #[test]
    fn test_frame_id_wraps() {
        let ids = FrameIdGenerator::starting_at(u32::MAX - 1);
        assert_eq!(ids.next_id(), u32::MAX - 1);
        assert_eq!(ids.next_id(), u32::MAX);
        assert_eq!(ids.next_id(), 0);
        assert_eq!(ids.next_id(), 1);
    }

    #[test]
    fn test_frame_ids_start_at_one() {
        assert_eq!(FrameIdGenerator::new().next_id(), 1);
    }
}
