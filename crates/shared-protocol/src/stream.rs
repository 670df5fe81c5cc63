//! Stream framing: plain text frames and `FILE|` file frames on one connection
//!
//! ```text
//! text frame:  <raw utf-8 bytes>
//! file frame:  FILE|<name>|<decimal size>\n<exactly size bytes>
//! ```
//!
//! A text frame has no delimiter, so every physical read that does not start
//! with the file signature is surfaced as one text frame. A text message and
//! a file header arriving in the same read are therefore reported as text.

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::{ProtocolError, ProtocolResult};

/// Leading bytes that mark the start of a file frame
pub const FILE_SIGNATURE: &[u8] = b"FILE|";

/// Header terminator
pub const HEADER_TERMINATOR: u8 = b'\n';

/// Longest header accepted while buffering a split header
pub const MAX_FILE_HEADER_LEN: usize = 1024;

/// Default cap on the declared size of an incoming file (512 MiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 512 * 1024 * 1024;

/// Parsed file frame header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub file_name: String,
    pub file_size: u64,
}

impl FileHeader {
    /// Build a header for an outgoing file, rejecting names that would break framing
    pub fn new(file_name: impl Into<String>, file_size: u64) -> ProtocolResult<Self> {
        let file_name = file_name.into();
        if file_name.contains('|') || file_name.contains('\n') {
            return Err(ProtocolError::InvalidFileName(file_name));
        }
        Ok(Self {
            file_name,
            file_size,
        })
    }

    /// Encode as `FILE|<name>|<size>\n`
    pub fn encode(&self) -> Bytes {
        Bytes::from(format!("FILE|{}|{}\n", self.file_name, self.file_size))
    }

    /// Parse the header line (terminator already stripped).
    ///
    /// Requires at least three `|`-separated fields; extra fields are ignored.
    pub fn parse(line: &[u8]) -> ProtocolResult<Self> {
        let text = String::from_utf8_lossy(line);
        let parts: Vec<&str> = text.split('|').collect();
        if parts.len() < 3 {
            return Err(ProtocolError::MalformedHeader(text.into_owned()));
        }

        let file_size = parts[2]
            .trim()
            .parse::<u64>()
            .map_err(|_| ProtocolError::InvalidFileSize(parts[2].to_string()))?;

        Ok(Self {
            file_name: parts[1].to_string(),
            file_size,
        })
    }
}

/// Encode a text frame
pub fn encode_text(text: &str) -> Bytes {
    Bytes::copy_from_slice(text.as_bytes())
}

/// Whether a read begins a file frame
pub fn is_file_frame(read: &[u8]) -> bool {
    read.starts_with(FILE_SIGNATURE)
}

/// What to do with a file header that is not terminated within its first read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderPolicy {
    /// Report the read as malformed and drop it
    #[default]
    Discard,
    /// Keep the partial header and complete it from later reads
    Buffer,
}

/// Observable decoder state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecoderState {
    Idle,
    AwaitingHeader,
    AwaitingFileBody,
    Closed,
}

/// Event produced by the stream decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// One complete text frame
    Text(String),
    /// A complete file frame
    File { name: String, data: Bytes },
    /// The peer closed before the declared file length arrived
    TruncatedFile {
        name: String,
        data: Bytes,
        expected: u64,
    },
    /// Offending bytes were discarded; decoding continues
    Malformed(ProtocolError),
    /// The peer closed the connection
    Closed,
}

enum Inner {
    Idle,
    AwaitingHeader {
        buf: BytesMut,
    },
    AwaitingFileBody {
        name: String,
        expected: u64,
        body: BytesMut,
    },
    Closed,
}

/// Per-connection framing state machine.
///
/// Fed one physical read at a time. File bodies are accumulated across reads
/// as explicit state, so the caller never has to block for the remainder.
pub struct StreamDecoder {
    policy: HeaderPolicy,
    max_file_size: u64,
    inner: Inner,
}

impl StreamDecoder {
    pub fn new(policy: HeaderPolicy, max_file_size: u64) -> Self {
        Self {
            policy,
            max_file_size,
            inner: Inner::Idle,
        }
    }

    pub fn state(&self) -> DecoderState {
        match self.inner {
            Inner::Idle => DecoderState::Idle,
            Inner::AwaitingHeader { .. } => DecoderState::AwaitingHeader,
            Inner::AwaitingFileBody { .. } => DecoderState::AwaitingFileBody,
            Inner::Closed => DecoderState::Closed,
        }
    }

    /// Bytes still missing from the file body being received, if any
    pub fn bytes_remaining(&self) -> Option<u64> {
        match &self.inner {
            Inner::AwaitingFileBody { expected, body, .. } => {
                Some(expected - body.len() as u64)
            }
            _ => None,
        }
    }

    /// Process one physical read. An empty read means the peer closed.
    pub fn feed(&mut self, read: &[u8]) -> Vec<StreamEvent> {
        if read.is_empty() {
            return self.finish();
        }

        let mut events = Vec::new();
        let mut rest = read;

        while !rest.is_empty() {
            match std::mem::replace(&mut self.inner, Inner::Idle) {
                Inner::Closed => {
                    self.inner = Inner::Closed;
                    break;
                }
                Inner::AwaitingFileBody {
                    name,
                    expected,
                    mut body,
                } => {
                    let missing = (expected - body.len() as u64) as usize;
                    let take = missing.min(rest.len());
                    body.extend_from_slice(&rest[..take]);
                    rest = &rest[take..];

                    if body.len() as u64 == expected {
                        events.push(StreamEvent::File {
                            name,
                            data: body.freeze(),
                        });
                        // whatever follows the body is handled as a fresh read
                    } else {
                        self.inner = Inner::AwaitingFileBody {
                            name,
                            expected,
                            body,
                        };
                    }
                }
                Inner::AwaitingHeader { mut buf } => {
                    match rest.iter().position(|&b| b == HEADER_TERMINATOR) {
                        Some(pos) => {
                            if buf.len() + pos > MAX_FILE_HEADER_LEN {
                                events.push(StreamEvent::Malformed(
                                    ProtocolError::MalformedHeader(format!(
                                        "header exceeds {} bytes",
                                        MAX_FILE_HEADER_LEN
                                    )),
                                ));
                                break;
                            }
                            buf.extend_from_slice(&rest[..pos]);
                            rest = &rest[pos + 1..];
                            if !self.begin_file(&buf, &mut events) {
                                break;
                            }
                        }
                        None => {
                            buf.extend_from_slice(rest);
                            if buf.len() > MAX_FILE_HEADER_LEN {
                                events.push(StreamEvent::Malformed(
                                    ProtocolError::MalformedHeader(format!(
                                        "header exceeds {} bytes",
                                        MAX_FILE_HEADER_LEN
                                    )),
                                ));
                            } else {
                                self.inner = Inner::AwaitingHeader { buf };
                            }
                            break;
                        }
                    }
                }
                Inner::Idle => {
                    if !is_file_frame(rest) {
                        events.push(StreamEvent::Text(
                            String::from_utf8_lossy(rest).into_owned(),
                        ));
                        break;
                    }

                    match rest.iter().position(|&b| b == HEADER_TERMINATOR) {
                        Some(pos) => {
                            let header = &rest[..pos];
                            rest = &rest[pos + 1..];
                            if !self.begin_file(header, &mut events) {
                                break;
                            }
                        }
                        None => {
                            match self.policy {
                                HeaderPolicy::Discard => {
                                    events.push(StreamEvent::Malformed(
                                        ProtocolError::MalformedHeader(
                                            "header not terminated within read".to_string(),
                                        ),
                                    ));
                                }
                                HeaderPolicy::Buffer if rest.len() > MAX_FILE_HEADER_LEN => {
                                    events.push(StreamEvent::Malformed(
                                        ProtocolError::MalformedHeader(format!(
                                            "header exceeds {} bytes",
                                            MAX_FILE_HEADER_LEN
                                        )),
                                    ));
                                }
                                HeaderPolicy::Buffer => {
                                    self.inner = Inner::AwaitingHeader {
                                        buf: BytesMut::from(rest),
                                    };
                                }
                            }
                            break;
                        }
                    }
                }
            }
        }

        events
    }

    /// The peer closed the connection. Flushes any partial file.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        match std::mem::replace(&mut self.inner, Inner::Closed) {
            Inner::Closed => Vec::new(),
            Inner::Idle => vec![StreamEvent::Closed],
            Inner::AwaitingHeader { .. } => vec![
                StreamEvent::Malformed(ProtocolError::MalformedHeader(
                    "connection closed inside header".to_string(),
                )),
                StreamEvent::Closed,
            ],
            Inner::AwaitingFileBody {
                name,
                expected,
                body,
            } => vec![
                StreamEvent::TruncatedFile {
                    name,
                    data: body.freeze(),
                    expected,
                },
                StreamEvent::Closed,
            ],
        }
    }

    /// Parse a header and enter the body state. Returns false when the rest
    /// of the read must be discarded.
    fn begin_file(&mut self, header: &[u8], events: &mut Vec<StreamEvent>) -> bool {
        let header = match FileHeader::parse(header) {
            Ok(header) => header,
            Err(e) => {
                events.push(StreamEvent::Malformed(e));
                return false;
            }
        };

        if header.file_size > self.max_file_size {
            events.push(StreamEvent::Malformed(ProtocolError::FileTooLarge {
                size: header.file_size,
                max: self.max_file_size,
            }));
            return false;
        }

        if header.file_size == 0 {
            events.push(StreamEvent::File {
                name: header.file_name,
                data: Bytes::new(),
            });
            return true;
        }

        self.inner = Inner::AwaitingFileBody {
            name: header.file_name,
            expected: header.file_size,
            body: BytesMut::with_capacity(header.file_size.min(1 << 20) as usize),
        };
        true
    }
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new(HeaderPolicy::Discard, DEFAULT_MAX_FILE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn file_frame(name: &str, content: &[u8]) -> Vec<u8> {
        let header = FileHeader::new(name, content.len() as u64).unwrap();
        let mut out = header.encode().to_vec();
        out.extend_from_slice(content);
        out
    }

    fn files(events: &[StreamEvent]) -> Vec<(String, Vec<u8>)> {
        events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::File { name, data } => Some((name.clone(), data.to_vec())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_text_frame_is_verbatim() {
        let mut decoder = StreamDecoder::default();
        let text = "hola | qué tal? FILE| not at start";
        let events = decoder.feed(text.as_bytes());
        assert_eq!(events, vec![StreamEvent::Text(text.to_string())]);
        assert_eq!(decoder.state(), DecoderState::Idle);
    }

    #[test]
    fn test_short_read_is_text() {
        let mut decoder = StreamDecoder::default();
        assert_eq!(
            decoder.feed(b"FIL"),
            vec![StreamEvent::Text("FIL".to_string())]
        );
    }

    #[test]
    fn test_header_parse() {
        let header = FileHeader::parse(b"FILE|a.txt|5").unwrap();
        assert_eq!(header.file_name, "a.txt");
        assert_eq!(header.file_size, 5);

        let mut decoder = StreamDecoder::default();
        let events = decoder.feed(b"FILE|a.txt|5\nhello");
        assert_eq!(files(&events), vec![("a.txt".to_string(), b"hello".to_vec())]);
    }

    #[test]
    fn test_extra_header_fields_are_ignored() {
        let header = FileHeader::parse(b"FILE|a.txt|3|extra").unwrap();
        assert_eq!(header.file_size, 3);
    }

    #[test]
    fn test_two_field_header_is_malformed() {
        let mut decoder = StreamDecoder::default();
        let events = decoder.feed(b"FILE|bad\n");
        assert!(matches!(
            events.as_slice(),
            [StreamEvent::Malformed(ProtocolError::MalformedHeader(_))]
        ));
        assert_eq!(decoder.state(), DecoderState::Idle);
    }

    #[test]
    fn test_non_numeric_size_is_malformed() {
        let mut decoder = StreamDecoder::default();
        let events = decoder.feed(b"FILE|a.txt|five\nhello");
        assert!(matches!(
            events.as_slice(),
            [StreamEvent::Malformed(ProtocolError::InvalidFileSize(_))]
        ));

        let events = decoder.feed(b"FILE|a.txt|-5\n");
        assert!(matches!(
            events.as_slice(),
            [StreamEvent::Malformed(ProtocolError::InvalidFileSize(_))]
        ));
    }

    #[test]
    fn test_oversized_file_is_rejected() {
        let mut decoder = StreamDecoder::new(HeaderPolicy::Discard, 10);
        let events = decoder.feed(b"FILE|big.bin|11\n");
        assert!(matches!(
            events.as_slice(),
            [StreamEvent::Malformed(ProtocolError::FileTooLarge { size: 11, max: 10 })]
        ));
    }

    #[test]
    fn test_split_header_discarded_by_default() {
        let mut decoder = StreamDecoder::default();
        let events = decoder.feed(b"FILE|a.t");
        assert!(matches!(events.as_slice(), [StreamEvent::Malformed(_)]));
        // the tail of the header now looks like text
        let events = decoder.feed(b"xt|5\nhello");
        assert_eq!(events, vec![StreamEvent::Text("xt|5\nhello".to_string())]);
    }

    #[test]
    fn test_split_header_buffered_when_enabled() {
        let mut decoder = StreamDecoder::new(HeaderPolicy::Buffer, DEFAULT_MAX_FILE_SIZE);
        assert!(decoder.feed(b"FILE|a.t").is_empty());
        assert_eq!(decoder.state(), DecoderState::AwaitingHeader);
        let events = decoder.feed(b"xt|5\nhel");
        assert!(events.is_empty());
        assert_eq!(decoder.state(), DecoderState::AwaitingFileBody);
        assert_eq!(decoder.bytes_remaining(), Some(2));
        let events = decoder.feed(b"lo");
        assert_eq!(files(&events), vec![("a.txt".to_string(), b"hello".to_vec())]);
    }

    #[test]
    fn test_buffered_header_length_is_capped() {
        let mut frame = b"FILE|".to_vec();
        frame.extend(std::iter::repeat_n(b'n', 1500));
        frame.extend_from_slice(b"|3\n");

        let mut decoder = StreamDecoder::new(HeaderPolicy::Buffer, DEFAULT_MAX_FILE_SIZE);
        assert!(decoder.feed(&frame[..1000]).is_empty());
        assert_eq!(decoder.state(), DecoderState::AwaitingHeader);

        let mut rest = frame[1000..].to_vec();
        rest.extend_from_slice(b"abc");
        let events = decoder.feed(&rest);
        assert!(matches!(
            events.as_slice(),
            [StreamEvent::Malformed(ProtocolError::MalformedHeader(_))]
        ));
        assert_eq!(decoder.state(), DecoderState::Idle);

        // the decoder recovers for the next read
        let events = decoder.feed(b"hi");
        assert_eq!(events, vec![StreamEvent::Text("hi".to_string())]);
    }

    #[test]
    fn test_buffered_header_at_the_cap_is_accepted() {
        let name = "n".repeat(MAX_FILE_HEADER_LEN - "FILE||3".len());
        let frame = format!("FILE|{}|3\nabc", name);
        let mut decoder = StreamDecoder::new(HeaderPolicy::Buffer, DEFAULT_MAX_FILE_SIZE);
        assert!(decoder.feed(&frame.as_bytes()[..600]).is_empty());
        let events = decoder.feed(&frame.as_bytes()[600..]);
        assert_eq!(files(&events), vec![(name, b"abc".to_vec())]);
    }

    #[test]
    fn test_file_split_at_every_point() {
        let content: Vec<u8> = (0..64u8).collect();
        let frame = file_frame("photo.jpg", &content);

        for split in 1..frame.len() {
            let mut decoder = StreamDecoder::default();
            let header_len = frame.iter().position(|&b| b == b'\n').unwrap() + 1;
            let mut events = Vec::new();
            if split < header_len {
                // a header split is lossy by design; deliver the header whole instead
                events.extend(decoder.feed(&frame[..header_len]));
                events.extend(decoder.feed(&frame[header_len..]));
            } else {
                events.extend(decoder.feed(&frame[..split]));
                events.extend(decoder.feed(&frame[split..]));
            }
            assert_eq!(
                files(&events),
                vec![("photo.jpg".to_string(), content.clone())],
                "split at {}",
                split
            );
            assert_eq!(decoder.state(), DecoderState::Idle);
        }
    }

    #[test]
    fn test_file_random_read_sizes() {
        let mut rng = rand::thread_rng();
        let content: Vec<u8> = (0..5000).map(|_| rng.r#gen::<u8>()).collect();
        let frame = file_frame("blob.bin", &content);
        let header_len = frame.iter().position(|&b| b == b'\n').unwrap() + 1;

        for _ in 0..50 {
            let mut decoder = StreamDecoder::default();
            let first = rng.gen_range(header_len..=frame.len());
            let mut events = decoder.feed(&frame[..first]);
            let mut offset = first;
            while offset < frame.len() {
                let len = rng.gen_range(1..=700).min(frame.len() - offset);
                events.extend(decoder.feed(&frame[offset..offset + len]));
                offset += len;
            }
            assert_eq!(files(&events), vec![("blob.bin".to_string(), content.clone())]);
        }
    }

    #[test]
    fn test_empty_file() {
        let mut decoder = StreamDecoder::default();
        let events = decoder.feed(b"FILE|empty.txt|0\n");
        assert_eq!(files(&events), vec![("empty.txt".to_string(), Vec::new())]);
        assert_eq!(decoder.state(), DecoderState::Idle);
    }

    #[test]
    fn test_bytes_after_body_start_a_new_frame() {
        let mut decoder = StreamDecoder::default();
        let mut read = file_frame("a.txt", b"abc");
        read.extend_from_slice(b"after");
        let events = decoder.feed(&read);
        assert_eq!(
            events,
            vec![
                StreamEvent::File {
                    name: "a.txt".to_string(),
                    data: Bytes::from_static(b"abc"),
                },
                StreamEvent::Text("after".to_string()),
            ]
        );
    }

    #[test]
    fn test_truncated_file_on_close() {
        let mut decoder = StreamDecoder::default();
        assert!(decoder.feed(b"FILE|a.txt|10\nabc").is_empty());
        let events = decoder.feed(&[]);
        assert_eq!(
            events,
            vec![
                StreamEvent::TruncatedFile {
                    name: "a.txt".to_string(),
                    data: Bytes::from_static(b"abc"),
                    expected: 10,
                },
                StreamEvent::Closed,
            ]
        );
        assert_eq!(decoder.state(), DecoderState::Closed);
    }

    #[test]
    fn test_closed_decoder_emits_nothing() {
        let mut decoder = StreamDecoder::default();
        assert_eq!(decoder.feed(&[]), vec![StreamEvent::Closed]);
        assert!(decoder.feed(b"late text").is_empty());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_file_name_validation() {
        assert!(matches!(
            FileHeader::new("a|b.txt", 1),
            Err(ProtocolError::InvalidFileName(_))
        ));
        assert!(matches!(
            FileHeader::new("a\nb.txt", 1),
            Err(ProtocolError::InvalidFileName(_))
        ));
        assert_eq!(
            FileHeader::new("ok.txt", 12).unwrap().encode(),
            Bytes::from_static(b"FILE|ok.txt|12\n")
        );
    }
}
