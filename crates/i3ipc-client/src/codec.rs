//! Framing codec for the `i3-ipc` wire format
//!
//! ```text
//! offset  size  field
//! 0       6     magic "i3-ipc"
//! 6       4     payload length (u32 LE)
//! 10      4     message type (u32 LE), bit 31 set for events
//! 14      N     payload (UTF-8 JSON)
//! ```
//!
//! Nothing in here performs I/O. [`decode`] is a stateless scan over a byte
//! slice. [`I3Codec`] runs the same algorithm as a `tokio_util` codec over
//! the growing read buffer of a `FramedRead`, remembering a located header
//! between calls so a large payload arriving in many reads is never rescanned.

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use crate::config::DEFAULT_MAX_PAYLOAD;
use crate::message::MessageKind;

/// Marker at the start of every frame
pub const MAGIC: &[u8; 6] = b"i3-ipc";

/// Magic plus the two u32 header words
pub const HEADER_LEN: usize = MAGIC.len() + 8;

/// Bit of the type word that marks an event
pub const EVENT_BIT: u32 = 1 << 31;

/// Framing failures
///
/// These are distinct from "need more data": once one is reported, the
/// position of the next frame in the stream is unknown.
#[derive(Debug, Error)]
pub enum FramingError {
    #[error("Frame payload of {length} bytes exceeds the maximum of {max} bytes")]
    PayloadTooLarge { length: usize, max: usize },

    /// Socket error surfaced through a `FramedRead`/`FramedWrite`
    #[error("Socket I/O failed")]
    Io(#[from] std::io::Error),
}

/// One complete message from the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Raw type word, event bit included
    pub message_type: u32,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Whether the peer flagged this frame as an unsolicited event
    pub fn is_event(&self) -> bool {
        self.message_type & EVENT_BIT != 0
    }

    /// Type code with the event bit cleared
    pub fn code(&self) -> u32 {
        self.message_type & !EVENT_BIT
    }
}

/// Result of a single [`decode`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A whole frame was present; `consumed` bytes may be dropped
    Frame { frame: Frame, consumed: usize },
    /// More data is needed; the first `discard` bytes are garbage and may be
    /// dropped (never any part of a frame)
    Incomplete { discard: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    length: usize,
    message_type: u32,
}

enum Located {
    /// Header found at `start` (offset of the magic)
    Header { start: usize, header: Header },
    /// No complete header yet; `discard` leading bytes are garbage
    Partial { discard: usize },
}

/// Encode a request frame
pub fn encode(kind: MessageKind, payload: &[u8]) -> Result<Vec<u8>, FramingError> {
    encode_frame(kind.code(), payload)
}

/// Encode a frame with an arbitrary type word
pub fn encode_frame(message_type: u32, payload: &[u8]) -> Result<Vec<u8>, FramingError> {
    let length = u32::try_from(payload.len()).map_err(|_| FramingError::PayloadTooLarge {
        length: payload.len(),
        max: u32::MAX as usize,
    })?;

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(MAGIC);
    frame.extend_from_slice(&length.to_le_bytes());
    frame.extend_from_slice(&message_type.to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Decode at most one frame from the front of `buf`
///
/// Bytes before the magic are skipped. Nothing is consumed while a frame is
/// only partially present, so the caller simply calls again with more data.
pub fn decode(buf: &[u8], max_payload: usize) -> Result<Decoded, FramingError> {
    match locate_header(buf, max_payload)? {
        Located::Partial { discard } => Ok(Decoded::Incomplete { discard }),
        Located::Header { start, header } => {
            let body = start + HEADER_LEN;
            let end = body + header.length;
            if buf.len() < end {
                return Ok(Decoded::Incomplete { discard: start });
            }
            Ok(Decoded::Frame {
                frame: Frame {
                    message_type: header.message_type,
                    payload: buf[body..end].to_vec(),
                },
                consumed: end,
            })
        }
    }
}

fn locate_header(buf: &[u8], max_payload: usize) -> Result<Located, FramingError> {
    let Some(start) = find_magic(buf) else {
        // A trailing partial magic may still complete with the next read
        let keep = partial_magic_suffix(buf);
        return Ok(Located::Partial {
            discard: buf.len() - keep,
        });
    };

    let words = start + MAGIC.len();
    if buf.len() < words + 8 {
        return Ok(Located::Partial { discard: start });
    }

    let length = u32::from_le_bytes([buf[words], buf[words + 1], buf[words + 2], buf[words + 3]])
        as usize;
    if length > max_payload {
        return Err(FramingError::PayloadTooLarge {
            length,
            max: max_payload,
        });
    }

    // Little-endian, so the event flag is the top bit of the fourth type byte
    let message_type =
        u32::from_le_bytes([buf[words + 4], buf[words + 5], buf[words + 6], buf[words + 7]]);

    Ok(Located::Header {
        start,
        header: Header {
            length,
            message_type,
        },
    })
}

fn find_magic(buf: &[u8]) -> Option<usize> {
    buf.windows(MAGIC.len()).position(|window| window == MAGIC)
}

/// Length of the longest suffix of `buf` that is a proper prefix of the magic
fn partial_magic_suffix(buf: &[u8]) -> usize {
    (1..MAGIC.len())
        .rev()
        .find(|&n| buf.len() >= n && buf[buf.len() - n..] == MAGIC[..n])
        .unwrap_or(0)
}

/// `tokio_util` codec for i3 frames
///
/// Decoding advances the read buffer past whatever it consumes, so the buffer
/// only ever holds the unconsumed tail. Encoding accepts either a request
/// `(MessageKind, payload)` or a whole [`Frame`].
#[derive(Debug, Clone)]
pub struct I3Codec {
    max_payload: usize,
    header: Option<Header>,
}

impl I3Codec {
    pub fn new(max_payload: usize) -> Self {
        Self {
            max_payload,
            header: None,
        }
    }

    fn put_frame(
        message_type: u32,
        payload: &[u8],
        dst: &mut BytesMut,
    ) -> Result<(), FramingError> {
        let length = u32::try_from(payload.len()).map_err(|_| FramingError::PayloadTooLarge {
            length: payload.len(),
            max: u32::MAX as usize,
        })?;

        dst.reserve(HEADER_LEN + payload.len());
        dst.put_slice(MAGIC);
        dst.put_u32_le(length);
        dst.put_u32_le(message_type);
        dst.put_slice(payload);
        Ok(())
    }
}

impl Default for I3Codec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD)
    }
}

impl Decoder for I3Codec {
    type Item = Frame;
    type Error = FramingError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FramingError> {
        let header = match self.header {
            Some(header) => header,
            None => match locate_header(&src[..], self.max_payload)? {
                Located::Partial { discard } => {
                    src.advance(discard);
                    return Ok(None);
                }
                Located::Header { start, header } => {
                    src.advance(start + HEADER_LEN);
                    self.header = Some(header);
                    header
                }
            },
        };

        if src.len() < header.length {
            src.reserve(header.length - src.len());
            return Ok(None);
        }

        self.header = None;
        let payload = src.split_to(header.length).to_vec();
        Ok(Some(Frame {
            message_type: header.message_type,
            payload,
        }))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FramingError> {
        // A truncated trailing frame is dropped; the stream simply ends
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                if !src.is_empty() || self.header.is_some() {
                    tracing::debug!(
                        buffered = src.len(),
                        "Discarding partial frame at end of stream"
                    );
                    src.clear();
                    self.header = None;
                }
                Ok(None)
            }
        }
    }
}

impl<'a> Encoder<(MessageKind, &'a [u8])> for I3Codec {
    type Error = FramingError;

    fn encode(
        &mut self,
        (kind, payload): (MessageKind, &'a [u8]),
        dst: &mut BytesMut,
    ) -> Result<(), FramingError> {
        Self::put_frame(kind.code(), payload, dst)
    }
}

impl Encoder<Frame> for I3Codec {
    type Error = FramingError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), FramingError> {
        Self::put_frame(frame.message_type, &frame.payload, dst)
    }
}
