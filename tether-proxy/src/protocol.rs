//! Length-prefixed wire framing.
//!
//! Wire format:
//! ```text
//! ┌──────────────────┬──────────────────────────────────────────┐
//! │ length           │ payload                                  │
//! │ 4 bytes, BE u32  │ bincode-encoded Vec<Value>, `length` long│
//! └──────────────────┴──────────────────────────────────────────┘
//! ```
//!
//! The payload is an ordered value sequence whose first element is the
//! numeric request kind and whose remaining elements form the call's
//! parameter list. Decoding never consumes a partial frame: until the
//! full `length` bytes are buffered, [`decode`] reports
//! [`DecodeOutcome::Incomplete`] and leaves the buffer untouched.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX: usize = 4;

/// Maximum accepted payload size. A hostile length prefix beyond this is
/// rejected before any buffering happens.
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Request kinds with fixed wire ordinals.
///
/// The ordinals are part of the wire contract and must not be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum RequestType {
    /// State replication for a synchronized object
    Sync = 1,
    /// Plain remote slot invocation by external name
    RpcCall = 2,
    /// Client pulls the initial state of a synchronized object
    InitRequest = 3,
    /// Server's snapshot reply to an InitRequest
    InitData = 4,
    /// One-way liveness probe
    HeartBeat = 5,
}

impl RequestType {
    /// Map a wire ordinal back to a request kind.
    pub fn from_wire(tag: u64) -> Option<Self> {
        match tag {
            1 => Some(RequestType::Sync),
            2 => Some(RequestType::RpcCall),
            3 => Some(RequestType::InitRequest),
            4 => Some(RequestType::InitData),
            5 => Some(RequestType::HeartBeat),
            _ => None,
        }
    }
}

/// One decoded request: kind plus ordered parameter list.
///
/// Frames are ephemeral — the dispatcher consumes them immediately and
/// nothing is queued beyond the transport's own buffering.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub request: RequestType,
    pub params: Vec<Value>,
}

impl Frame {
    pub fn new(request: RequestType, params: Vec<Value>) -> Self {
        Self { request, params }
    }

    /// Classify a decoded value sequence into a frame.
    pub fn from_values(mut values: Vec<Value>) -> Result<Self, ProtocolError> {
        if values.is_empty() {
            return Err(ProtocolError::EmptyFrame);
        }
        let tag = values.remove(0);
        let tag = tag
            .as_uint()
            .ok_or_else(|| ProtocolError::BadRequestTag(format!("{:?}", tag.kind())))?;
        let request = RequestType::from_wire(tag).ok_or(ProtocolError::UnknownRequest(tag))?;
        Ok(Frame { request, params: values })
    }

    /// Flatten back into the on-wire value sequence.
    pub fn into_values(self) -> Vec<Value> {
        let mut values = Vec::with_capacity(self.params.len() + 1);
        values.push(Value::UInt(self.request as u64));
        values.extend(self.params);
        values
    }
}

/// Outcome of one [`decode`] attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    /// Fewer bytes buffered than the next frame needs; nothing consumed.
    Incomplete,
    /// Exactly one frame's worth of bytes consumed.
    Decoded { consumed: usize, values: Vec<Value> },
}

/// Protocol errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    Serialization(String),
    /// A complete frame whose payload does not decode. `consumed` is the
    /// full frame size, so the caller can skip it and stay in sync.
    CorruptPayload { consumed: usize, detail: String },
    /// The length prefix exceeds [`MAX_FRAME_SIZE`]. The stream cannot be
    /// resynchronized past this point.
    FrameTooLarge { size: usize, max: usize },
    /// The payload sequence carried no request tag.
    EmptyFrame,
    /// The first sequence element was not an unsigned integer.
    BadRequestTag(String),
    /// The request ordinal is not one of the defined kinds.
    UnknownRequest(u64),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serialization(e) => write!(f, "Serialization error: {e}"),
            Self::CorruptPayload { consumed, detail } => {
                write!(f, "Corrupt payload in {consumed}-byte frame: {detail}")
            }
            Self::FrameTooLarge { size, max } => {
                write!(f, "Frame of {size} bytes exceeds maximum of {max}")
            }
            Self::EmptyFrame => write!(f, "Frame carries no request tag"),
            Self::BadRequestTag(kind) => write!(f, "Request tag has kind {kind}, expected UInt"),
            Self::UnknownRequest(tag) => write!(f, "Unknown request ordinal {tag}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Serialize a value sequence and prepend the length prefix.
pub fn encode(values: &[Value]) -> Result<Vec<u8>, ProtocolError> {
    let payload = bincode::serde::encode_to_vec(values, bincode::config::standard())
        .map_err(|e| ProtocolError::Serialization(e.to_string()))?;
    if payload.len() > MAX_FRAME_SIZE as usize {
        return Err(ProtocolError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE as usize,
        });
    }
    let mut out = Vec::with_capacity(LENGTH_PREFIX + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Frame a request for the wire.
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, ProtocolError> {
    encode(&frame.clone().into_values())
}

/// Try to decode one value sequence from the front of `buf`.
///
/// Never partially consumes: either the buffer holds a whole frame
/// (prefix plus `length` payload bytes) and exactly that many bytes are
/// reported consumed, or `Incomplete` is returned and the caller retries
/// once more bytes arrive.
pub fn decode(buf: &[u8]) -> Result<DecodeOutcome, ProtocolError> {
    if buf.len() < LENGTH_PREFIX {
        return Ok(DecodeOutcome::Incomplete);
    }
    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: len as usize,
            max: MAX_FRAME_SIZE as usize,
        });
    }
    let total = LENGTH_PREFIX + len as usize;
    if buf.len() < total {
        return Ok(DecodeOutcome::Incomplete);
    }

    let payload = &buf[LENGTH_PREFIX..total];
    let (values, read): (Vec<Value>, usize) =
        bincode::serde::decode_from_slice(payload, bincode::config::standard()).map_err(|e| {
            ProtocolError::CorruptPayload {
                consumed: total,
                detail: e.to_string(),
            }
        })?;
    if read != payload.len() {
        return Err(ProtocolError::CorruptPayload {
            consumed: total,
            detail: format!("{read} of {} payload bytes decoded", payload.len()),
        });
    }
    Ok(DecodeOutcome::Decoded { consumed: total, values })
}

/// Decode and classify one frame. Convenience over [`decode`] +
/// [`Frame::from_values`] for callers that do not need to skip corrupt
/// frames themselves.
pub fn decode_frame(buf: &[u8]) -> Result<Option<(usize, Frame)>, ProtocolError> {
    match decode(buf)? {
        DecodeOutcome::Incomplete => Ok(None),
        DecodeOutcome::Decoded { consumed, values } => {
            Ok(Some((consumed, Frame::from_values(values)?)))
        }
    }
}
