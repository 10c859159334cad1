//! Fixed-size control header codec.
//!
//! Every datagram on the kernel link starts with [`HEADER_LEN`] bytes laid
//! out as `type`, `error`, `server_handle`, `pipe_type`, `buflen`, and a
//! 68-byte auxiliary block whose meaning follows the event type. The layout
//! matches the kernel module's C structure, so all integers are host-endian
//! and string fields are fixed-width NUL-padded arrays.

mod aux;
mod event;

pub use aux::Aux;
pub use event::{EventType, PipeKind};

use thiserror::Error;

/// Upper bound on the payload carried behind a control header.
pub const MAX_PAYLOAD: usize = 4096;

/// Width of the fixed-size codepage fields in the auxiliary block.
pub const CODEPAGE_LEN: usize = 32;

/// Width of the fixed-size username field in the auxiliary block.
pub const USERNAME_LEN: usize = 32;

/// Size of the event-specific auxiliary block.
pub(crate) const AUX_LEN: usize = 68;

/// Total size of an encoded control header.
pub const HEADER_LEN: usize = 24 + AUX_LEN;

const EVENT_OFFSET: usize = 0;
const ERROR_OFFSET: usize = 4;
const HANDLE_OFFSET: usize = 8;
const PIPE_OFFSET: usize = 16;
const BUFLEN_OFFSET: usize = 20;
const AUX_OFFSET: usize = 24;

/// Errors produced while encoding or decoding control frames.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum WireError {
    /// The buffer is too short to hold a complete header.
    #[error("control frame truncated: need {expected} bytes, have {actual}")]
    Truncated {
        /// Bytes required for a complete frame.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },
    /// The header claims a payload larger than [`MAX_PAYLOAD`].
    #[error("payload length {0} exceeds the {MAX_PAYLOAD}-byte channel limit")]
    Oversized(usize),
    /// The header's payload length disagrees with the bytes that follow it.
    #[error("payload length mismatch: header says {declared}, frame carries {carried}")]
    PayloadMismatch {
        /// Length recorded in the header.
        declared: usize,
        /// Length of the trailing bytes.
        carried: usize,
    },
    /// The event discriminant is not part of the protocol.
    #[error("unknown control event type {0}")]
    UnknownEvent(u32),
    /// A fixed-width string field cannot hold the supplied value.
    #[error("string field value exceeds {limit} bytes")]
    StringTooLong {
        /// Capacity of the field, including its terminating NUL.
        limit: usize,
    },
    /// The auxiliary block variant does not belong to the event type.
    #[error("auxiliary fields do not match event {0:?}")]
    AuxMismatch(EventType),
}

/// Decoded control-message header.
///
/// `buflen` names the length of the payload that immediately follows the
/// header on the wire; the header itself never owns payload bytes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ControlHeader {
    /// Message discriminant shared by both channel directions.
    pub event: EventType,
    /// Negated errno carried on responses; zero on requests and successes.
    pub error: i32,
    /// Kernel-issued opaque session identifier.
    pub server_handle: u64,
    /// Pipe discriminant the message refers to.
    pub pipe_kind: PipeKind,
    /// Length of the trailing payload in bytes.
    pub buflen: u32,
    /// Event-specific scalar fields.
    pub aux: Aux,
}

impl ControlHeader {
    /// Creates a header for `event` with every other field zeroed.
    #[must_use]
    pub fn new(event: EventType) -> Self {
        Self {
            event,
            error: 0,
            server_handle: 0,
            pipe_kind: PipeKind::Srvsvc,
            buflen: 0,
            aux: Aux::None,
        }
    }

    /// Encodes the header into its fixed wire representation.
    ///
    /// Fails when `buflen` exceeds [`MAX_PAYLOAD`], when a string field is
    /// too long for its slot, or when the auxiliary variant does not belong
    /// to the event type.
    pub fn encode(&self) -> Result<[u8; HEADER_LEN], WireError> {
        if self.buflen as usize > MAX_PAYLOAD {
            return Err(WireError::Oversized(self.buflen as usize));
        }

        let mut frame = [0u8; HEADER_LEN];
        frame[EVENT_OFFSET..EVENT_OFFSET + 4].copy_from_slice(&self.event.as_raw().to_ne_bytes());
        frame[ERROR_OFFSET..ERROR_OFFSET + 4].copy_from_slice(&self.error.to_ne_bytes());
        frame[HANDLE_OFFSET..HANDLE_OFFSET + 8].copy_from_slice(&self.server_handle.to_ne_bytes());
        frame[PIPE_OFFSET..PIPE_OFFSET + 4].copy_from_slice(&self.pipe_kind.as_raw().to_ne_bytes());
        frame[BUFLEN_OFFSET..BUFLEN_OFFSET + 4].copy_from_slice(&self.buflen.to_ne_bytes());
        self.aux
            .encode_for(self.event, &mut frame[AUX_OFFSET..])?;
        Ok(frame)
    }

    /// Decodes a header from the start of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() < HEADER_LEN {
            return Err(WireError::Truncated {
                expected: HEADER_LEN,
                actual: bytes.len(),
            });
        }

        let event = EventType::from_raw(read_u32(bytes, EVENT_OFFSET))?;
        let buflen = read_u32(bytes, BUFLEN_OFFSET);
        if buflen as usize > MAX_PAYLOAD {
            return Err(WireError::Oversized(buflen as usize));
        }

        Ok(Self {
            event,
            error: i32::from_ne_bytes(bytes[ERROR_OFFSET..ERROR_OFFSET + 4].try_into().unwrap()),
            server_handle: u64::from_ne_bytes(
                bytes[HANDLE_OFFSET..HANDLE_OFFSET + 8].try_into().unwrap(),
            ),
            pipe_kind: PipeKind::from_raw(read_u32(bytes, PIPE_OFFSET)),
            buflen,
            aux: Aux::decode_for(event, &bytes[AUX_OFFSET..HEADER_LEN]),
        })
    }
}

pub(crate) fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_ne_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

pub(crate) fn put_fixed_str(slot: &mut [u8], value: &str) -> Result<(), WireError> {
    let raw = value.as_bytes();
    // Reserve one byte so the field always carries a terminating NUL.
    if raw.len() >= slot.len() {
        return Err(WireError::StringTooLong { limit: slot.len() });
    }
    slot[..raw.len()].copy_from_slice(raw);
    slot[raw.len()..].fill(0);
    Ok(())
}

pub(crate) fn get_fixed_str(slot: &[u8]) -> String {
    let end = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
    String::from_utf8_lossy(&slot[..end]).into_owned()
}
