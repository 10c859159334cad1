//! The kernel link: framing and transport for the control channel.
//!
//! A link wraps a datagram [`Channel`] and moves complete control messages
//! across it. Sends are serialized by an internal mutex so the notify reader
//! thread may respond concurrently with the main task; receives happen only
//! on the main task.

mod netlink;

pub use netlink::NetlinkChannel;

use std::io;
use std::sync::Mutex;

use thiserror::Error;
use usmbd_protocol::{ControlHeader, HEADER_LEN, MAX_PAYLOAD, WireError};

/// Errors raised by the kernel link. All variants are fatal to the loop.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The underlying datagram channel failed.
    #[error("control channel I/O failed: {0}")]
    Io(#[from] io::Error),
    /// An inbound or outbound frame violated the wire contract.
    #[error("control frame rejected: {0}")]
    Frame(#[from] WireError),
}

/// One complete inbound control message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Message {
    /// Decoded fixed header.
    pub header: ControlHeader,
    /// Payload bytes; `header.buflen` long.
    pub payload: Vec<u8>,
}

/// Datagram transport the link runs over.
///
/// The production implementation is [`NetlinkChannel`]; tests substitute
/// socket pairs or in-memory queues.
pub trait Channel: Send + Sync {
    /// Transmits one datagram, atomically.
    fn send(&self, frame: &[u8]) -> io::Result<usize>;
    /// Receives one datagram into `buf`, returning its length. A length of
    /// zero means the peer has closed the channel.
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Control-channel endpoint connecting the daemon to the kernel module.
pub struct KernelLink {
    channel: Box<dyn Channel>,
    // Serializes the send path; the notify reader sends concurrently with
    // the main task.
    send_guard: Mutex<()>,
}

impl KernelLink {
    /// Wraps a datagram channel.
    #[must_use]
    pub fn new(channel: Box<dyn Channel>) -> Self {
        Self {
            channel,
            send_guard: Mutex::new(()),
        }
    }

    /// Frames and transmits one control message.
    ///
    /// `header.buflen` must equal `payload.len()`; the payload is bounded by
    /// [`MAX_PAYLOAD`].
    pub fn send(&self, header: &ControlHeader, payload: &[u8]) -> Result<(), LinkError> {
        if header.buflen as usize != payload.len() {
            return Err(LinkError::Frame(WireError::PayloadMismatch {
                declared: header.buflen as usize,
                carried: payload.len(),
            }));
        }

        let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
        frame.extend_from_slice(&header.encode()?);
        frame.extend_from_slice(payload);

        let _serialized = lock_ignoring_poison(&self.send_guard);
        self.channel.send(&frame)?;
        Ok(())
    }

    /// Receives the next control message.
    ///
    /// Returns `Ok(None)` when the peer closes the channel. Messages whose
    /// event discriminant is unknown are logged and skipped; framing
    /// violations are fatal.
    pub fn recv(&self) -> Result<Option<Message>, LinkError> {
        let mut buf = vec![0u8; HEADER_LEN + MAX_PAYLOAD];
        loop {
            let received = self.channel.recv(&mut buf)?;
            if received == 0 {
                return Ok(None);
            }

            let header = match ControlHeader::decode(&buf[..received]) {
                Ok(header) => header,
                Err(WireError::UnknownEvent(raw)) => {
                    tracing::error!("unknown event {raw}");
                    continue;
                }
                Err(err) => return Err(LinkError::Frame(err)),
            };

            let carried = received - HEADER_LEN;
            if header.buflen as usize != carried {
                return Err(LinkError::Frame(WireError::PayloadMismatch {
                    declared: header.buflen as usize,
                    carried,
                }));
            }

            let payload = buf[HEADER_LEN..received].to_vec();
            return Ok(Some(Message { header, payload }));
        }
    }

    /// Runs the receive loop, invoking `handler` once per message.
    ///
    /// Returns when the peer closes the channel, a fatal link error occurs,
    /// or the handler asks for shutdown.
    pub fn run_loop<F>(&self, mut handler: F) -> Result<(), LinkError>
    where
        F: FnMut(Message) -> Result<Flow, LinkError>,
    {
        while let Some(message) = self.recv()? {
            match handler(message)? {
                Flow::Continue => {}
                Flow::Shutdown => break,
            }
        }
        Ok(())
    }
}

/// Handler verdict for the link loop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Flow {
    /// Keep reading messages.
    Continue,
    /// Stop the loop and begin teardown.
    Shutdown,
}

pub(crate) fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
pub(crate) mod testing;
