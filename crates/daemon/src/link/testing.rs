//! In-memory channel used by unit tests across the crate.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use usmbd_protocol::{ControlHeader, EventType, HEADER_LEN};

use super::{Channel, KernelLink, lock_ignoring_poison};

/// Script-driven [`Channel`]: `recv` pops queued frames, `send` records them.
#[derive(Default)]
pub(crate) struct MemoryChannel {
    inbound: Mutex<VecDeque<Vec<u8>>>,
    outbound: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MemoryChannel {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queues a raw frame for a later `recv`.
    pub(crate) fn push_frame(&self, frame: Vec<u8>) {
        lock_ignoring_poison(&self.inbound).push_back(frame);
    }

    /// Queues an encoded header-plus-payload message.
    pub(crate) fn push_message(&self, header: &ControlHeader, payload: &[u8]) {
        let mut frame = header.encode().expect("test header encodes").to_vec();
        frame.extend_from_slice(payload);
        self.push_frame(frame);
    }

    /// Handle on everything sent through the channel.
    pub(crate) fn sent(&self) -> Arc<Mutex<Vec<Vec<u8>>>> {
        Arc::clone(&self.outbound)
    }
}

impl Channel for MemoryChannel {
    fn send(&self, frame: &[u8]) -> io::Result<usize> {
        lock_ignoring_poison(&self.outbound).push(frame.to_vec());
        Ok(frame.len())
    }

    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        match lock_ignoring_poison(&self.inbound).pop_front() {
            Some(frame) => {
                buf[..frame.len()].copy_from_slice(&frame);
                Ok(frame.len())
            }
            // An empty script reads as peer close.
            None => Ok(0),
        }
    }
}

/// Decoded view of a frame captured by [`MemoryChannel::sent`].
pub(crate) fn decode_sent(frame: &[u8]) -> (ControlHeader, Vec<u8>) {
    let header = ControlHeader::decode(frame).expect("sent header decodes");
    (header, frame[HEADER_LEN..].to_vec())
}

/// Builds a link whose channel replays `messages` and records sends.
pub(crate) fn scripted_link(
    messages: &[(ControlHeader, Vec<u8>)],
) -> (Arc<KernelLink>, Arc<Mutex<Vec<Vec<u8>>>>) {
    let channel = MemoryChannel::new();
    for (header, payload) in messages {
        channel.push_message(header, payload);
    }
    let sent = channel.sent();
    (Arc::new(KernelLink::new(Box::new(channel))), sent)
}

/// Shorthand for a response header carried by queued acknowledgements.
pub(crate) fn ack(event: EventType, error: i32) -> (ControlHeader, Vec<u8>) {
    let mut header = ControlHeader::new(event);
    header.error = error;
    (header, Vec::new())
}
