#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_docs)]

//! # Overview
//!
//! `usmbd_protocol` describes the control channel shared between the
//! in-kernel SMB server and the userspace daemon. Every message on that
//! channel is a datagram made of a fixed-size [`ControlHeader`] followed by
//! an optional payload of at most [`MAX_PAYLOAD`] bytes. The crate owns the
//! header codec, the event and pipe enumerations, and the payload records
//! used by directory change notification.
//!
//! # Design
//!
//! - [`EventType`] and [`PipeKind`] enumerate the wire discriminants used by
//!   both directions of the channel.
//! - [`ControlHeader`] carries the scalars common to every message plus an
//!   [`Aux`] block whose interpretation depends on the event type, mirroring
//!   the per-request unions of the kernel interface.
//! - [`notify`] holds the SMB completion-filter bits, `FILE_ACTION_*`
//!   values, and the change-notify request/response payload codecs.
//!
//! # Invariants
//!
//! - Multi-byte integers are host-endian: the kernel module shares this
//!   process's byte order, so no conversion is performed.
//! - Fixed-width string fields are NUL-padded on encode and cut at the first
//!   NUL on decode.
//! - The codec never allocates more than `MAX_PAYLOAD` bytes for a payload
//!   and rejects frames that claim more.

mod header;
pub mod notify;

pub use crate::header::{
    Aux, CODEPAGE_LEN, ControlHeader, EventType, HEADER_LEN, MAX_PAYLOAD, PipeKind, USERNAME_LEN,
    WireError,
};
