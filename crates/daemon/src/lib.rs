#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_docs)]

//! # Overview
//!
//! `usmbd_daemon` is the userspace half of the in-kernel SMB server. The
//! kernel module speaks the SMB wire protocol and performs file I/O; this
//! daemon imports user accounts and exported shares at startup and then
//! services the requests the kernel forwards over a netlink control channel:
//! DCE/RPC named-pipe traffic (srvsvc, wkssvc, winreg, lanman) and directory
//! change notification fan-out.
//!
//! # Design
//!
//! - [`link`] frames control messages and owns the datagram channel.
//! - [`importer`] parses the users database and share configuration and
//!   replays them to the kernel as `CONFIG_USER` / `CONFIG_SHARE` messages.
//! - [`registry`] tracks connected sessions and their open RPC pipes.
//! - [`dispatch`] turns each inbound kernel event into at most one
//!   correlated response.
//! - [`notify`] translates SMB completion filters into inotify watches and
//!   runs the background reader that converts filesystem events into
//!   `INOTIFY_RESPONSE` messages.
//! - [`rpc`] declares the collaborator interface RPC engines implement.
//!
//! # Concurrency
//!
//! Two logical tasks exist: the main task, which owns the link loop and the
//! pipe registry, and a lazily started notify reader thread. The reader only
//! touches the notify subsystem's mutex-protected state and the link's
//! serialized send path; the pipe registry is never observed off the main
//! task.

pub mod dispatch;
pub mod importer;
pub mod link;
pub mod notify;
pub mod registry;
pub mod rpc;
mod run;

pub use crate::run::{
    CONFIG_EXIT_CODE, DEFAULT_SHARE_CONF, DEFAULT_USERS_DB, FINISHED_EXIT_CODE, LINK_EXIT_CODE,
    USAGE_EXIT_CODE, exit_code_from, run,
};
