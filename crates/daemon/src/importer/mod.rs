//! Startup configuration import.
//!
//! Two files are replayed to the kernel when the daemon starts: the users
//! database, one `CONFIG_USER` message per entry, and the share
//! configuration, one `CONFIG_SHARE` message per serialized block. Each
//! message blocks until the kernel acknowledges it; a rejected entry is
//! logged and skipped, only loss of the link itself aborts the import.

mod account;
mod shares;
mod users;

pub use account::{Account, AccountResolver, SystemAccounts};
pub use shares::{
    GlobalConfig, IPC_SHARE_NAME, PAGE_SIZE, SerializedBlock, Share, ShareList, import_shares,
    parse_share_block, serialize_share_file,
};
pub use users::import_users;

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use usmbd_protocol::{ControlHeader, EventType};

use crate::link::{KernelLink, LinkError};

/// Errors that abort the configuration import.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration file could not be read.
    #[error("failed to read '{path}': {source}")]
    Io {
        /// File the importer was processing.
        path: PathBuf,
        /// Underlying failure.
        source: io::Error,
    },
    /// The kernel link failed while replaying configuration.
    #[error(transparent)]
    Link(#[from] LinkError),
}

/// Sends one configuration payload and waits for its acknowledgement.
///
/// Returns the error code the kernel put into the response; an unexpected
/// event while waiting counts as `-EINVAL`.
fn configure(
    link: &KernelLink,
    event: EventType,
    response: EventType,
    payload: &[u8],
) -> Result<i32, LinkError> {
    let mut header = ControlHeader::new(event);
    header.buflen = payload.len() as u32;
    link.send(&header, payload)?;

    match link.recv()? {
        Some(message) if message.header.event == response => Ok(message.header.error),
        Some(message) => {
            tracing::error!(
                "unexpected event {:?} while waiting for {:?}",
                message.header.event,
                response
            );
            Ok(-libc::EINVAL)
        }
        None => Err(LinkError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "kernel closed the control channel during configuration",
        ))),
    }
}
