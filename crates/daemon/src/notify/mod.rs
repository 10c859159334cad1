//! Directory change notification.
//!
//! `INOTIFY_REQUEST` events are translated into inotify watches on a single
//! shared backend descriptor. A lazily started reader thread turns raw
//! inotify events into `INOTIFY_RESPONSE` messages carrying one SMB2
//! `FileNotifyInformation` record each.
//!
//! Subscriptions are single-shot: after one delivery the subscriber is
//! dropped and the shared watch descriptor is closed, so concurrent notify
//! clients race for the first event. A persistent backend routing events to
//! subscribers by watch descriptor would lift that limitation.

mod encoder;
mod inotify;

pub use encoder::{CodepageEncoder, FilenameEncoder};

use std::io;
use std::sync::{Arc, Mutex};
use std::thread;

use thiserror::Error;
use usmbd_protocol::notify::{
    FILE_ACTION_ADDED, FILE_ACTION_MODIFIED, FILE_ACTION_REMOVED, NotifyRequest, NotifyResponse,
    filter,
};
use usmbd_protocol::{ControlHeader, EventType, WireError};

use crate::link::{KernelLink, lock_ignoring_poison};
use inotify::WatchBackend;

/// Errors raised while servicing a change-notify request.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The request payload was malformed.
    #[error("malformed change-notify request: {0}")]
    BadRequest(#[from] WireError),
    /// The inotify instance could not be created.
    #[error("failed to initialise the watch backend: {0}")]
    WatchInit(#[source] io::Error),
    /// The directory could not be watched.
    #[error("failed to watch '{path}': {source}")]
    AddWatch {
        /// Directory named by the request.
        path: String,
        /// Underlying failure.
        source: io::Error,
    },
    /// The reader thread could not be spawned.
    #[error("failed to start the notify reader: {0}")]
    SpawnReader(#[source] io::Error),
    /// A filename could not be converted to UTF-16LE.
    #[error("cannot encode filename from codepage '{codepage}'")]
    Encode {
        /// Codepage label the conversion ran under.
        codepage: String,
    },
}

/// One pending change-notify subscription.
#[derive(Clone, Debug)]
struct NotifyClient {
    handle: u64,
    codepage: String,
    wd: i32,
}

#[derive(Default)]
struct ReaderState {
    alive: bool,
    watch: Option<Arc<WatchBackend>>,
}

/// Shared state of the change-notify subsystem.
///
/// The subscriber registry and the reader state each sit behind their own
/// mutex; locks are held only across state manipulation, never across
/// filesystem calls or sends.
#[derive(Default)]
pub struct NotifySubsystem {
    clients: Mutex<Vec<NotifyClient>>,
    reader: Mutex<ReaderState>,
}

impl NotifySubsystem {
    /// Creates an empty subsystem.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Services one `INOTIFY_REQUEST`.
    ///
    /// Opens (or reuses) the shared watch descriptor, registers the watch,
    /// records the subscriber, and starts the reader thread if none is
    /// alive.
    pub fn handle_request(
        self: &Arc<Self>,
        link: &Arc<KernelLink>,
        encoder: &Arc<dyn FilenameEncoder>,
        server_handle: u64,
        codepage: &str,
        payload: &[u8],
    ) -> Result<(), NotifyError> {
        let request = NotifyRequest::decode(payload)?;
        let mask = completion_filter_to_mask(request.completion_filter);

        let watch = {
            let mut state = lock_ignoring_poison(&self.reader);
            match &state.watch {
                Some(watch) => Arc::clone(watch),
                None => {
                    let watch = Arc::new(WatchBackend::init().map_err(NotifyError::WatchInit)?);
                    state.watch = Some(Arc::clone(&watch));
                    watch
                }
            }
        };

        let wd = watch
            .add_watch(&request.dir_path, mask)
            .map_err(|source| NotifyError::AddWatch {
                path: String::from_utf8_lossy(&request.dir_path).into_owned(),
                source,
            })?;

        {
            let mut clients = lock_ignoring_poison(&self.clients);
            match clients.iter_mut().find(|client| client.handle == server_handle) {
                // The codepage stays frozen at first registration.
                Some(client) => client.wd = wd,
                None => clients.push(NotifyClient {
                    handle: server_handle,
                    codepage: codepage.to_owned(),
                    wd,
                }),
            }
        }
        tracing::debug!("registered change-notify subscriber 0x{server_handle:x}, wd {wd}");

        // Start the reader if and only if none is running.
        let mut state = lock_ignoring_poison(&self.reader);
        if !state.alive {
            let subsystem = Arc::clone(self);
            let link = Arc::clone(link);
            let encoder = Arc::clone(encoder);
            thread::Builder::new()
                .name(String::from("usmbd-notifyd"))
                .spawn(move || reader_main(&subsystem, &link, encoder.as_ref(), &watch))
                .map_err(NotifyError::SpawnReader)?;
            state.alive = true;
        }
        Ok(())
    }

    /// Returns whether the reader thread is currently alive.
    #[must_use]
    pub fn reader_alive(&self) -> bool {
        lock_ignoring_poison(&self.reader).alive
    }

    /// Returns how many subscriptions are pending.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        lock_ignoring_poison(&self.clients).len()
    }
}

fn reader_main(
    subsystem: &Arc<NotifySubsystem>,
    link: &Arc<KernelLink>,
    encoder: &dyn FilenameEncoder,
    watch: &Arc<WatchBackend>,
) {
    loop {
        let event = match watch.read_event() {
            Ok(Some(event)) => event,
            // The watched directory itself changed; subscribers only care
            // about entries inside it.
            Ok(None) => continue,
            Err(err) => {
                tracing::error!("watch descriptor read failed: {err}");
                break;
            }
        };

        let client = {
            let clients = lock_ignoring_poison(&subsystem.clients);
            clients.iter().find(|client| client.wd == event.wd).cloned()
        };
        let Some(client) = client else {
            tracing::debug!(wd = event.wd, "no subscriber for watch descriptor");
            continue;
        };

        let action = action_for_mask(event.mask);
        let file_name = match encoder.encode_utf16le(&event.name, &client.codepage) {
            Ok(file_name) => file_name,
            Err(err) => {
                tracing::warn!("dropping change-notify event: {err}");
                continue;
            }
        };

        let payload = NotifyResponse::single(action, file_name).encode();
        let mut header = ControlHeader::new(EventType::InotifyResponse);
        header.server_handle = client.handle;
        header.buflen = payload.len() as u32;
        if let Err(err) = link.send(&header, &payload) {
            tracing::error!("change-notify response send failed: {err}");
        }

        lock_ignoring_poison(&subsystem.clients).retain(|c| c.handle != client.handle);
        tracing::debug!("delivered change notification for 0x{:x}", client.handle);
        // Single-shot: one delivery ends the subscription and the reader.
        break;
    }

    let mut state = lock_ignoring_poison(&subsystem.reader);
    state.alive = false;
    // Dropping the last handle closes the shared watch descriptor.
    state.watch = None;
}

/// Maps an SMB completion filter onto the inotify event mask.
#[must_use]
pub fn completion_filter_to_mask(completion_filter: u32) -> u32 {
    // CHANGE_NOTIFY is only valid on directories.
    let mut mask = libc::IN_MASK_ADD | libc::IN_ONLYDIR;

    if completion_filter & (filter::FILE_NOTIFY_CHANGE_FILE_NAME | filter::FILE_NOTIFY_CHANGE_DIR_NAME)
        != 0
    {
        mask |= libc::IN_CREATE | libc::IN_DELETE | libc::IN_MOVED_FROM | libc::IN_MOVED_TO;
    }
    if completion_filter & filter::FILE_NOTIFY_CHANGE_ATTRIBUTES != 0 {
        mask |= libc::IN_ATTRIB | libc::IN_MOVED_TO | libc::IN_MOVED_FROM | libc::IN_MODIFY;
    }
    if completion_filter & filter::FILE_NOTIFY_CHANGE_LAST_WRITE != 0 {
        mask |= libc::IN_ATTRIB;
    }
    if completion_filter & filter::FILE_NOTIFY_CHANGE_LAST_ACCESS != 0 {
        mask |= libc::IN_ATTRIB;
    }
    if completion_filter & filter::FILE_NOTIFY_CHANGE_EA != 0 {
        mask |= libc::IN_ATTRIB;
    }
    if completion_filter & filter::FILE_NOTIFY_CHANGE_SECURITY != 0 {
        mask |= libc::IN_ATTRIB;
    }

    mask
}

/// Maps an inotify event mask onto the SMB file action.
///
/// Renames surface as a remove/add pair: `MOVED_FROM` and `MOVED_TO` are
/// reported as `REMOVED` and `ADDED`, never as `RENAMED`.
#[must_use]
pub fn action_for_mask(mask: u32) -> u32 {
    if mask & libc::IN_CREATE != 0 {
        FILE_ACTION_ADDED
    } else if mask & libc::IN_DELETE != 0 {
        FILE_ACTION_REMOVED
    } else if mask & libc::IN_MOVED_FROM != 0 {
        FILE_ACTION_REMOVED
    } else if mask & libc::IN_MOVED_TO != 0 {
        FILE_ACTION_ADDED
    } else {
        FILE_ACTION_MODIFIED
    }
}

#[cfg(test)]
mod tests;
