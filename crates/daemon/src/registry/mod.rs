//! Session and DCE/RPC pipe registry.
//!
//! The kernel names each SMB session by an opaque 64-bit server handle. The
//! registry maps handles to client records and each client to its open
//! pipes, at most one per pipe kind. It is owned by the main task and never
//! observed from the notify reader.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use thiserror::Error;
use usmbd_protocol::PipeKind;

/// Errors returned by registry operations.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum RegistryError {
    /// The client already has a pipe of the requested kind.
    #[error("pipe of this kind is already open for the session")]
    AlreadyExists,
    /// No pipe of the requested kind is open for the session.
    #[error("no pipe of this kind is open for the session")]
    NotFound,
}

/// One open DCE/RPC pipe.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Pipe {
    kind: PipeKind,
    codepage: String,
    username: String,
}

impl Pipe {
    /// Returns the pipe discriminant.
    #[must_use]
    pub fn kind(&self) -> PipeKind {
        self.kind
    }

    /// Returns the session codepage, frozen at pipe creation.
    #[must_use]
    pub fn codepage(&self) -> &str {
        &self.codepage
    }

    /// Returns the authenticated SMB user. Empty outside LANMAN
    /// transactions.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Records the SMB account a LANMAN transaction runs as.
    pub fn set_username(&mut self, username: &str) {
        self.username = username.to_owned();
    }
}

/// One connected SMB session and its open pipes.
#[derive(Debug, Default)]
pub struct Client {
    pipes: HashMap<u32, Pipe>,
}

impl Client {
    /// Returns how many pipes the session has open.
    #[must_use]
    pub fn pipe_count(&self) -> usize {
        self.pipes.len()
    }
}

/// Registry of connected sessions, keyed by server handle.
#[derive(Debug, Default)]
pub struct Registry {
    clients: HashMap<u64, Client>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the client for `handle`, inserting an empty record on miss.
    pub fn lookup_or_create_client(&mut self, handle: u64) -> &mut Client {
        self.clients.entry(handle).or_insert_with(|| {
            tracing::debug!("added client 0x{handle:x}");
            Client::default()
        })
    }

    /// Opens a pipe of `kind` for the session, enforcing one pipe per kind.
    pub fn create_pipe(
        &mut self,
        handle: u64,
        kind: PipeKind,
        codepage: &str,
    ) -> Result<&mut Pipe, RegistryError> {
        let client = self.lookup_or_create_client(handle);
        match client.pipes.entry(kind.as_raw()) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyExists),
            Entry::Vacant(slot) => Ok(slot.insert(Pipe {
                kind,
                codepage: codepage.to_owned(),
                username: String::new(),
            })),
        }
    }

    /// Returns the unique pipe of `kind` for the session, if open.
    #[must_use]
    pub fn find_pipe(&self, handle: u64, kind: PipeKind) -> Option<&Pipe> {
        self.clients
            .get(&handle)
            .and_then(|client| client.pipes.get(&kind.as_raw()))
    }

    /// Closes the pipe of `kind` for the session.
    ///
    /// The session record itself is dropped with its last pipe; the kernel
    /// signals session close only through pipe destruction.
    pub fn destroy_pipe(&mut self, handle: u64, kind: PipeKind) -> Result<(), RegistryError> {
        let client = self.clients.get_mut(&handle).ok_or(RegistryError::NotFound)?;
        client
            .pipes
            .remove(&kind.as_raw())
            .ok_or(RegistryError::NotFound)?;
        if client.pipes.is_empty() {
            self.clients.remove(&handle);
            tracing::debug!("removed client 0x{handle:x}");
        }
        Ok(())
    }

    /// Returns how many sessions are registered.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}
