//! Collaborator interface for DCE/RPC engines.
//!
//! The daemon only moves opaque PDU bytes between the kernel and an RPC
//! engine; it never builds or parses PDUs itself. Engines implement
//! [`RpcBackend`] out of tree. The workspace ships [`UnsupportedRpc`], which
//! rejects every operation, so the daemon remains runnable without an
//! engine.

use thiserror::Error;

use crate::registry::Pipe;

/// Errors reported by an RPC engine. The errno value travels to the kernel
/// in the response header, negated.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum RpcError {
    /// The engine does not implement the requested operation.
    #[error("rpc operation not supported")]
    Unsupported,
    /// The engine failed with a specific errno.
    #[error("rpc engine failed with errno {0}")]
    Errno(i32),
}

impl RpcError {
    /// Returns the positive errno describing this failure.
    #[must_use]
    pub const fn errno(self) -> i32 {
        match self {
            Self::Unsupported => libc::ENOSYS,
            Self::Errno(errno) => errno,
        }
    }
}

/// Result of a LANMAN transaction.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LanmanReply {
    /// Combined parameter and data bytes returned to the client.
    pub data: Vec<u8>,
    /// Length of the parameter section within `data`.
    pub param_count: u32,
}

/// A DCE/RPC engine servicing pipe traffic.
pub trait RpcBackend: Send + Sync {
    /// Accepts one request PDU written to the pipe.
    fn submit(&self, pipe: &Pipe, request: &[u8]) -> Result<(), RpcError>;

    /// Produces up to `max_out` response bytes pending on the pipe.
    fn poll(&self, pipe: &Pipe, max_out: usize) -> Result<Vec<u8>, RpcError>;

    /// Runs one LANMAN transaction: request in, reply out.
    fn lanman(&self, pipe: &Pipe, request: &[u8], max_out: usize)
    -> Result<LanmanReply, RpcError>;
}

/// Stand-in engine that rejects every RPC operation with `ENOSYS`.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnsupportedRpc;

impl RpcBackend for UnsupportedRpc {
    fn submit(&self, _pipe: &Pipe, _request: &[u8]) -> Result<(), RpcError> {
        Err(RpcError::Unsupported)
    }

    fn poll(&self, _pipe: &Pipe, _max_out: usize) -> Result<Vec<u8>, RpcError> {
        Err(RpcError::Unsupported)
    }

    fn lanman(
        &self,
        _pipe: &Pipe,
        _request: &[u8],
        _max_out: usize,
    ) -> Result<LanmanReply, RpcError> {
        Err(RpcError::Unsupported)
    }
}
