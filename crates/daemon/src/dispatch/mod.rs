//! Pipe request dispatcher.
//!
//! Every inbound kernel event is handled to completion, including its
//! response, before the next one is read. Responses always carry the server
//! handle and pipe kind of the request that caused them; per-request
//! failures travel to the kernel as negated errno values and never unwind
//! past the handler.

use std::sync::Arc;

use usmbd_protocol::{Aux, ControlHeader, EventType, MAX_PAYLOAD, PipeKind};

use crate::link::{Flow, KernelLink, LinkError, Message};
use crate::notify::{FilenameEncoder, NotifySubsystem};
use crate::registry::{Registry, RegistryError};
use crate::rpc::RpcBackend;

/// Turns kernel events into registry operations, RPC collaborator calls,
/// and correlated responses.
pub struct Dispatcher {
    link: Arc<KernelLink>,
    registry: Registry,
    rpc: Box<dyn RpcBackend>,
    notify: Arc<NotifySubsystem>,
    encoder: Arc<dyn FilenameEncoder>,
}

impl Dispatcher {
    /// Creates a dispatcher with an empty registry.
    #[must_use]
    pub fn new(
        link: Arc<KernelLink>,
        rpc: Box<dyn RpcBackend>,
        encoder: Arc<dyn FilenameEncoder>,
    ) -> Self {
        Self {
            link,
            registry: Registry::new(),
            rpc,
            notify: NotifySubsystem::new(),
            encoder,
        }
    }

    /// Handles one inbound kernel event.
    pub fn handle(&mut self, message: &Message) -> Result<Flow, LinkError> {
        let handle = message.header.server_handle;
        let kind = message.header.pipe_kind;
        tracing::debug!(
            "{:?} on handle 0x{handle:x}, pipe {kind:?}",
            message.header.event
        );

        match (message.header.event, &message.header.aux) {
            (EventType::CreatePipe, Aux::Codepage(codepage)) => {
                if let Err(err) = self.registry.create_pipe(handle, kind, codepage) {
                    tracing::debug!("CREATE: pipe failed: {err}");
                }
                Ok(Flow::Continue)
            }
            (EventType::DestroyPipe, _) => {
                if let Err(err) = self.registry.destroy_pipe(handle, kind) {
                    tracing::debug!("DESTROY: pipe failed: {err}");
                }
                Ok(Flow::Continue)
            }
            (EventType::ReadPipe, Aux::OutBuflen(out_buflen)) => {
                self.read_pipe(handle, kind, *out_buflen)
            }
            (EventType::WritePipe, _) => self.write_pipe(handle, kind, message),
            (EventType::IoctlPipe, Aux::OutBuflen(out_buflen)) => {
                self.ioctl_pipe(handle, kind, message, *out_buflen)
            }
            (
                EventType::LanmanPipe,
                Aux::Lanman {
                    out_buflen,
                    codepage,
                    username,
                },
            ) => self.lanman_pipe(handle, kind, message, *out_buflen, codepage, username),
            (EventType::UserDaemonExist, _) => {
                tracing::error!("another daemon already owns the control endpoint");
                Ok(Flow::Shutdown)
            }
            (EventType::InotifyRequest, Aux::Codepage(codepage)) => {
                if let Err(err) = self.notify.handle_request(
                    &self.link,
                    &self.encoder,
                    handle,
                    codepage,
                    &message.payload,
                ) {
                    tracing::error!("change-notify request failed: {err}");
                }
                Ok(Flow::Continue)
            }
            (event, _) => {
                tracing::error!("unexpected event {:?}", event);
                Ok(Flow::Continue)
            }
        }
    }

    fn read_pipe(&mut self, handle: u64, kind: PipeKind, out_buflen: u32) -> Result<Flow, LinkError> {
        let max_out = (out_buflen as usize).min(MAX_PAYLOAD);
        let (error, bytes) = match self.registry.find_pipe(handle, kind) {
            None => {
                tracing::debug!(pipe = ?kind, "READ: pipe lookup failed");
                (-libc::ENOENT, Vec::new())
            }
            Some(pipe) => match self.rpc.poll(pipe, max_out) {
                Ok(bytes) => (0, bytes),
                Err(err) => (-err.errno(), Vec::new()),
            },
        };

        let mut response = ControlHeader::new(EventType::ReadPipeRsp);
        response.server_handle = handle;
        response.pipe_kind = kind;
        response.error = error;
        response.buflen = bytes.len() as u32;
        response.aux = Aux::ReadCount(bytes.len() as u32);
        self.link.send(&response, &bytes)?;
        Ok(Flow::Continue)
    }

    fn write_pipe(
        &mut self,
        handle: u64,
        kind: PipeKind,
        message: &Message,
    ) -> Result<Flow, LinkError> {
        let error = match self.registry.find_pipe(handle, kind) {
            None => {
                tracing::debug!(pipe = ?kind, "WRITE: pipe lookup failed");
                -libc::ENOENT
            }
            Some(pipe) => match self.rpc.submit(pipe, &message.payload) {
                Ok(()) => 0,
                Err(err) => -err.errno(),
            },
        };

        let mut response = ControlHeader::new(EventType::WritePipeRsp);
        response.server_handle = handle;
        response.pipe_kind = kind;
        response.error = error;
        // The write count acknowledges the inbound bytes only on success.
        response.aux = Aux::WriteCount(if error == 0 { message.header.buflen } else { 0 });
        self.link.send(&response, &[])?;
        Ok(Flow::Continue)
    }

    fn ioctl_pipe(
        &mut self,
        handle: u64,
        kind: PipeKind,
        message: &Message,
        out_buflen: u32,
    ) -> Result<Flow, LinkError> {
        let max_out = (out_buflen as usize).min(MAX_PAYLOAD);
        let (error, bytes) = match self.registry.find_pipe(handle, kind) {
            None => {
                tracing::debug!(pipe = ?kind, "IOCTL: pipe lookup failed");
                (-libc::ENOENT, Vec::new())
            }
            Some(pipe) => match self
                .rpc
                .submit(pipe, &message.payload)
                .and_then(|()| self.rpc.poll(pipe, max_out))
            {
                Ok(bytes) => (0, bytes),
                Err(err) => (-err.errno(), Vec::new()),
            },
        };

        let mut response = ControlHeader::new(EventType::IoctlPipeRsp);
        response.server_handle = handle;
        response.pipe_kind = kind;
        response.error = error;
        response.buflen = bytes.len() as u32;
        response.aux = Aux::DataCount(bytes.len() as u32);
        self.link.send(&response, &bytes)?;
        Ok(Flow::Continue)
    }

    /// LANMAN transactions are self-contained: the pipe is created, the
    /// transaction runs, the response is sent, and the pipe is destroyed, in
    /// that order on every path.
    fn lanman_pipe(
        &mut self,
        handle: u64,
        kind: PipeKind,
        message: &Message,
        out_buflen: u32,
        codepage: &str,
        username: &str,
    ) -> Result<Flow, LinkError> {
        let max_out = (out_buflen as usize).min(MAX_PAYLOAD);
        let (error, data, param_count) = match self.registry.create_pipe(handle, kind, codepage) {
            Err(err) => {
                tracing::debug!("LANMAN: pipe creation failed: {err}");
                (-registry_errno(err), Vec::new(), 0)
            }
            Ok(pipe) => {
                pipe.set_username(username);
                match self.rpc.lanman(pipe, &message.payload, max_out) {
                    Ok(reply) => (0, reply.data, reply.param_count),
                    Err(err) => (-err.errno(), Vec::new(), 0),
                }
            }
        };

        let mut response = ControlHeader::new(EventType::LanmanPipeRsp);
        response.server_handle = handle;
        response.pipe_kind = kind;
        response.error = error;
        response.buflen = data.len() as u32;
        response.aux = Aux::Transaction {
            data_count: data.len() as u32,
            param_count,
        };
        let sent = self.link.send(&response, &data);

        if let Err(err) = self.registry.destroy_pipe(handle, kind) {
            tracing::debug!("LANMAN: pipe teardown failed: {err}");
        }
        sent?;
        Ok(Flow::Continue)
    }

    /// Read access to the registry for assertions and diagnostics.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

const fn registry_errno(error: RegistryError) -> i32 {
    match error {
        RegistryError::AlreadyExists => libc::EEXIST,
        RegistryError::NotFound => libc::ENOENT,
    }
}
