//! Raw `AF_NETLINK` datagram channel bound to the SMB control protocol.

#![allow(unsafe_code)]

use std::io::{self, Read};
use std::mem;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use super::Channel;

/// Netlink protocol number reserved for the SMB control channel. Shared with
/// the kernel module.
const NETLINK_USMBD: libc::c_int = 31;

/// Datagram endpoint talking to the in-kernel SMB server.
pub struct NetlinkChannel {
    socket: Socket,
    kernel: SockAddr,
}

impl NetlinkChannel {
    /// Opens the netlink socket and binds it to this process.
    pub fn open() -> io::Result<Self> {
        let socket = Socket::new(
            Domain::from(libc::AF_NETLINK),
            Type::RAW,
            Some(Protocol::from(NETLINK_USMBD)),
        )?;

        let local = netlink_addr(std::process::id())?;
        socket.bind(&local)?;
        let kernel = netlink_addr(0)?;

        Ok(Self { socket, kernel })
    }
}

fn netlink_addr(pid: u32) -> io::Result<SockAddr> {
    // SAFETY: sockaddr_nl fits in sockaddr_storage; storage is zeroed by
    // `try_init` before this closure runs, and the closure sets every
    // accessible field before reporting its length.
    let ((), addr) = unsafe {
        SockAddr::try_init(|storage, len| {
            let nl = storage.cast::<libc::sockaddr_nl>();
            (*nl).nl_family = libc::AF_NETLINK as libc::sa_family_t;
            (*nl).nl_pid = pid;
            (*nl).nl_groups = 0;
            *len = mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t;
            Ok(())
        })
    }?;
    Ok(addr)
}

impl Channel for NetlinkChannel {
    fn send(&self, frame: &[u8]) -> io::Result<usize> {
        self.socket.send_to(frame, &self.kernel)
    }

    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        (&self.socket).read(buf)
    }
}
