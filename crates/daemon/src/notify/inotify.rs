//! Thin wrapper over the inotify syscalls.

#![allow(unsafe_code)]

use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

/// Size of the fixed part of `struct inotify_event`.
const EVENT_FIXED_LEN: usize = 16;

/// An inotify instance shared by every active watch.
pub(crate) struct WatchBackend {
    fd: OwnedFd,
}

/// One raw filesystem event.
#[derive(Clone, Debug)]
pub(crate) struct WatchEvent {
    pub wd: i32,
    pub mask: u32,
    /// Changed name in on-disk bytes; empty when the event names the watched
    /// directory itself.
    pub name: Vec<u8>,
}

impl WatchBackend {
    /// Creates a fresh inotify instance.
    pub(crate) fn init() -> io::Result<Self> {
        let fd = unsafe { libc::inotify_init1(libc::IN_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: inotify_init1 returned a fresh descriptor we now own.
        Ok(Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    /// Adds a watch on `path`, returning its watch descriptor.
    pub(crate) fn add_watch(&self, path: &[u8], mask: u32) -> io::Result<i32> {
        let cpath = CString::new(path.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL"))?;
        let wd = unsafe { libc::inotify_add_watch(self.fd.as_raw_fd(), cpath.as_ptr(), mask) };
        if wd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(wd)
    }

    /// Blocks until an event arrives and returns the first event of the
    /// read.
    ///
    /// Returns `Ok(None)` when that event carries no name, i.e. it happened
    /// on the watched directory itself rather than an entry inside it.
    pub(crate) fn read_event(&self) -> io::Result<Option<WatchEvent>> {
        let mut buf = [0u8; 4096];
        let received = unsafe {
            libc::read(
                self.fd.as_raw_fd(),
                buf.as_mut_ptr().cast::<libc::c_void>(),
                buf.len(),
            )
        };
        if received < 0 {
            return Err(io::Error::last_os_error());
        }
        let received = received as usize;
        if received < EVENT_FIXED_LEN {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "short read from the watch descriptor",
            ));
        }

        let wd = i32::from_ne_bytes(buf[0..4].try_into().unwrap());
        let mask = u32::from_ne_bytes(buf[4..8].try_into().unwrap());
        let len = u32::from_ne_bytes(buf[12..16].try_into().unwrap()) as usize;
        if len == 0 {
            return Ok(None);
        }

        let end = (EVENT_FIXED_LEN + len).min(received);
        let mut name = buf[EVENT_FIXED_LEN..end].to_vec();
        // The kernel pads names with NULs up to the declared length.
        while name.last() == Some(&0) {
            name.pop();
        }
        if name.is_empty() {
            return Ok(None);
        }
        Ok(Some(WatchEvent { wd, mask, name }))
    }
}
