//! Local account resolution collaborator.

use std::ffi::CString;

/// Numeric identity of a local account.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Account {
    /// User id.
    pub uid: u32,
    /// Primary group id.
    pub gid: u32,
}

/// Resolves account names against a user database.
pub trait AccountResolver {
    /// Returns the account's numeric identity, or `None` when the name is
    /// unknown.
    fn resolve(&self, name: &str) -> Option<Account>;
}

/// Resolver backed by the host account database via `getpwnam_r`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemAccounts;

#[allow(unsafe_code)]
impl AccountResolver for SystemAccounts {
    fn resolve(&self, name: &str) -> Option<Account> {
        let name = CString::new(name).ok()?;
        let mut passwd: libc::passwd = unsafe { std::mem::zeroed() };
        let mut result: *mut libc::passwd = std::ptr::null_mut();
        let mut buf = vec![0u8; 1024];

        loop {
            let rc = unsafe {
                libc::getpwnam_r(
                    name.as_ptr(),
                    &mut passwd,
                    buf.as_mut_ptr().cast::<libc::c_char>(),
                    buf.len(),
                    &mut result,
                )
            };
            if rc == libc::ERANGE {
                buf.resize(buf.len() * 2, 0);
                continue;
            }
            if rc != 0 || result.is_null() {
                return None;
            }
            return Some(Account {
                uid: passwd.pw_uid,
                gid: passwd.pw_gid,
            });
        }
    }
}
