//! Users-database import.

use std::fs;
use std::path::Path;

use usmbd_protocol::EventType;

use super::account::AccountResolver;
use super::{ConfigError, configure};
use crate::link::KernelLink;

/// Largest uid/gid the kernel interface can represent.
const ID_LIMIT: u32 = 65535;

/// Replays every users-database entry to the kernel.
///
/// Entries whose account resolves locally gain a `:<uid>:<gid>\n` suffix;
/// unresolvable accounts are sent unchanged. Entries whose uid or gid does
/// not fit in 16 bits are logged and withheld.
pub fn import_users(
    link: &KernelLink,
    resolver: &dyn AccountResolver,
    path: &Path,
) -> Result<(), ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_owned(),
        source,
    })?;

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        let Some((account, _)) = line.split_once(':') else {
            tracing::warn!(entry = line, "skipping users-db entry without fields");
            continue;
        };

        let entry = match resolver.resolve(account) {
            Some(ids) if ids.uid > ID_LIMIT || ids.gid > ID_LIMIT => {
                tracing::error!("over limit uid : {}, gid : {}", ids.uid, ids.gid);
                continue;
            }
            Some(ids) => format!("{line}:{}:{}\n", ids.uid, ids.gid),
            None => line.to_owned(),
        };

        let error = configure(
            link,
            EventType::ConfigUser,
            EventType::ConfigUserRsp,
            entry.as_bytes(),
        )?;
        if error != 0 {
            tracing::error!(account, error, "user configuration failed");
        }
    }

    Ok(())
}
