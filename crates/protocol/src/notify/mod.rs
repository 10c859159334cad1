//! Change-notify payload records.
//!
//! An `INOTIFY_REQUEST` payload names the directory to watch and the SMB
//! completion filter selecting which changes the client cares about. The
//! matching `INOTIFY_RESPONSE` payload is an `output_buffer_length` header
//! followed by `FileNotifyInformation` records carrying the action and the
//! changed name in UTF-16LE.

use crate::header::{WireError, read_u32};

/// SMB completion-filter bits accepted in an `INOTIFY_REQUEST`.
pub mod filter {
    /// Filename creation, deletion, or rename within the directory.
    pub const FILE_NOTIFY_CHANGE_FILE_NAME: u32 = 0x0000_0001;
    /// Subdirectory creation, deletion, or rename.
    pub const FILE_NOTIFY_CHANGE_DIR_NAME: u32 = 0x0000_0002;
    /// Attribute changes.
    pub const FILE_NOTIFY_CHANGE_ATTRIBUTES: u32 = 0x0000_0004;
    /// File size changes.
    pub const FILE_NOTIFY_CHANGE_SIZE: u32 = 0x0000_0008;
    /// Last-write timestamp changes.
    pub const FILE_NOTIFY_CHANGE_LAST_WRITE: u32 = 0x0000_0010;
    /// Last-access timestamp changes.
    pub const FILE_NOTIFY_CHANGE_LAST_ACCESS: u32 = 0x0000_0020;
    /// Creation timestamp changes.
    pub const FILE_NOTIFY_CHANGE_CREATION: u32 = 0x0000_0040;
    /// Extended-attribute changes.
    pub const FILE_NOTIFY_CHANGE_EA: u32 = 0x0000_0080;
    /// Security-descriptor changes.
    pub const FILE_NOTIFY_CHANGE_SECURITY: u32 = 0x0000_0100;
}

/// SMB `FILE_ACTION_ADDED`: a name appeared in the directory.
pub const FILE_ACTION_ADDED: u32 = 1;
/// SMB `FILE_ACTION_REMOVED`: a name disappeared from the directory.
pub const FILE_ACTION_REMOVED: u32 = 2;
/// SMB `FILE_ACTION_MODIFIED`: an existing name changed.
pub const FILE_ACTION_MODIFIED: u32 = 3;

/// Fixed part of a `FileNotifyInformation` record, before the name bytes.
pub const NOTIFY_RECORD_FIXED_LEN: usize = 12;

/// Decoded `INOTIFY_REQUEST` payload.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NotifyRequest {
    /// SMB completion-filter bitmask.
    pub completion_filter: u32,
    /// Directory to watch, in the client's on-disk byte encoding.
    pub dir_path: Vec<u8>,
}

impl NotifyRequest {
    /// Decodes a request payload: `completion_filter`, `path_len`, path bytes.
    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        if payload.len() < 8 {
            return Err(WireError::Truncated {
                expected: 8,
                actual: payload.len(),
            });
        }
        let completion_filter = read_u32(payload, 0);
        let path_len = read_u32(payload, 4) as usize;
        let body = &payload[8..];
        if body.len() < path_len {
            return Err(WireError::Truncated {
                expected: 8 + path_len,
                actual: payload.len(),
            });
        }
        Ok(Self {
            completion_filter,
            dir_path: body[..path_len].to_vec(),
        })
    }

    /// Encodes the request payload.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(8 + self.dir_path.len());
        payload.extend_from_slice(&self.completion_filter.to_ne_bytes());
        payload.extend_from_slice(&(self.dir_path.len() as u32).to_ne_bytes());
        payload.extend_from_slice(&self.dir_path);
        payload
    }
}

/// One `FileNotifyInformation` record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileNotifyInformation {
    /// One of the `FILE_ACTION_*` values.
    pub action: u32,
    /// Changed name, already encoded as UTF-16LE.
    pub file_name: Vec<u8>,
}

impl FileNotifyInformation {
    /// Length of the encoded record.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        NOTIFY_RECORD_FIXED_LEN + self.file_name.len()
    }
}

/// `INOTIFY_RESPONSE` payload.
///
/// The daemon currently emits exactly one record per response with
/// `next_entry_offset = 0`; the codec nevertheless accepts a record list so
/// the framing does not change if batching is added.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NotifyResponse {
    /// Records delivered to the client.
    pub records: Vec<FileNotifyInformation>,
}

impl NotifyResponse {
    /// Wraps a single record, the shape every current response takes.
    #[must_use]
    pub fn single(action: u32, file_name: Vec<u8>) -> Self {
        Self {
            records: vec![FileNotifyInformation { action, file_name }],
        }
    }

    /// Encodes the payload: `output_buffer_length` then the records.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let records_len: usize = self.records.iter().map(FileNotifyInformation::encoded_len).sum();
        let mut payload = Vec::with_capacity(4 + records_len);
        payload.extend_from_slice(&(records_len as u32).to_ne_bytes());
        for record in &self.records {
            // next_entry_offset stays zero: one record per response.
            payload.extend_from_slice(&0u32.to_ne_bytes());
            payload.extend_from_slice(&record.action.to_ne_bytes());
            payload.extend_from_slice(&(record.file_name.len() as u32).to_ne_bytes());
            payload.extend_from_slice(&record.file_name);
        }
        payload
    }

    /// Decodes a payload produced by [`NotifyResponse::encode`].
    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        if payload.len() < 4 {
            return Err(WireError::Truncated {
                expected: 4,
                actual: payload.len(),
            });
        }
        let declared = read_u32(payload, 0) as usize;
        let mut body = &payload[4..];
        if body.len() < declared {
            return Err(WireError::Truncated {
                expected: 4 + declared,
                actual: payload.len(),
            });
        }

        let mut records = Vec::new();
        while body.len() >= NOTIFY_RECORD_FIXED_LEN {
            let action = read_u32(body, 4);
            let name_len = read_u32(body, 8) as usize;
            let rest = &body[NOTIFY_RECORD_FIXED_LEN..];
            if rest.len() < name_len {
                return Err(WireError::Truncated {
                    expected: NOTIFY_RECORD_FIXED_LEN + name_len,
                    actual: body.len(),
                });
            }
            records.push(FileNotifyInformation {
                action,
                file_name: rest[..name_len].to_vec(),
            });
            body = &rest[name_len..];
        }
        Ok(Self { records })
    }
}
