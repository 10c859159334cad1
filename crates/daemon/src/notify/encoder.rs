//! Filename encoding collaborator.

use std::sync::Arc;

use super::NotifyError;

/// Converts filenames from a session codepage to the UTF-16LE bytes SMB2
/// `FileNotifyInformation` records carry.
pub trait FilenameEncoder: Send + Sync {
    /// Encodes `name` (on-disk bytes) according to `codepage`.
    fn encode_utf16le(&self, name: &[u8], codepage: &str) -> Result<Vec<u8>, NotifyError>;
}

/// Stock encoder backed by `encoding_rs`.
///
/// The codepage label is resolved through the WHATWG label registry;
/// unrecognised labels fall back to UTF-8. Undecodable byte sequences are
/// replaced rather than refused, matching the lossy conversion the kernel
/// side tolerates.
#[derive(Clone, Copy, Debug, Default)]
pub struct CodepageEncoder;

impl CodepageEncoder {
    /// Returns the encoder as a shareable trait handle.
    #[must_use]
    pub fn shared() -> Arc<dyn FilenameEncoder> {
        Arc::new(Self)
    }
}

impl FilenameEncoder for CodepageEncoder {
    fn encode_utf16le(&self, name: &[u8], codepage: &str) -> Result<Vec<u8>, NotifyError> {
        let encoding =
            encoding_rs::Encoding::for_label(codepage.as_bytes()).unwrap_or(encoding_rs::UTF_8);
        let (text, _, _) = encoding.decode(name);
        Ok(text.encode_utf16().flat_map(u16::to_le_bytes).collect())
    }
}
