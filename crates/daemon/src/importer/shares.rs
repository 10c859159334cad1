//! Share configuration: lexing, serialization, and the local share list.
//!
//! The share file is `smb.conf`-like: `[name]` opens a share block, `;` and
//! `#` start comments, a trailing backslash joins physical lines. For the
//! kernel, each block is flattened into one buffer where every directive is
//! preceded by the byte `<` and the whole buffer ends with a NUL; the first
//! directive is always the synthetic `sharename = <name>` rewritten from the
//! section header. Blocks larger than [`PAGE_SIZE`] are split, and every
//! continuation chunk re-emits the share header so the kernel can stitch
//! chunks by name.

use std::fs;
use std::path::{Path, PathBuf};

use usmbd_protocol::EventType;

use super::{ConfigError, configure};
use crate::link::KernelLink;

/// Capacity of the per-share framing buffer, including its trailing NUL.
pub const PAGE_SIZE: usize = 4096;

const SHARE_NAME_MAX: usize = 64;
const SHARE_COMMENT_MAX: usize = 256;
const WORKGROUP_MAX: usize = 16;
const SERVER_STRING_MAX: usize = 64;

/// Name of the synthetic share every daemon exports.
pub const IPC_SHARE_NAME: &str = "IPC$";

/// Server-wide settings from the `[global]` section.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GlobalConfig {
    /// Workgroup advertised to clients.
    pub workgroup: String,
    /// Free-form server description.
    pub server_string: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            workgroup: String::from("WORKGROUP"),
            server_string: String::from("USMBD SERVER"),
        }
    }
}

/// One exported share.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Share {
    /// Share name.
    pub name: String,
    /// Human-readable description.
    pub comment: String,
    /// Exported directory; absent for synthetic shares.
    pub path: Option<PathBuf>,
}

/// Ordered list of exported shares. The synthetic `IPC$` entry always comes
/// first.
#[derive(Debug, Default)]
pub struct ShareList {
    shares: Vec<Share>,
}

impl ShareList {
    /// Creates the list with its leading `IPC$` entry.
    #[must_use]
    pub fn with_ipc_share() -> Self {
        let mut list = Self::default();
        list.add(Share {
            name: String::from(IPC_SHARE_NAME),
            comment: String::from("IPC$ share"),
            path: None,
        });
        list
    }

    /// Appends a share.
    pub fn add(&mut self, share: Share) {
        tracing::debug!(share = %share.name, "registered share");
        self.shares.push(share);
    }

    /// Looks a share up by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Share> {
        self.shares.iter().find(|share| share.name == name)
    }

    /// Iterates the shares in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &Share> {
        self.shares.iter()
    }

    /// Returns how many shares are registered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shares.len()
    }

    /// Returns whether no share is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }

    /// Releases every share.
    pub fn clear(&mut self) {
        self.shares.clear();
    }
}

/// One kernel-bound share block.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SerializedBlock {
    /// `<`-separated directives, NUL-terminated.
    pub bytes: Vec<u8>,
    /// Whether this chunk completes its share block. Only completing chunks
    /// feed the local share list.
    pub completes_block: bool,
}

/// Replays the share configuration file to the kernel.
///
/// Every serialized block is acknowledged individually; completing chunks
/// are additionally parsed into `shares` and `global` so the daemon mirrors
/// what the kernel accepted.
pub fn import_shares(
    link: &KernelLink,
    path: &Path,
    shares: &mut ShareList,
    global: &mut GlobalConfig,
) -> Result<(), ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_owned(),
        source,
    })?;

    for block in serialize_share_file(&contents) {
        let error = configure(
            link,
            EventType::ConfigShare,
            EventType::ConfigShareRsp,
            &block.bytes,
        )?;
        if error != 0 {
            tracing::error!(error, "share configuration failed");
        }
        if block.completes_block {
            parse_share_block(&block.bytes, shares, global);
        }
    }

    Ok(())
}

/// Serializes a share configuration file into kernel-bound blocks.
///
/// Blocks whose `path =` directive names a missing filesystem entry are
/// reported and withheld entirely. Touches the filesystem to validate
/// paths.
#[must_use]
pub fn serialize_share_file(contents: &str) -> Vec<SerializedBlock> {
    let mut writer = BlockWriter::default();
    for line in logical_lines(contents) {
        match lex_line(&line) {
            None => {}
            Some(Lexed::Header(name)) => {
                writer.finish_block();
                writer.begin_share(&name);
            }
            Some(Lexed::Directive(text)) => writer.append_directive(&text),
        }
    }
    writer.finish_block();
    writer.out
}

/// Folds backslash continuations into logical lines.
fn logical_lines(contents: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut lines = contents.lines();
    while let Some(line) = lines.next() {
        match line.strip_suffix('\\') {
            None => out.push(line.to_owned()),
            Some(head) => {
                let mut joined = head.to_owned();
                for next in lines.by_ref() {
                    match next.strip_suffix('\\') {
                        Some(head) => joined.push_str(head),
                        None => {
                            joined.push_str(next);
                            break;
                        }
                    }
                }
                out.push(joined);
            }
        }
    }
    out
}

enum Lexed {
    /// A `[name]` section header, brackets removed.
    Header(String),
    /// A directive line, comment-stripped and trimmed.
    Directive(String),
}

fn lex_line(line: &str) -> Option<Lexed> {
    let mut start = None;
    for (index, ch) in line.char_indices() {
        if ch == ';' || ch == '#' {
            return None;
        }
        if ch == '[' || ch.is_ascii_alphanumeric() {
            start = Some(index);
            break;
        }
    }
    let rest = &line[start?..];
    let end = rest.find([';', '#']).unwrap_or(rest.len());
    let text = rest[..end].trim_end();
    if text.is_empty() {
        return None;
    }

    if text.starts_with('[') {
        let name: String = text.chars().filter(|ch| *ch != '[' && *ch != ']').collect();
        Some(Lexed::Header(name.trim().to_owned()))
    } else {
        Some(Lexed::Directive(text.to_owned()))
    }
}

#[derive(Default)]
struct BlockWriter {
    buf: Vec<u8>,
    header_line: String,
    share_name: String,
    path_failed: bool,
    path_seen: bool,
    out: Vec<SerializedBlock>,
}

impl BlockWriter {
    fn begin_share(&mut self, name: &str) {
        self.share_name = name.to_owned();
        self.header_line = format!("sharename = {name}");
        // The global pseudo-share carries no path.
        self.path_seen = name.eq_ignore_ascii_case("global");
        let header = self.header_line.clone();
        self.append_directive(&header);
    }

    fn append_directive(&mut self, text: &str) {
        if !self.path_seen {
            if let Some(value) = directive_value(text, "path") {
                self.path_seen = true;
                if let Err(err) = fs::metadata(value) {
                    tracing::error!(
                        "failed to add share '{}': {}: {}",
                        self.share_name,
                        value,
                        err
                    );
                    self.path_failed = true;
                }
            }
        }

        // Separator, directive, and the eventual NUL must fit the page.
        if self.buf.len() + text.len() + 1 >= PAGE_SIZE {
            self.flush_chunk();
            if self.buf.len() + text.len() + 1 >= PAGE_SIZE {
                tracing::error!(share = %self.share_name, "directive exceeds the framing buffer");
                return;
            }
        }
        self.buf.push(b'<');
        self.buf.extend_from_slice(text.as_bytes());
    }

    /// Emits the buffer as a continuation chunk and re-seeds it with the
    /// share header so the kernel can stitch the chunks together.
    fn flush_chunk(&mut self) {
        if !self.buf.is_empty() && !self.path_failed {
            let mut bytes = std::mem::take(&mut self.buf);
            bytes.push(0);
            self.out.push(SerializedBlock {
                bytes,
                completes_block: false,
            });
        }
        self.buf.clear();
        if !self.header_line.is_empty() {
            self.buf.push(b'<');
            self.buf.extend_from_slice(self.header_line.as_bytes());
        }
    }

    fn finish_block(&mut self) {
        if !self.buf.is_empty() && !self.path_failed {
            let mut bytes = std::mem::take(&mut self.buf);
            bytes.push(0);
            self.out.push(SerializedBlock {
                bytes,
                completes_block: true,
            });
        }
        self.buf.clear();
        self.header_line.clear();
        self.share_name.clear();
        self.path_failed = false;
        self.path_seen = false;
    }
}

/// Applies one completed block to the local share list or, for the `global`
/// pseudo-share, to the server-wide settings.
pub fn parse_share_block(block: &[u8], shares: &mut ShareList, global: &mut GlobalConfig) {
    let body = block.strip_suffix(&[0]).unwrap_or(block);
    let text = String::from_utf8_lossy(body);
    let directives: Vec<&str> = text.split('<').filter(|part| !part.is_empty()).collect();

    let is_global = directives
        .first()
        .is_some_and(|first| first.eq_ignore_ascii_case("sharename = global"));
    if is_global {
        for directive in directives {
            if let Some(value) = directive_value(directive, "server string") {
                global.server_string = truncate(value, SERVER_STRING_MAX);
            } else if let Some(value) = directive_value(directive, "workgroup") {
                global.workgroup = truncate(value, WORKGROUP_MAX);
            }
        }
        return;
    }

    let mut name = None;
    let mut comment = None;
    let mut path = None;
    for directive in directives {
        if let Some(value) = directive_value(directive, "sharename") {
            name = Some(value);
        } else if let Some(value) = directive_value(directive, "comment") {
            comment = Some(value);
        } else if let Some(value) = directive_value(directive, "path") {
            path = Some(value);
        }
    }
    if let Some(name) = name {
        shares.add(Share {
            name: truncate(name, SHARE_NAME_MAX),
            comment: truncate(comment.unwrap_or_default(), SHARE_COMMENT_MAX),
            path: path.map(PathBuf::from),
        });
    }
}

/// Returns the value of `directive` when its key matches `key`
/// case-insensitively.
fn directive_value<'a>(directive: &'a str, key: &str) -> Option<&'a str> {
    let (candidate, value) = directive.split_once('=')?;
    if candidate.trim().eq_ignore_ascii_case(key) {
        Some(value.trim())
    } else {
        None
    }
}

fn truncate(value: &str, max: usize) -> String {
    if value.len() <= max {
        return value.to_owned();
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_owned()
}
