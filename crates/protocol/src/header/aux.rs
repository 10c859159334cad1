use super::{
    AUX_LEN, CODEPAGE_LEN, EventType, USERNAME_LEN, WireError, get_fixed_str, put_fixed_str,
    read_u32,
};

const LANMAN_CODEPAGE_OFFSET: usize = 4;
const LANMAN_USERNAME_OFFSET: usize = LANMAN_CODEPAGE_OFFSET + CODEPAGE_LEN;

/// Event-specific scalar fields of the control header.
///
/// The wire reserves a fixed 68-byte block; which variant applies is decided
/// by the header's event type, never by the block contents.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Aux {
    /// Events that define no auxiliary fields.
    None,
    /// `CREATE_PIPE` / `INOTIFY_REQUEST`: session codepage label.
    Codepage(String),
    /// `READ_PIPE` / `IOCTL_PIPE`: response buffer capacity offered by the kernel.
    OutBuflen(u32),
    /// `LANMAN_PIPE`: buffer capacity plus session codepage and SMB user.
    Lanman {
        /// Response buffer capacity offered by the kernel.
        out_buflen: u32,
        /// Session codepage label.
        codepage: String,
        /// Authenticated SMB account the transaction runs as.
        username: String,
    },
    /// `READ_PIPE_RSP`: bytes produced by the RPC collaborator.
    ReadCount(u32),
    /// `WRITE_PIPE_RSP`: bytes consumed from the inbound payload.
    WriteCount(u32),
    /// `IOCTL_PIPE_RSP`: bytes produced by the combined round trip.
    DataCount(u32),
    /// `LANMAN_PIPE_RSP`: data and parameter section lengths.
    Transaction {
        /// Bytes in the data section.
        data_count: u32,
        /// Bytes in the parameter section.
        param_count: u32,
    },
}

impl Aux {
    pub(super) fn encode_for(&self, event: EventType, slot: &mut [u8]) -> Result<(), WireError> {
        debug_assert!(slot.len() >= AUX_LEN);
        match (event, self) {
            (EventType::CreatePipe | EventType::InotifyRequest, Self::Codepage(codepage)) => {
                put_fixed_str(&mut slot[..CODEPAGE_LEN], codepage)
            }
            (EventType::ReadPipe | EventType::IoctlPipe, Self::OutBuflen(len)) => {
                slot[..4].copy_from_slice(&len.to_ne_bytes());
                Ok(())
            }
            (
                EventType::LanmanPipe,
                Self::Lanman {
                    out_buflen,
                    codepage,
                    username,
                },
            ) => {
                slot[..4].copy_from_slice(&out_buflen.to_ne_bytes());
                put_fixed_str(
                    &mut slot[LANMAN_CODEPAGE_OFFSET..LANMAN_CODEPAGE_OFFSET + CODEPAGE_LEN],
                    codepage,
                )?;
                put_fixed_str(
                    &mut slot[LANMAN_USERNAME_OFFSET..LANMAN_USERNAME_OFFSET + USERNAME_LEN],
                    username,
                )
            }
            (EventType::ReadPipeRsp, Self::ReadCount(count))
            | (EventType::WritePipeRsp, Self::WriteCount(count))
            | (EventType::IoctlPipeRsp, Self::DataCount(count)) => {
                slot[..4].copy_from_slice(&count.to_ne_bytes());
                Ok(())
            }
            (
                EventType::LanmanPipeRsp,
                Self::Transaction {
                    data_count,
                    param_count,
                },
            ) => {
                slot[..4].copy_from_slice(&data_count.to_ne_bytes());
                slot[4..8].copy_from_slice(&param_count.to_ne_bytes());
                Ok(())
            }
            (_, Self::None) if !event_has_aux(event) => Ok(()),
            _ => Err(WireError::AuxMismatch(event)),
        }
    }

    pub(super) fn decode_for(event: EventType, slot: &[u8]) -> Self {
        debug_assert!(slot.len() >= AUX_LEN);
        match event {
            EventType::CreatePipe | EventType::InotifyRequest => {
                Self::Codepage(get_fixed_str(&slot[..CODEPAGE_LEN]))
            }
            EventType::ReadPipe | EventType::IoctlPipe => Self::OutBuflen(read_u32(slot, 0)),
            EventType::LanmanPipe => Self::Lanman {
                out_buflen: read_u32(slot, 0),
                codepage: get_fixed_str(
                    &slot[LANMAN_CODEPAGE_OFFSET..LANMAN_CODEPAGE_OFFSET + CODEPAGE_LEN],
                ),
                username: get_fixed_str(
                    &slot[LANMAN_USERNAME_OFFSET..LANMAN_USERNAME_OFFSET + USERNAME_LEN],
                ),
            },
            EventType::ReadPipeRsp => Self::ReadCount(read_u32(slot, 0)),
            EventType::WritePipeRsp => Self::WriteCount(read_u32(slot, 0)),
            EventType::IoctlPipeRsp => Self::DataCount(read_u32(slot, 0)),
            EventType::LanmanPipeRsp => Self::Transaction {
                data_count: read_u32(slot, 0),
                param_count: read_u32(slot, 4),
            },
            _ => Self::None,
        }
    }
}

const fn event_has_aux(event: EventType) -> bool {
    matches!(
        event,
        EventType::CreatePipe
            | EventType::InotifyRequest
            | EventType::ReadPipe
            | EventType::IoctlPipe
            | EventType::LanmanPipe
            | EventType::ReadPipeRsp
            | EventType::WritePipeRsp
            | EventType::IoctlPipeRsp
            | EventType::LanmanPipeRsp
    )
}
