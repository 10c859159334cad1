use super::WireError;

/// Control-message discriminants used by both directions of the channel.
///
/// Values are part of the wire contract with the kernel module and must not
/// be renumbered.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum EventType {
    /// Daemon announces itself after opening the channel.
    DaemonUp = 1,
    /// Daemon announces teardown before closing the channel.
    DaemonDown = 2,
    /// One serialized users-database entry.
    ConfigUser = 3,
    /// Kernel acknowledgement of [`EventType::ConfigUser`].
    ConfigUserRsp = 4,
    /// One serialized share-configuration block.
    ConfigShare = 5,
    /// Kernel acknowledgement of [`EventType::ConfigShare`].
    ConfigShareRsp = 6,
    /// Open a DCE/RPC pipe for a session.
    CreatePipe = 7,
    /// Close a DCE/RPC pipe.
    DestroyPipe = 8,
    /// Drain pending RPC response bytes from a pipe.
    ReadPipe = 9,
    /// Response to [`EventType::ReadPipe`].
    ReadPipeRsp = 10,
    /// Submit an RPC request to a pipe.
    WritePipe = 11,
    /// Response to [`EventType::WritePipe`].
    WritePipeRsp = 12,
    /// Combined submit-and-drain round trip.
    IoctlPipe = 13,
    /// Response to [`EventType::IoctlPipe`].
    IoctlPipeRsp = 14,
    /// Single-transaction LANMAN request.
    LanmanPipe = 15,
    /// Response to [`EventType::LanmanPipe`].
    LanmanPipeRsp = 16,
    /// Kernel reports that a daemon already owns the endpoint.
    UserDaemonExist = 17,
    /// Register a directory-change watch for a session.
    InotifyRequest = 18,
    /// One directory-change notification for a session.
    InotifyResponse = 19,
}

impl EventType {
    /// Returns the wire discriminant.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self as u32
    }

    /// Maps a wire discriminant back onto the enum.
    pub const fn from_raw(raw: u32) -> Result<Self, WireError> {
        Ok(match raw {
            1 => Self::DaemonUp,
            2 => Self::DaemonDown,
            3 => Self::ConfigUser,
            4 => Self::ConfigUserRsp,
            5 => Self::ConfigShare,
            6 => Self::ConfigShareRsp,
            7 => Self::CreatePipe,
            8 => Self::DestroyPipe,
            9 => Self::ReadPipe,
            10 => Self::ReadPipeRsp,
            11 => Self::WritePipe,
            12 => Self::WritePipeRsp,
            13 => Self::IoctlPipe,
            14 => Self::IoctlPipeRsp,
            15 => Self::LanmanPipe,
            16 => Self::LanmanPipeRsp,
            17 => Self::UserDaemonExist,
            18 => Self::InotifyRequest,
            19 => Self::InotifyResponse,
            other => return Err(WireError::UnknownEvent(other)),
        })
    }
}

/// DCE/RPC pipe discriminants.
///
/// The first four values are fixed by the kernel interface; RPC collaborators
/// may define further kinds, which round-trip through [`PipeKind::Other`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum PipeKind {
    /// Server service pipe.
    Srvsvc,
    /// Workstation service pipe.
    Wkssvc,
    /// Remote registry pipe.
    Winreg,
    /// LANMAN transaction pipe.
    Lanman,
    /// A kind defined by the RPC collaborator.
    Other(u32),
}

impl PipeKind {
    /// Returns the wire discriminant.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        match self {
            Self::Srvsvc => 0,
            Self::Wkssvc => 1,
            Self::Winreg => 2,
            Self::Lanman => 3,
            Self::Other(raw) => raw,
        }
    }

    /// Maps a wire discriminant onto the enum, preserving unknown values.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::Srvsvc,
            1 => Self::Wkssvc,
            2 => Self::Winreg,
            3 => Self::Lanman,
            other => Self::Other(other),
        }
    }
}
