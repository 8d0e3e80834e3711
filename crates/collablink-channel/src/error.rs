use collablink_transport::SessionId;

/// Errors surfaced by the session layer and the transport adapter.
///
/// Malformed or out-of-sequence inbound frames also travel through these
/// variants, but the adapter logs and drops them instead of propagating —
/// only outbound and registry operations return them to callers.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Wire-format error from the frame layer.
    #[error(transparent)]
    Frame(#[from] collablink_frame::FrameError),

    /// Failure reported by the underlying session transport.
    #[error(transparent)]
    Transport(#[from] collablink_transport::TransportError),

    /// No session record exists for the given id.
    #[error("unknown session {0}")]
    UnknownSession(SessionId),

    /// No session record exists for the given peer.
    #[error("no session for peer {0:?}")]
    UnknownPeer(String),

    /// The frame's declared payload length does not match the bytes received.
    #[error("frame length mismatch (header says {expected} bytes, got {actual})")]
    FrameLengthMismatch { expected: usize, actual: usize },

    /// A single-frame message whose data_len disagrees with total_len.
    #[error("single-frame message inconsistent (data_len {data_len}, total_len {total_len})")]
    SingleFrameMismatch { data_len: u32, total_len: u32 },

    /// A frame carried a fragment flag that is not valid at this point.
    #[error("unexpected fragment flag {0:?}")]
    UnexpectedFragFlag(collablink_frame::FragFlag),

    /// A mid/end fragment arrived with no reassembly in progress.
    #[error("fragment arrived while not reassembling")]
    NotReassembling,

    /// The fragment's seq_num differs from the message being reassembled.
    #[error("seq_num mismatch (expected {expected}, got {actual})")]
    SeqMismatch { expected: u32, actual: u32 },

    /// The fragment's sub_seq is not the successor of the previous one.
    #[error("sub_seq mismatch (expected {expected}, got {actual})")]
    SubSeqMismatch { expected: u16, actual: u16 },

    /// The fragment's total_len differs from the one recorded at start.
    #[error("total_len changed mid-message (expected {expected}, got {actual})")]
    TotalLenChanged { expected: u32, actual: u32 },

    /// Appending the fragment would run past the message's total length.
    #[error("fragment overruns message ({offset} + {data_len} > total {total_len})")]
    ReassemblyOverflow {
        offset: usize,
        data_len: u32,
        total_len: u32,
    },

    /// The transport's max payload size leaves no room for progress.
    #[error("send window too small (max {max} <= reserved margin {margin})")]
    SendWindowTooSmall { max: u32, margin: u32 },

    /// The payload passed to send exceeds what a u32 total_len can carry.
    #[error("payload too large to frame ({size} bytes)")]
    PayloadTooLarge { size: usize },
}

pub type Result<T> = std::result::Result<T, ChannelError>;
