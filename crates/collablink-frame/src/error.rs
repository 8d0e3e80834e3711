/// Errors that can occur in buffer handling and header encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A buffer was requested with zero capacity or above the hard cap.
    #[error("invalid buffer capacity ({capacity} bytes, max {max})")]
    InvalidCapacity { capacity: usize, max: usize },

    /// A `set_range` call would exceed the buffer's capacity.
    #[error("range out of bounds (offset {offset} + size {size} > capacity {capacity})")]
    RangeOutOfBounds {
        offset: usize,
        size: usize,
        capacity: usize,
    },

    /// The frame is shorter than the fixed header length.
    #[error("frame too short ({len} bytes, header needs {header_len})")]
    FrameTooShort { len: usize, header_len: usize },

    /// A TLV field's declared length would overrun the header bytes.
    #[error("tlv field overruns header (type {tlv_type}, len {len}, remaining {remaining})")]
    TlvOverrun {
        tlv_type: u16,
        len: u16,
        remaining: usize,
    },

    /// A TLV field's declared length does not match the field's width.
    #[error("tlv field width mismatch (type {tlv_type}, len {len}, expected {expected})")]
    TlvWidthMismatch {
        tlv_type: u16,
        len: u16,
        expected: u16,
    },

    /// The header contains a TLV type this version does not know.
    #[error("unknown tlv type {0}")]
    UnknownTlvType(u16),

    /// The fragment-flag byte is not a defined flag.
    #[error("invalid fragment flag 0x{0:02X}")]
    InvalidFragFlag(u8),

    /// The per-frame payload length exceeds the limit.
    #[error("frame payload too large ({data_len} bytes, max {max})")]
    PayloadTooLarge { data_len: u32, max: u32 },

    /// The whole-message length exceeds the limit.
    #[error("message too large ({total_len} bytes, max {max})")]
    MessageTooLarge { total_len: u32, max: u32 },

    /// The header's length fields contradict each other or the frame size.
    #[error("inconsistent header lengths ({reason})")]
    InconsistentLengths { reason: &'static str },
}

pub type Result<T> = std::result::Result<T, FrameError>;
