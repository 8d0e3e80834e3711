//! TLV session-header codec and range-addressed data buffers.
//!
//! This is the wire-format layer of collablink. Every frame carries a
//! fixed 49-byte header of seven TLV fields (big-endian values) followed
//! by a payload chunk; [`DataBuffer`] is how payloads travel between the
//! layers above without copying the whole allocation.

pub mod buffer;
pub mod error;
pub mod header;

pub use buffer::{DataBuffer, MAX_BUFFER_CAPACITY};
pub use error::{FrameError, Result};
pub use header::{
    FragFlag, SessionHeader, TlvType, HEADER_LEN, MAX_FRAME_PAYLOAD, MAX_MESSAGE_LEN,
    PROTOCOL_VERSION,
};
