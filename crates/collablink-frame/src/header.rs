use bytes::{BufMut, BytesMut};
use tracing::warn;

use crate::error::{FrameError, Result};

/// Protocol version written into every header.
pub const PROTOCOL_VERSION: u16 = 1;

/// Fixed header length: seven TLV fields, each `u16 type | u16 len | value`.
///
/// Value widths: u16 + u8 + u32 + u32 + u32 + u16 + u32 = 21 bytes,
/// plus 7 * 4 bytes of TLV framing = 49 bytes.
pub const HEADER_LEN: usize = 49;

/// Maximum payload carried by a single frame: 4 MiB.
pub const MAX_FRAME_PAYLOAD: u32 = 4 * 1024 * 1024;

/// Maximum length of a whole logical message: 100 MiB.
pub const MAX_MESSAGE_LEN: u32 = 100 * 1024 * 1024;

/// Classifies a frame's position within a logical message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FragFlag {
    /// Reserved, never sent.
    None = 0,
    /// First fragment of a multi-frame message.
    Start = 1,
    /// Middle fragment.
    Mid = 2,
    /// Last fragment.
    End = 3,
    /// Sole frame of a single-frame message.
    StartEnd = 4,
}

impl TryFrom<u8> for FragFlag {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Start),
            2 => Ok(Self::Mid),
            3 => Ok(Self::End),
            4 => Ok(Self::StartEnd),
            other => Err(FrameError::InvalidFragFlag(other)),
        }
    }
}

/// TLV type codes for the seven header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum TlvType {
    Version = 1001,
    FragFlag = 1002,
    DataType = 1003,
    SeqNum = 1004,
    TotalLen = 1005,
    SubSeq = 1006,
    DataLen = 1007,
}

/// One wire-format frame header.
///
/// Every multi-byte scalar in a TLV value slot is big-endian on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionHeader {
    /// Protocol version, currently [`PROTOCOL_VERSION`].
    pub version: u16,
    /// Fragment classification for this frame.
    pub frag_flag: FragFlag,
    /// Caller-defined message kind, routed to listeners by service type.
    pub data_type: u32,
    /// Identifies one logical message across all of its fragments.
    pub seq_num: u32,
    /// Full message length in bytes.
    pub total_len: u32,
    /// Fragment index within the message, starting at 0.
    pub sub_seq: u16,
    /// Length of this frame's payload.
    pub data_len: u32,
}

impl SessionHeader {
    /// Append the 49-byte encoded header to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_LEN);
        put_tlv_u16(dst, TlvType::Version, self.version);
        put_tlv_u8(dst, TlvType::FragFlag, self.frag_flag as u8);
        put_tlv_u32(dst, TlvType::DataType, self.data_type);
        put_tlv_u32(dst, TlvType::SeqNum, self.seq_num);
        put_tlv_u32(dst, TlvType::TotalLen, self.total_len);
        put_tlv_u16(dst, TlvType::SubSeq, self.sub_seq);
        put_tlv_u32(dst, TlvType::DataLen, self.data_len);
    }

    /// Decode a header from the first [`HEADER_LEN`] bytes of `src`.
    ///
    /// Walks the TLV fields left to right over the fixed-length prefix;
    /// every read is bounds-checked against the remaining header bytes.
    /// Enforces the per-frame and whole-message size limits.
    pub fn decode(src: &[u8]) -> Result<Self> {
        if src.len() < HEADER_LEN {
            return Err(FrameError::FrameTooShort {
                len: src.len(),
                header_len: HEADER_LEN,
            });
        }

        let mut header = Self {
            version: 0,
            frag_flag: FragFlag::None,
            data_type: 0,
            seq_num: 0,
            total_len: 0,
            sub_seq: 0,
            data_len: 0,
        };

        let mut cursor = &src[..HEADER_LEN];
        while cursor.len() >= 4 {
            let tlv_type = u16::from_be_bytes([cursor[0], cursor[1]]);
            let len = u16::from_be_bytes([cursor[2], cursor[3]]);
            cursor = &cursor[4..];

            if usize::from(len) > cursor.len() {
                return Err(FrameError::TlvOverrun {
                    tlv_type,
                    len,
                    remaining: cursor.len(),
                });
            }
            let value = &cursor[..usize::from(len)];
            cursor = &cursor[usize::from(len)..];

            match tlv_type {
                t if t == TlvType::Version as u16 => {
                    header.version = read_u16(tlv_type, len, value)?;
                }
                t if t == TlvType::FragFlag as u16 => {
                    let raw = read_u8(tlv_type, len, value)?;
                    header.frag_flag = FragFlag::try_from(raw)?;
                }
                t if t == TlvType::DataType as u16 => {
                    header.data_type = read_u32(tlv_type, len, value)?;
                }
                t if t == TlvType::SeqNum as u16 => {
                    header.seq_num = read_u32(tlv_type, len, value)?;
                }
                t if t == TlvType::TotalLen as u16 => {
                    header.total_len = read_u32(tlv_type, len, value)?;
                }
                t if t == TlvType::SubSeq as u16 => {
                    header.sub_seq = read_u16(tlv_type, len, value)?;
                }
                t if t == TlvType::DataLen as u16 => {
                    header.data_len = read_u32(tlv_type, len, value)?;
                }
                other => return Err(FrameError::UnknownTlvType(other)),
            }
        }

        if header.version != PROTOCOL_VERSION {
            // A newer peer may speak a later version; the version-1 layout
            // is the compatibility baseline, so keep going.
            warn!(version = header.version, "header version ahead of ours");
        }
        if header.data_len > MAX_FRAME_PAYLOAD {
            return Err(FrameError::PayloadTooLarge {
                data_len: header.data_len,
                max: MAX_FRAME_PAYLOAD,
            });
        }
        if header.total_len > MAX_MESSAGE_LEN {
            return Err(FrameError::MessageTooLarge {
                total_len: header.total_len,
                max: MAX_MESSAGE_LEN,
            });
        }
        if header.data_len > header.total_len {
            return Err(FrameError::InconsistentLengths {
                reason: "data_len exceeds total_len",
            });
        }
        Ok(header)
    }
}

fn put_tlv_u8(dst: &mut BytesMut, tlv_type: TlvType, value: u8) {
    dst.put_u16(tlv_type as u16);
    dst.put_u16(1);
    dst.put_u8(value);
}

fn put_tlv_u16(dst: &mut BytesMut, tlv_type: TlvType, value: u16) {
    dst.put_u16(tlv_type as u16);
    dst.put_u16(2);
    dst.put_u16(value);
}

fn put_tlv_u32(dst: &mut BytesMut, tlv_type: TlvType, value: u32) {
    dst.put_u16(tlv_type as u16);
    dst.put_u16(4);
    dst.put_u32(value);
}

fn read_u8(tlv_type: u16, len: u16, value: &[u8]) -> Result<u8> {
    if len != 1 {
        return Err(FrameError::TlvWidthMismatch {
            tlv_type,
            len,
            expected: 1,
        });
    }
    Ok(value[0])
}

fn read_u16(tlv_type: u16, len: u16, value: &[u8]) -> Result<u16> {
    if len != 2 {
        return Err(FrameError::TlvWidthMismatch {
            tlv_type,
            len,
            expected: 2,
        });
    }
    Ok(u16::from_be_bytes([value[0], value[1]]))
}

fn read_u32(tlv_type: u16, len: u16, value: &[u8]) -> Result<u32> {
    if len != 4 {
        return Err(FrameError::TlvWidthMismatch {
            tlv_type,
            len,
            expected: 4,
        });
    }
    Ok(u32::from_be_bytes([value[0], value[1], value[2], value[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SessionHeader {
        SessionHeader {
            version: PROTOCOL_VERSION,
            frag_flag: FragFlag::StartEnd,
            data_type: 7,
            seq_num: 42,
            total_len: 1024,
            sub_seq: 0,
            data_len: 1024,
        }
    }

    #[test]
    fn encode_is_fixed_length() {
        let mut buf = BytesMut::new();
        sample().encode(&mut buf);
        assert_eq!(buf.len(), HEADER_LEN);
    }

    #[test]
    fn roundtrip() {
        let header = SessionHeader {
            version: PROTOCOL_VERSION,
            frag_flag: FragFlag::Mid,
            data_type: 0xDEAD_BEEF,
            seq_num: u32::MAX,
            total_len: MAX_MESSAGE_LEN,
            sub_seq: u16::MAX,
            data_len: MAX_FRAME_PAYLOAD,
        };
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        let decoded = SessionHeader::decode(&buf).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn wire_layout_is_big_endian_tlv() {
        let mut buf = BytesMut::new();
        sample().encode(&mut buf);
        // First field: type 1001 (0x03E9), len 2, value = version 1.
        assert_eq!(&buf[..6], &[0x03, 0xE9, 0x00, 0x02, 0x00, 0x01]);
        // Second field: type 1002, len 1, value = frag flag 4 (StartEnd).
        assert_eq!(&buf[6..11], &[0x03, 0xEA, 0x00, 0x01, 0x04]);
    }

    #[test]
    fn decode_rejects_short_input() {
        let err = SessionHeader::decode(&[0u8; HEADER_LEN - 1]).unwrap_err();
        assert!(matches!(err, FrameError::FrameTooShort { .. }));
    }

    #[test]
    fn decode_rejects_tlv_overrun() {
        let mut buf = BytesMut::new();
        sample().encode(&mut buf);
        // Inflate the declared length of the last field (data_len) so it
        // claims more bytes than remain in the header.
        let len_pos = HEADER_LEN - 6;
        buf[len_pos] = 0x00;
        buf[len_pos + 1] = 0x20;
        let err = SessionHeader::decode(&buf).unwrap_err();
        assert!(matches!(err, FrameError::TlvOverrun { .. }));
    }

    #[test]
    fn decode_rejects_unknown_tlv_type() {
        let mut buf = BytesMut::new();
        sample().encode(&mut buf);
        buf[0] = 0x7F;
        let err = SessionHeader::decode(&buf).unwrap_err();
        assert!(matches!(err, FrameError::UnknownTlvType(_)));
    }

    #[test]
    fn decode_rejects_bad_frag_flag() {
        let mut buf = BytesMut::new();
        sample().encode(&mut buf);
        // Frag flag value byte is the 11th byte (after one 6-byte field
        // and the 4-byte TLV framing of the flag field).
        buf[10] = 9;
        let err = SessionHeader::decode(&buf).unwrap_err();
        assert!(matches!(err, FrameError::InvalidFragFlag(9)));
    }

    #[test]
    fn decode_rejects_oversize_payload() {
        let mut header = sample();
        header.data_len = MAX_FRAME_PAYLOAD + 1;
        header.total_len = MAX_MESSAGE_LEN;
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        let err = SessionHeader::decode(&buf).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
    }

    #[test]
    fn decode_rejects_oversize_message() {
        let mut header = sample();
        header.data_len = 16;
        header.total_len = MAX_MESSAGE_LEN + 1;
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        let err = SessionHeader::decode(&buf).unwrap_err();
        assert!(matches!(err, FrameError::MessageTooLarge { .. }));
    }

    #[test]
    fn decode_rejects_data_len_over_total_len() {
        let mut header = sample();
        header.data_len = 1025;
        header.total_len = 1024;
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        let err = SessionHeader::decode(&buf).unwrap_err();
        assert!(matches!(
            err,
            FrameError::InconsistentLengths {
                reason: "data_len exceeds total_len"
            }
        ));
    }

    #[test]
    fn decode_tolerates_newer_version() {
        let mut header = sample();
        header.version = PROTOCOL_VERSION + 1;
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        let decoded = SessionHeader::decode(&buf).unwrap();
        assert_eq!(decoded.version, PROTOCOL_VERSION + 1);
        assert_eq!(decoded.data_len, header.data_len);
    }
}
