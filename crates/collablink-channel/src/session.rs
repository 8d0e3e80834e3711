use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use bytes::BytesMut;
use tracing::{debug, warn};

use collablink_frame::{
    DataBuffer, FragFlag, SessionHeader, HEADER_LEN, MAX_FRAME_PAYLOAD, PROTOCOL_VERSION,
};
use collablink_transport::{SessionId, SessionTransport};

use crate::error::{ChannelError, Result};

/// Identity of one peer connection, immutable after establishment.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub local_device_id: String,
    pub peer_device_id: String,
    pub session_name: String,
    pub is_server: bool,
}

/// Inbound reassembly scratch state.
///
/// Valid only between a `Start` and its matching `End`; any sequence break
/// resets it to empty so a garbled partial message can never leak upward.
#[derive(Default)]
struct Reassembly {
    waiting: bool,
    seq_num: u32,
    sub_seq: u16,
    offset: usize,
    total_len: u32,
    data_type: u32,
    buf: Option<DataBuffer>,
}

/// Per-peer framing and reassembly context.
///
/// Owns the outbound fragmentation loop and the inbound reassembly state
/// machine for one logical connection. The reassembly scratch is only ever
/// touched by frames from this session's single peer; the ref count tracks
/// how many logical users share the session.
pub struct Session {
    info: SessionInfo,
    service_type: u32,
    reserved_margin: u32,
    refs: AtomicU32,
    next_seq: AtomicU32,
    reassembly: Mutex<Reassembly>,
}

impl Session {
    /// Create a session record with an initial ref count of one.
    pub fn new(info: SessionInfo, service_type: u32, reserved_margin: u32) -> Self {
        Self {
            info,
            service_type,
            reserved_margin,
            refs: AtomicU32::new(1),
            next_seq: AtomicU32::new(0),
            reassembly: Mutex::new(Reassembly::default()),
        }
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn service_type(&self) -> u32 {
        self.service_type
    }

    /// Register another logical user of this session.
    pub fn acquire(&self) {
        self.refs.fetch_add(1, Ordering::AcqRel);
    }

    /// Drop one logical user. Returns true when the count reached zero and
    /// the session is safe to destroy.
    pub fn release(&self) -> bool {
        self.refs.fetch_sub(1, Ordering::AcqRel) == 1
    }

    pub fn ref_count(&self) -> u32 {
        self.refs.load(Ordering::Acquire)
    }

    /// Fragment `payload` into wire frames and send them on `transport`.
    ///
    /// The transport's maximum payload size is re-queried before every
    /// frame because it may be renegotiated between sends. Fails without
    /// retry if a send fails or the window shrinks below the reserved
    /// margin.
    pub fn send_data(
        &self,
        transport: &dyn SessionTransport,
        data_type: u32,
        payload: &DataBuffer,
    ) -> Result<()> {
        let bytes = payload.as_slice();
        let total_len =
            u32::try_from(bytes.len()).map_err(|_| ChannelError::PayloadTooLarge {
                size: bytes.len(),
            })?;
        let seq_num = self.next_seq.fetch_add(1, Ordering::Relaxed);

        let max = transport.max_payload_size(self.info.session_id)?;
        if bytes.len() <= MAX_FRAME_PAYLOAD as usize && bytes.len() + HEADER_LEN <= max as usize {
            self.send_frame(transport, FragFlag::StartEnd, data_type, seq_num, total_len, 0, bytes)?;
            return Ok(());
        }

        let first_chunk = self.chunk_size(max)?;
        self.send_frame(
            transport,
            FragFlag::Start,
            data_type,
            seq_num,
            total_len,
            0,
            &bytes[..first_chunk],
        )?;

        let mut offset = first_chunk;
        let mut sub_seq: u16 = 0;
        let mut frames: u64 = 1;
        while offset < bytes.len() {
            let max = transport.max_payload_size(self.info.session_id)?;
            let chunk = self.chunk_size(max)?;
            let remaining = bytes.len() - offset;
            let take = remaining.min(chunk);
            let flag = if remaining > chunk {
                FragFlag::Mid
            } else {
                FragFlag::End
            };
            // sub_seq wraps on messages longer than 65 536 frames; the
            // receiver checks successors with the same wrapping arithmetic.
            sub_seq = sub_seq.wrapping_add(1);
            frames += 1;
            self.send_frame(
                transport,
                flag,
                data_type,
                seq_num,
                total_len,
                sub_seq,
                &bytes[offset..offset + take],
            )?;
            offset += take;
        }
        debug!(
            session = self.info.session_id,
            seq_num,
            total_len,
            frames,
            "sent fragmented message"
        );
        Ok(())
    }

    fn chunk_size(&self, max: u32) -> Result<usize> {
        if max <= self.reserved_margin {
            return Err(ChannelError::SendWindowTooSmall {
                max,
                margin: self.reserved_margin,
            });
        }
        // A frame's payload may never exceed the per-frame cap, no matter
        // how large a window the transport advertises.
        Ok(((max - self.reserved_margin) as usize).min(MAX_FRAME_PAYLOAD as usize))
    }

    #[allow(clippy::too_many_arguments)]
    fn send_frame(
        &self,
        transport: &dyn SessionTransport,
        frag_flag: FragFlag,
        data_type: u32,
        seq_num: u32,
        total_len: u32,
        sub_seq: u16,
        chunk: &[u8],
    ) -> Result<()> {
        let header = SessionHeader {
            version: PROTOCOL_VERSION,
            frag_flag,
            data_type,
            seq_num,
            total_len,
            sub_seq,
            data_len: chunk.len() as u32,
        };
        let mut frame = BytesMut::with_capacity(HEADER_LEN + chunk.len());
        header.encode(&mut frame);
        frame.extend_from_slice(chunk);
        transport.send_raw(self.info.session_id, &frame)?;
        Ok(())
    }

    /// Feed one inbound wire frame into the reassembly state machine.
    ///
    /// Returns `Ok(Some((data_type, buffer)))` when the frame completed a
    /// message. Any malformed or out-of-sequence frame returns an error and
    /// leaves the reassembly state empty; callers log and drop it.
    pub fn on_bytes_received(&self, frame: &[u8]) -> Result<Option<(u32, DataBuffer)>> {
        let header = SessionHeader::decode(frame)?;
        let expected = header.data_len as usize + HEADER_LEN;
        if expected != frame.len() {
            return Err(ChannelError::FrameLengthMismatch {
                expected,
                actual: frame.len(),
            });
        }
        let payload = &frame[HEADER_LEN..];
        match header.frag_flag {
            FragFlag::StartEnd => self.recv_single(&header, payload),
            FragFlag::Start => self.recv_start(&header, payload),
            FragFlag::Mid => self.recv_continuation(&header, payload, false),
            FragFlag::End => self.recv_continuation(&header, payload, true),
            FragFlag::None => Err(ChannelError::UnexpectedFragFlag(FragFlag::None)),
        }
    }

    fn recv_single(
        &self,
        header: &SessionHeader,
        payload: &[u8],
    ) -> Result<Option<(u32, DataBuffer)>> {
        let mut state = self.reassembly.lock().expect("reassembly state poisoned");
        if state.waiting {
            warn!(
                session = self.info.session_id,
                stalled_seq = state.seq_num,
                "single-frame message evicts stalled reassembly"
            );
        }
        *state = Reassembly::default();
        if header.data_len != header.total_len {
            return Err(ChannelError::SingleFrameMismatch {
                data_len: header.data_len,
                total_len: header.total_len,
            });
        }
        let buffer = DataBuffer::from_bytes(payload)?;
        Ok(Some((header.data_type, buffer)))
    }

    fn recv_start(
        &self,
        header: &SessionHeader,
        payload: &[u8],
    ) -> Result<Option<(u32, DataBuffer)>> {
        let mut state = self.reassembly.lock().expect("reassembly state poisoned");
        if state.waiting {
            warn!(
                session = self.info.session_id,
                stalled_seq = state.seq_num,
                new_seq = header.seq_num,
                "start frame evicts stalled reassembly"
            );
        }
        *state = Reassembly::default();

        let mut buf = DataBuffer::new(header.total_len as usize)?;
        buf.as_mut_slice()[..payload.len()].copy_from_slice(payload);
        state.waiting = true;
        state.seq_num = header.seq_num;
        state.sub_seq = header.sub_seq;
        state.offset = payload.len();
        state.total_len = header.total_len;
        state.data_type = header.data_type;
        state.buf = Some(buf);
        Ok(None)
    }

    fn recv_continuation(
        &self,
        header: &SessionHeader,
        payload: &[u8],
        is_end: bool,
    ) -> Result<Option<(u32, DataBuffer)>> {
        let mut state = self.reassembly.lock().expect("reassembly state poisoned");
        if let Err(err) = Self::check_continuation(&state, header) {
            *state = Reassembly::default();
            return Err(err);
        }

        let offset = state.offset;
        let buf = state.buf.as_mut().expect("checked by continuation guard");
        buf.as_mut_slice()[offset..offset + payload.len()].copy_from_slice(payload);
        state.offset += payload.len();
        state.sub_seq = header.sub_seq;

        if !is_end {
            return Ok(None);
        }
        let mut buf = state.buf.take().expect("checked by continuation guard");
        let assembled = state.offset;
        let data_type = state.data_type;
        *state = Reassembly::default();
        buf.set_range(0, assembled)?;
        Ok(Some((data_type, buf)))
    }

    fn check_continuation(state: &Reassembly, header: &SessionHeader) -> Result<()> {
        if !state.waiting || state.buf.is_none() {
            return Err(ChannelError::NotReassembling);
        }
        if header.seq_num != state.seq_num {
            return Err(ChannelError::SeqMismatch {
                expected: state.seq_num,
                actual: header.seq_num,
            });
        }
        let expected_sub = state.sub_seq.wrapping_add(1);
        if header.sub_seq != expected_sub {
            return Err(ChannelError::SubSeqMismatch {
                expected: expected_sub,
                actual: header.sub_seq,
            });
        }
        if header.total_len != state.total_len {
            return Err(ChannelError::TotalLenChanged {
                expected: state.total_len,
                actual: header.total_len,
            });
        }
        if state.offset + header.data_len as usize > state.total_len as usize {
            return Err(ChannelError::ReassemblyOverflow {
                offset: state.offset,
                data_len: header.data_len,
                total_len: state.total_len,
            });
        }
        Ok(())
    }
}
