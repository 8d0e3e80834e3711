use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, warn};

use crate::error::{Result, TransportError};
use crate::traits::{SessionId, SessionTransport, TransportEvents};

/// Default per-session maximum payload size for loopback sessions.
pub const DEFAULT_MAX_PAYLOAD: u32 = 64 * 1024;

struct SessionEntry {
    /// Device name of the connecting (client) side.
    client_device: String,
    /// Device name of the accepting (server) side.
    server_device: String,
    max_payload: u32,
    open: bool,
}

struct Shared {
    next_id: SessionId,
    sessions: HashMap<SessionId, SessionEntry>,
    endpoints: HashMap<String, Weak<LoopbackTransport>>,
}

/// In-process session transport connecting two endpoints by device name.
///
/// Delivery is synchronous: `send_raw` invokes the remote endpoint's
/// [`TransportEvents::on_bytes_arrived`] on the calling thread, in send
/// order, which is exactly the ordering contract the channel layer assumes
/// from the real transport. The per-session maximum payload size can be
/// changed mid-session to exercise renegotiation paths.
pub struct LoopbackTransport {
    device: String,
    shared: Arc<Mutex<Shared>>,
    events: Mutex<Option<Arc<dyn TransportEvents>>>,
}

impl LoopbackTransport {
    /// Create a connected pair of endpoints with the given device names.
    pub fn pair(device_a: &str, device_b: &str) -> (Arc<Self>, Arc<Self>) {
        let shared = Arc::new(Mutex::new(Shared {
            next_id: 1,
            sessions: HashMap::new(),
            endpoints: HashMap::new(),
        }));
        let a = Arc::new(Self {
            device: device_a.to_string(),
            shared: Arc::clone(&shared),
            events: Mutex::new(None),
        });
        let b = Arc::new(Self {
            device: device_b.to_string(),
            shared: Arc::clone(&shared),
            events: Mutex::new(None),
        });
        {
            let mut inner = shared.lock().expect("loopback state poisoned");
            inner
                .endpoints
                .insert(device_a.to_string(), Arc::downgrade(&a));
            inner
                .endpoints
                .insert(device_b.to_string(), Arc::downgrade(&b));
        }
        (a, b)
    }

    /// This endpoint's device name.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Attach the callback sink for this endpoint.
    pub fn set_events(&self, sink: Arc<dyn TransportEvents>) {
        *self.events.lock().expect("events slot poisoned") = Some(sink);
    }

    /// Change a session's negotiated maximum payload size.
    pub fn set_max_payload_size(&self, session: SessionId, max: u32) -> Result<()> {
        let mut inner = self.shared.lock().expect("loopback state poisoned");
        let entry = inner
            .sessions
            .get_mut(&session)
            .ok_or(TransportError::UnknownSession(session))?;
        entry.max_payload = max;
        Ok(())
    }

    fn events_of(&self, device: &str) -> Option<Arc<dyn TransportEvents>> {
        let endpoint = {
            let inner = self.shared.lock().expect("loopback state poisoned");
            inner.endpoints.get(device).and_then(Weak::upgrade)
        };
        let endpoint = endpoint?;
        let sink = endpoint.events.lock().expect("events slot poisoned");
        sink.clone()
    }

    fn remote_device(&self, entry: &SessionEntry) -> String {
        if entry.client_device == self.device {
            entry.server_device.clone()
        } else {
            entry.client_device.clone()
        }
    }
}

impl SessionTransport for LoopbackTransport {
    fn connect(&self, peer_id: &str) -> Result<SessionId> {
        let session = {
            let mut inner = self.shared.lock().expect("loopback state poisoned");
            if !inner.endpoints.contains_key(peer_id) {
                return Err(TransportError::UnknownPeer(peer_id.to_string()));
            }
            let session = inner.next_id;
            inner.next_id += 1;
            inner.sessions.insert(
                session,
                SessionEntry {
                    client_device: self.device.clone(),
                    server_device: peer_id.to_string(),
                    max_payload: DEFAULT_MAX_PAYLOAD,
                    open: true,
                },
            );
            session
        };
        debug!(session, peer = peer_id, "loopback session opened");
        // The accepting side learns about the session the way a real
        // transport reports an accept completion.
        if let Some(sink) = self.events_of(peer_id) {
            sink.on_session_opened(session, &self.device, true);
        }
        Ok(session)
    }

    fn send_raw(&self, session: SessionId, bytes: &[u8]) -> Result<()> {
        let (remote, max_payload) = {
            let inner = self.shared.lock().expect("loopback state poisoned");
            let entry = inner
                .sessions
                .get(&session)
                .ok_or(TransportError::UnknownSession(session))?;
            if !entry.open {
                return Err(TransportError::SessionClosed(session));
            }
            (self.remote_device(entry), entry.max_payload)
        };
        if bytes.len() > max_payload as usize {
            return Err(TransportError::Send {
                session,
                reason: "chunk exceeds negotiated max payload size",
            });
        }
        match self.events_of(&remote) {
            Some(sink) => {
                sink.on_bytes_arrived(session, bytes);
                Ok(())
            }
            None => {
                warn!(session, %remote, "remote endpoint has no event sink, dropping chunk");
                Err(TransportError::Send {
                    session,
                    reason: "remote endpoint unavailable",
                })
            }
        }
    }

    fn max_payload_size(&self, session: SessionId) -> Result<u32> {
        let inner = self.shared.lock().expect("loopback state poisoned");
        inner
            .sessions
            .get(&session)
            .map(|entry| entry.max_payload)
            .ok_or(TransportError::UnknownSession(session))
    }

    fn close(&self, session: SessionId) -> Result<()> {
        let remote = {
            let mut inner = self.shared.lock().expect("loopback state poisoned");
            let entry = inner
                .sessions
                .get_mut(&session)
                .ok_or(TransportError::UnknownSession(session))?;
            entry.open = false;
            self.remote_device(entry)
        };
        debug!(session, "loopback session closed");
        if let Some(sink) = self.events_of(&self.device) {
            sink.on_shutdown(session, true);
        }
        if let Some(sink) = self.events_of(&remote) {
            sink.on_shutdown(session, false);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        opened: StdMutex<Vec<(SessionId, String, bool)>>,
        bytes: StdMutex<Vec<(SessionId, Vec<u8>)>>,
        shutdowns: StdMutex<Vec<(SessionId, bool)>>,
    }

    impl TransportEvents for RecordingSink {
        fn on_session_opened(&self, session: SessionId, peer_id: &str, is_server: bool) {
            self.opened
                .lock()
                .unwrap()
                .push((session, peer_id.to_string(), is_server));
        }

        fn on_bytes_arrived(&self, session: SessionId, bytes: &[u8]) {
            self.bytes.lock().unwrap().push((session, bytes.to_vec()));
        }

        fn on_shutdown(&self, session: SessionId, is_self_called: bool) {
            self.shutdowns.lock().unwrap().push((session, is_self_called));
        }
    }

    #[test]
    fn connect_notifies_accepting_side() {
        let (a, b) = LoopbackTransport::pair("dev-a", "dev-b");
        let sink_b = Arc::new(RecordingSink::default());
        b.set_events(sink_b.clone());

        let session = a.connect("dev-b").expect("connect should succeed");
        let opened = sink_b.opened.lock().unwrap();
        assert_eq!(opened.as_slice(), &[(session, "dev-a".to_string(), true)]);
    }

    #[test]
    fn connect_unknown_peer_fails() {
        let (a, _b) = LoopbackTransport::pair("dev-a", "dev-b");
        assert!(matches!(
            a.connect("dev-c"),
            Err(TransportError::UnknownPeer(_))
        ));
    }

    #[test]
    fn send_delivers_to_remote_in_order() {
        let (a, b) = LoopbackTransport::pair("dev-a", "dev-b");
        let sink_b = Arc::new(RecordingSink::default());
        b.set_events(sink_b.clone());

        let session = a.connect("dev-b").expect("connect should succeed");
        a.send_raw(session, b"one").expect("send should succeed");
        a.send_raw(session, b"two").expect("send should succeed");

        let bytes = sink_b.bytes.lock().unwrap();
        assert_eq!(
            bytes.as_slice(),
            &[(session, b"one".to_vec()), (session, b"two".to_vec())]
        );
    }

    #[test]
    fn send_respects_max_payload() {
        let (a, b) = LoopbackTransport::pair("dev-a", "dev-b");
        b.set_events(Arc::new(RecordingSink::default()));

        let session = a.connect("dev-b").expect("connect should succeed");
        a.set_max_payload_size(session, 4).unwrap();
        assert_eq!(a.max_payload_size(session).unwrap(), 4);
        assert!(a.send_raw(session, b"fits").is_ok());
        assert!(matches!(
            a.send_raw(session, b"too-big"),
            Err(TransportError::Send { .. })
        ));
    }

    #[test]
    fn close_notifies_both_sides() {
        let (a, b) = LoopbackTransport::pair("dev-a", "dev-b");
        let sink_a = Arc::new(RecordingSink::default());
        let sink_b = Arc::new(RecordingSink::default());
        a.set_events(sink_a.clone());
        b.set_events(sink_b.clone());

        let session = a.connect("dev-b").expect("connect should succeed");
        a.close(session).expect("close should succeed");

        assert_eq!(sink_a.shutdowns.lock().unwrap().as_slice(), &[(session, true)]);
        assert_eq!(sink_b.shutdowns.lock().unwrap().as_slice(), &[(session, false)]);
        assert!(matches!(
            a.send_raw(session, b"late"),
            Err(TransportError::SessionClosed(_))
        ));
    }
}
