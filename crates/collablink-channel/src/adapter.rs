use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use collablink_frame::DataBuffer;
use collablink_transport::{SessionId, SessionTransport, TransportEvents};

use crate::config::ChannelConfig;
use crate::error::{ChannelError, Result};
use crate::listener::ChannelListener;
use crate::session::{Session, SessionInfo};

#[derive(Default)]
struct SessionRegistry {
    sessions: HashMap<SessionId, Arc<Session>>,
    peers: HashMap<String, SessionId>,
}

/// Multiplexes many peer sessions over one underlying transport and fans
/// reassembled messages out to registered listeners.
///
/// An explicit object, not a process-wide singleton: construct one per
/// transport at service start and hand references to collaborators. The
/// session registry and the listener registry are guarded by separate
/// mutexes and never locked together.
pub struct TransportAdapter {
    transport: Arc<dyn SessionTransport>,
    local_device: String,
    config: ChannelConfig,
    registry: Mutex<SessionRegistry>,
    listeners: Mutex<HashMap<u32, Vec<Arc<dyn ChannelListener>>>>,
}

impl TransportAdapter {
    pub fn new(transport: Arc<dyn SessionTransport>, local_device: &str, config: ChannelConfig) -> Self {
        Self {
            transport,
            local_device: local_device.to_string(),
            config,
            registry: Mutex::new(SessionRegistry::default()),
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Open (or reuse) a client session to `peer_id`.
    ///
    /// Idempotent: a second call for an already-connected peer acquires
    /// another reference on the existing session instead of reconnecting.
    /// Concurrent first connects to the same peer are safe too: the loser
    /// of the race closes its redundant transport session and joins the
    /// winner's.
    pub fn connect_device(&self, peer_id: &str, service_type: u32) -> Result<SessionId> {
        if let Some(existing) = self.lookup_peer(peer_id) {
            existing.acquire();
            return Ok(existing.info().session_id);
        }
        let session_id = self.transport.connect(peer_id)?;
        let session = self.new_record(session_id, peer_id, false, service_type);
        // The connect ran off the registry lock; re-check the peer map
        // before inserting in case another caller connected meanwhile.
        let raced_with = {
            let mut registry = self.registry.lock().expect("session registry poisoned");
            match registry.peers.get(peer_id) {
                Some(existing_id) => registry.sessions.get(existing_id).cloned(),
                None => {
                    registry.sessions.insert(session_id, Arc::clone(&session));
                    registry.peers.insert(peer_id.to_string(), session_id);
                    None
                }
            }
        };
        if let Some(existing) = raced_with {
            existing.acquire();
            if let Err(err) = self.transport.close(session_id) {
                debug!(session = session_id, %err, "close on redundant session");
            }
            return Ok(existing.info().session_id);
        }
        debug!(session = session_id, peer = peer_id, "session registered");
        for listener in self.listeners_for(service_type) {
            listener.on_bind(session_id, session.info());
        }
        Ok(session_id)
    }

    /// Register a session reported by the transport's connect/accept
    /// completion and announce it to matching listeners.
    pub fn create_session_record(
        &self,
        session_id: SessionId,
        peer_id: &str,
        is_server: bool,
        service_type: u32,
    ) -> Arc<Session> {
        let session = self.new_record(session_id, peer_id, is_server, service_type);
        {
            let mut registry = self.registry.lock().expect("session registry poisoned");
            registry.sessions.insert(session_id, Arc::clone(&session));
            registry.peers.insert(peer_id.to_string(), session_id);
        }
        debug!(session = session_id, peer = peer_id, is_server, "session registered");
        for listener in self.listeners_for(service_type) {
            listener.on_bind(session_id, session.info());
        }
        session
    }

    /// Send one logical message on a session, fragmenting as needed.
    pub fn send_data(&self, session_id: SessionId, data_type: u32, payload: &DataBuffer) -> Result<()> {
        let session = self
            .lookup_session(session_id)
            .ok_or(ChannelError::UnknownSession(session_id))?;
        session.send_data(&*self.transport, data_type, payload)
    }

    /// Fan a reassembled message out to every listener registered for the
    /// session's service type.
    pub fn on_data_ready(&self, session_id: SessionId, buffer: DataBuffer, data_type: u32) {
        let service_type = match self.lookup_session(session_id) {
            Some(session) => session.service_type(),
            None => {
                warn!(session = session_id, "message completed on unknown session, dropping");
                return;
            }
        };
        let listeners = self.listeners_for(service_type);
        if listeners.is_empty() {
            warn!(
                session = session_id,
                service_type, "no listener for service type, dropping message"
            );
            return;
        }
        let buffer = Arc::new(buffer);
        for listener in listeners {
            listener.on_data(session_id, data_type, Arc::clone(&buffer));
        }
    }

    /// Add a listener for a service type. Additive: all listeners for the
    /// type receive every message.
    pub fn register_listener(&self, service_type: u32, listener: Arc<dyn ChannelListener>) {
        let mut listeners = self.listeners.lock().expect("listener registry poisoned");
        listeners.entry(service_type).or_default().push(listener);
    }

    /// Remove a previously registered listener (matched by identity).
    pub fn unregister_listener(&self, service_type: u32, listener: &Arc<dyn ChannelListener>) {
        let mut listeners = self.listeners.lock().expect("listener registry poisoned");
        if let Some(entries) = listeners.get_mut(&service_type) {
            entries.retain(|entry| !Arc::ptr_eq(entry, listener));
            if entries.is_empty() {
                listeners.remove(&service_type);
            }
        }
    }

    /// Drop one reference on the peer's session; closes the transport
    /// session once the last user is gone.
    pub fn disconnect_device(&self, peer_id: &str) -> Result<()> {
        let session = self
            .lookup_peer(peer_id)
            .ok_or_else(|| ChannelError::UnknownPeer(peer_id.to_string()))?;
        if session.release() {
            let session_id = session.info().session_id;
            // The transport reports the close back through on_shutdown,
            // which removes the record; ignore an already-gone session.
            if let Err(err) = self.transport.close(session_id) {
                debug!(session = session_id, %err, "close on torn-down session");
            }
            self.remove_record(session_id);
        }
        Ok(())
    }

    /// Tear down every session and forget all listeners.
    pub fn release_channel(&self) {
        let session_ids: Vec<SessionId> = {
            let registry = self.registry.lock().expect("session registry poisoned");
            registry.sessions.keys().copied().collect()
        };
        for session_id in session_ids {
            if let Err(err) = self.transport.close(session_id) {
                debug!(session = session_id, %err, "close on torn-down session");
            }
            self.remove_record(session_id);
        }
        self.listeners
            .lock()
            .expect("listener registry poisoned")
            .clear();
    }

    fn new_record(
        &self,
        session_id: SessionId,
        peer_id: &str,
        is_server: bool,
        service_type: u32,
    ) -> Arc<Session> {
        let info = SessionInfo {
            session_id,
            local_device_id: self.local_device.clone(),
            peer_device_id: peer_id.to_string(),
            session_name: format!("collablink_{peer_id}"),
            is_server,
        };
        Arc::new(Session::new(info, service_type, self.config.reserved_margin))
    }

    fn lookup_session(&self, session_id: SessionId) -> Option<Arc<Session>> {
        let registry = self.registry.lock().expect("session registry poisoned");
        registry.sessions.get(&session_id).cloned()
    }

    fn lookup_peer(&self, peer_id: &str) -> Option<Arc<Session>> {
        let registry = self.registry.lock().expect("session registry poisoned");
        let session_id = registry.peers.get(peer_id)?;
        registry.sessions.get(session_id).cloned()
    }

    fn remove_record(&self, session_id: SessionId) -> Option<Arc<Session>> {
        let mut registry = self.registry.lock().expect("session registry poisoned");
        let session = registry.sessions.remove(&session_id)?;
        registry
            .peers
            .retain(|_, mapped| *mapped != session_id);
        Some(session)
    }

    fn listeners_for(&self, service_type: u32) -> Vec<Arc<dyn ChannelListener>> {
        let listeners = self.listeners.lock().expect("listener registry poisoned");
        listeners.get(&service_type).cloned().unwrap_or_default()
    }
}

impl TransportEvents for TransportAdapter {
    fn on_session_opened(&self, session: SessionId, peer_id: &str, is_server: bool) {
        // Server-side accepts carry no caller-chosen service type; they get
        // the configured default.
        self.create_session_record(session, peer_id, is_server, self.config.default_service_type);
    }

    fn on_bytes_arrived(&self, session: SessionId, bytes: &[u8]) {
        let record = match self.lookup_session(session) {
            Some(record) => record,
            None => {
                warn!(session, "bytes for unknown session, dropping");
                return;
            }
        };
        match record.on_bytes_received(bytes) {
            Ok(Some((data_type, buffer))) => self.on_data_ready(session, buffer, data_type),
            Ok(None) => {}
            Err(err) => {
                // Malformed or out-of-sequence frame: never delivered upward.
                warn!(session, %err, "dropping inbound frame");
            }
        }
    }

    fn on_shutdown(&self, session: SessionId, is_self_called: bool) {
        let record = match self.lookup_session(session) {
            Some(record) => record,
            None => return,
        };
        // Listeners are told while the record still exists, so a callback
        // that reaches back into the adapter sees the session until it
        // returns. Local closes are not re-broadcast.
        if !is_self_called {
            for listener in self.listeners_for(record.service_type()) {
                listener.on_shutdown(session, is_self_called);
            }
        }
        self.remove_record(session);
    }
}
