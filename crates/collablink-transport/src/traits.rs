use crate::error::Result;

/// Transport-assigned identifier for one logical peer connection.
pub type SessionId = i32;

/// The narrow interface the channel layer consumes from the underlying
/// session transport.
///
/// Implementations own connection establishment, delivery of size-bounded
/// byte chunks, and per-session negotiation of the maximum payload size.
/// Discovery, authentication, and encryption all live below this seam.
pub trait SessionTransport: Send + Sync {
    /// Open a client connection to `peer_id` and return its session id.
    fn connect(&self, peer_id: &str) -> Result<SessionId>;

    /// Send one chunk of bytes on an established session (blocking).
    ///
    /// `bytes` must not exceed the session's current
    /// [`max_payload_size`](Self::max_payload_size); the transport may
    /// reject larger calls.
    fn send_raw(&self, session: SessionId, bytes: &[u8]) -> Result<()>;

    /// Current maximum byte count accepted by a single `send_raw` call.
    ///
    /// The value may change over the session's lifetime; callers re-query
    /// it rather than caching.
    fn max_payload_size(&self, session: SessionId) -> Result<u32>;

    /// Tear down a session. Peers observe a shutdown callback.
    fn close(&self, session: SessionId) -> Result<()>;
}

/// Callbacks the transport delivers into the channel layer.
///
/// Invoked on whatever thread the transport uses internally; the sink must
/// be prepared for concurrent calls for different sessions.
pub trait TransportEvents: Send + Sync {
    /// A session was established (client connect completion or server accept).
    fn on_session_opened(&self, session: SessionId, peer_id: &str, is_server: bool);

    /// One chunk of raw bytes arrived on a session.
    fn on_bytes_arrived(&self, session: SessionId, bytes: &[u8]);

    /// The session went away. `is_self_called` is true when the local side
    /// initiated the close.
    fn on_shutdown(&self, session: SessionId, is_self_called: bool);
}
