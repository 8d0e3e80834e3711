use crate::traits::SessionId;

/// Errors that can occur in session-transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The session id is not known to the transport.
    #[error("unknown session {0}")]
    UnknownSession(SessionId),

    /// The named peer is not reachable.
    #[error("unknown peer {0:?}")]
    UnknownPeer(String),

    /// The session was closed before or during the operation.
    #[error("session {0} closed")]
    SessionClosed(SessionId),

    /// The raw send primitive failed.
    #[error("send on session {session} failed: {reason}")]
    Send {
        session: SessionId,
        reason: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, TransportError>;
