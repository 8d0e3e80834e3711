use std::sync::Arc;

use collablink_frame::DataBuffer;
use collablink_transport::SessionId;

use crate::session::SessionInfo;

/// Capability implemented by collaborators that want traffic for a
/// service type.
///
/// Callbacks run on the thread the transport delivers data on; a listener
/// that needs to send in response to [`on_data`](Self::on_data) must hand
/// the send to its own thread rather than calling back into the adapter
/// inline, or it can deadlock the transport's callback thread.
pub trait ChannelListener: Send + Sync {
    /// A session matching this listener's service type was established.
    fn on_bind(&self, session: SessionId, info: &SessionInfo) {
        let _ = (session, info);
    }

    /// The session went away. Not invoked for closes initiated locally.
    fn on_shutdown(&self, session: SessionId, is_self_called: bool) {
        let _ = (session, is_self_called);
    }

    /// A fully reassembled message arrived on the session.
    fn on_data(&self, session: SessionId, data_type: u32, buffer: Arc<DataBuffer>);
}
