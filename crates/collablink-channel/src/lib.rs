//! Fragmenting session layer and listener fan-out for collablink.
//!
//! This is the core value-add layer: arbitrarily large payloads are split
//! into header-tagged frames that respect the transport's per-call size
//! limit, reassembled on the far side in order and exactly once, and fanned
//! out to listeners by service type.
//!
//! Everything here runs on caller threads and on the transport's callback
//! threads; there is no internal event loop. See [`ChannelListener`] for
//! the re-entrancy rules listener implementations must follow.

pub mod adapter;
pub mod config;
pub mod error;
pub mod listener;
pub mod session;

pub use adapter::TransportAdapter;
pub use config::ChannelConfig;
pub use error::{ChannelError, Result};
pub use listener::ChannelListener;
pub use session::{Session, SessionInfo};
