//! Session-transport seam for the collablink channel layer.
//!
//! The channel layer never talks to a concrete transport directly: it
//! consumes [`SessionTransport`] for the outbound path and implements
//! [`TransportEvents`] for the inbound one. [`LoopbackTransport`] is an
//! in-process implementation of that seam used by tests and demos.

pub mod error;
pub mod loopback;
pub mod traits;

pub use error::{Result, TransportError};
pub use loopback::LoopbackTransport;
pub use traits::{SessionId, SessionTransport, TransportEvents};
