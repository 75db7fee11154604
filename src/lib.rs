//! RCP: a reliable, ordered, bidirectional byte-stream transport layered on
//! top of UDP. A 32-packet sliding window with cumulative-plus-bitmap ACKs
//! provides reliability; a [`Router`] owns the socket and runs the read and
//! write loops that drive it.

mod err;
pub mod logging;
mod proto;

pub use err::Error;
pub use proto::{RCPPacket, Router, RouterConfig, Session, Transport, PAYLOAD, WINDOW};
