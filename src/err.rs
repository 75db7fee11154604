use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed packet: {0}")]
    MalformedPacket(&'static str),

    #[error("failed to bind UDP socket: {0}")]
    BindFailed(#[source] io::Error),

    #[error("send on a session that is closed for sending")]
    ClosedForSend,
}
