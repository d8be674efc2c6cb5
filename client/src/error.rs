use shared::ProtocolError;
use std::io;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed reply: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("no reply from the master server within {0:?}")]
    Timeout(Duration),

    #[error("could not resolve an IPv4 address for {0}")]
    Unresolved(String),
}
