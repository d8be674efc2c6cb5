//! Errors that stop the master server from starting or serving.
//!
//! Malformed traffic is not an error here: bad datagrams are logged and
//! dropped by the protocol engine without ever reaching the caller.

use shared::MAX_PAGE_SIZE;
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MasterServerError>;

#[derive(Debug, Error)]
pub enum MasterServerError {
    /// Rejected at construction, before any socket exists.
    #[error("page size must be between 1 and {max}, got {0}", max = MAX_PAGE_SIZE)]
    InvalidPageSize(usize),

    #[error("the server socket has already been bound")]
    AlreadyBound,

    #[error("the server socket is not bound")]
    NotBound,

    /// Socket creation, option or bind failure, with the OS error attached.
    #[error("{context}: {source}")]
    Transport {
        context: &'static str,
        #[source]
        source: io::Error,
    },
}

impl MasterServerError {
    pub(crate) fn transport(context: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| MasterServerError::Transport { context, source }
    }

    /// OS error code behind a transport failure, if there is one.
    pub fn os_error_code(&self) -> Option<i32> {
        match self {
            MasterServerError::Transport { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}
