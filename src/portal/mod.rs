//! ESurfing portal protocol
//!
//! A unit of work is one account:
//! 1. `monitor` probes connectivity and reacts to portal redirects
//! 2. `handshake` walks the multi-stage login and yields a [`Session`]
//! 3. `heartbeat` keeps the session alive and logs out on shutdown
//!
//! Every payload after algorithm negotiation goes through `codec`, which
//! wraps it in the cipher the portal assigned.

pub mod codec;
pub mod handshake;
pub mod heartbeat;
pub mod monitor;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use handshake::{HandshakeError, Session, Stage, authenticate};
pub use heartbeat::Heartbeat;
pub use monitor::{Monitor, MonitorError, MonitorSettings};
pub use transport::{HttpTransport, PortalRequest, PortalResponse, Transport, TransportError};

use crate::crypto::CipherError;
use codec::CodecError;
use std::fmt;
use thiserror::Error;

/// URL whose 204 means the network is open
pub const DEFAULT_PROBE_URL: &str = "http://connect.rom.miui.com/generate_204";

/// Client signature the portal expects
pub const USER_AGENT: &str = "CCTP/android64_vpn/2093";

/// Errors from a single protocol step
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Cipher error: {0}")]
    Cipher(#[from] CipherError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Missing school info")]
    MissingSchoolInfo,

    #[error("Unexpected status {status}, expected {expected}")]
    UnexpectedStatus { status: u16, expected: u16 },

    #[error("Missing user ip or ac ip")]
    MissingClientAddress,
}

/// Coarse classification used for logging and retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connectivity,
    Protocol,
    Crypto,
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Transport(_) => ErrorKind::Connectivity,
            AuthError::Cipher(_) => ErrorKind::Crypto,
            AuthError::Codec(_)
            | AuthError::InvalidUrl(_)
            | AuthError::MissingSchoolInfo
            | AuthError::UnexpectedStatus { .. }
            | AuthError::MissingClientAddress => ErrorKind::Protocol,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Connectivity => "connectivity",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Crypto => "crypto",
        };
        f.write_str(name)
    }
}

/// Account credentials
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}
