//! Outbound binding for the portal transport
//!
//! Each account can leave routing to the system, pin its requests to the
//! address of a named interface, or pin them to a fixed local address.
//! Hostnames can optionally be resolved through a custom DNS server.

mod dns;
mod iface;

pub use dns::UdpResolver;
pub use iface::interface_ipv4;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum NetError {
    #[error("Interface not found: {0}")]
    InterfaceNotFound(String),

    #[error("Interface {0} is down")]
    InterfaceDown(String),

    #[error("No usable IPv4 address on interface {0}")]
    NoAddress(String),

    #[error("Failed to list interfaces: {0}")]
    InterfaceLookup(String),

    #[error("Interface binding is not supported on this platform")]
    Unsupported,

    #[error("DNS query for {host} failed: {reason}")]
    DnsQueryFailed { host: String, reason: String },
}

/// Where an account's requests leave from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Outbound {
    #[default]
    System,
    Interface {
        name: String,
    },
    Address {
        address: IpAddr,
    },
}

impl Outbound {
    /// Local address to bind, or `None` for system routing
    pub fn local_address(&self) -> Result<Option<IpAddr>, NetError> {
        match self {
            Outbound::System => Ok(None),
            Outbound::Interface { name } => {
                let ip = interface_ipv4(name)?;
                info!("Binding to {} on interface {}", ip, name);
                Ok(Some(IpAddr::V4(ip)))
            }
            Outbound::Address { address } => Ok(Some(*address)),
        }
    }
}

impl fmt::Display for Outbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outbound::System => f.write_str("system"),
            Outbound::Interface { name } => write!(f, "interface {}", name),
            Outbound::Address { address } => write!(f, "address {}", address),
        }
    }
}
