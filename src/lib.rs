//! ESurfing campus WLAN auto-login client
//!
//! Keeps one or more accounts logged in to a ChinaTelecom ESurfing captive
//! portal. Each account runs a monitor that probes connectivity, walks the
//! encrypted portal handshake when redirected, and keeps the session alive
//! with heartbeats until shutdown.
//!
//! # Architecture
//!
//! - `crypto`: the nine payload ciphers and the algorithm registry
//! - `portal`: wire codec, handshake state machine, heartbeat, monitor
//! - `net`: outbound interface binding and custom DNS
//! - `config`: account configuration (TOML, legacy JSON)
//! - `supervisor`: one monitor task per account
//! - `shutdown`: process-wide cancellation
//!
//! # Usage
//!
//! ```bash
//! esurfing-client init
//! esurfing-client run -c ~/.config/esurfing/config.toml
//! ```

pub mod config;
pub mod crypto;
pub mod net;
pub mod portal;
pub mod shutdown;
pub mod supervisor;

pub use config::Config;
pub use supervisor::Supervisor;
