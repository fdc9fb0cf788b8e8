//! Owns one monitor task per configured account

use crate::config::{AccountConfig, Config};
use crate::net::NetError;
use crate::portal::{HttpTransport, Monitor, Transport, TransportError};
use crate::shutdown::Shutdown;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{Instrument, error, info, info_span};

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Account {username}: {source}")]
    Binding { username: String, source: NetError },

    #[error("Account {username}: {source}")]
    Client {
        username: String,
        source: TransportError,
    },
}

#[derive(Default)]
pub struct Supervisor {
    units: JoinSet<()>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every account's transport first so a bad binding fails before anything runs
    pub fn start(config: &Config, shutdown: &Shutdown) -> Result<Self, StartupError> {
        let mut transports = Vec::with_capacity(config.accounts.len());
        for account in &config.accounts {
            let options = account
                .transport_options()
                .map_err(|source| StartupError::Binding {
                    username: account.username.clone(),
                    source,
                })?;
            let transport = HttpTransport::new(&options).map_err(|source| StartupError::Client {
                username: account.username.clone(),
                source,
            })?;
            transports.push(transport);
        }

        let mut supervisor = Self::new();
        for (account, transport) in config.accounts.iter().zip(transports) {
            supervisor.spawn(transport, account, shutdown.clone());
        }
        info!("Started {} account(s)", supervisor.len());
        Ok(supervisor)
    }

    pub fn spawn<T>(&mut self, transport: T, account: &AccountConfig, shutdown: Shutdown)
    where
        T: Transport + 'static,
    {
        let span = info_span!(
            "account",
            user = %account.username,
            outbound = %account.outbound()
        );
        let monitor = Monitor::new(
            transport,
            account.credentials(),
            account.monitor_settings(),
            shutdown,
        );
        self.units.spawn(monitor.run().instrument(span));
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Wait for every unit; each returns once shutdown fires and its logout settles
    pub async fn wait(mut self) {
        while let Some(result) = self.units.join_next().await {
            if let Err(e) = result {
                error!("Account task failed: {}", e);
            }
        }
        info!("All accounts stopped");
    }
}
