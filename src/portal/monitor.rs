//! Network monitor
//!
//! One monitor per account. A single task owns the account's state and
//! waits on three things at once:
//! - the shutdown signal
//! - the heartbeat deadline, while a session is held
//! - the probe ticker
//!
//! Probing and authentication run inline in that task, so a tick that
//! fires during a handshake is coalesced into one probe afterwards.

use super::codec;
use super::handshake::authenticate;
use super::heartbeat::Heartbeat;
use super::transport::Transport;
use super::Credentials;
use crate::shutdown::Shutdown;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior, interval, sleep, sleep_until};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MonitorError {
    #[error("Max retries reached after {attempts} attempts")]
    MaxRetriesReached { attempts: u64 },

    #[error("Cancelled")]
    Cancelled,
}

/// Probe and retry policy for one account
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub probe_url: String,
    pub check_interval: Duration,
    /// Attempts per redirect; zero or negative retries forever
    pub max_retries: i64,
    pub retry_delay: Duration,
}

impl MonitorSettings {
    fn retries_exhausted(&self, attempts: u64) -> bool {
        self.max_retries > 0 && attempts >= self.max_retries as u64
    }
}

pub struct Monitor<T> {
    transport: T,
    credentials: Credentials,
    settings: MonitorSettings,
    shutdown: Shutdown,
    heartbeat: Option<Heartbeat>,
}

impl<T: Transport> Monitor<T> {
    pub fn new(
        transport: T,
        credentials: Credentials,
        settings: MonitorSettings,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            transport,
            credentials,
            settings,
            shutdown,
            heartbeat: None,
        }
    }

    /// Run until shutdown, then log out if a session is held
    pub async fn run(mut self) {
        info!(
            "Probing {} every {}ms",
            self.settings.probe_url,
            self.settings.check_interval.as_millis()
        );

        let mut ticker = interval(self.settings.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let due = self.heartbeat.as_ref().map(Heartbeat::due);

            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,

                _ = heartbeat_due(due) => self.send_heartbeat().await,

                _ = ticker.tick() => {
                    self.probe().await;
                    ticker.reset();
                }
            }
        }

        self.logout().await;
        info!("Client stopped");
    }

    async fn probe(&mut self) {
        let client_id = self
            .heartbeat
            .as_ref()
            .map_or_else(Uuid::nil, |heartbeat| heartbeat.session().identity.client_id);
        let request = codec::get_request(&self.settings.probe_url, &client_id, None);
        let response = tokio::select! {
            _ = self.shutdown.cancelled() => return,
            response = self.transport.send(request) => response,
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!("Network check failed: {}", e);
                return;
            }
        };

        match response.status {
            204 => debug!("Network is connected"),
            302 => {
                let Some(location) = response.header("Location").map(str::to_string) else {
                    warn!("Portal redirect without Location header");
                    return;
                };
                if self.heartbeat.take().is_some() {
                    warn!("Session expired, portal is redirecting again");
                }
                info!("Authorization required");

                match self.retry(&location).await {
                    Ok(heartbeat) => {
                        info!(
                            "Authorization succeeded with {}, first heartbeat in {}s",
                            heartbeat.session().algorithm,
                            heartbeat.interval().as_secs()
                        );
                        self.heartbeat = Some(heartbeat);
                    }
                    Err(MonitorError::Cancelled) => debug!("Authorization cancelled"),
                    Err(e) => error!("{}", e),
                }
            }
            status => warn!("Unexpected status code: {}", status),
        }
    }

    /// One retry cycle: attempt, back off, attempt again, up to the limit
    pub(crate) async fn retry(&self, redirect_url: &str) -> Result<Heartbeat, MonitorError> {
        let mut attempts: u64 = 0;

        loop {
            attempts += 1;
            let outcome = tokio::select! {
                _ = self.shutdown.cancelled() => return Err(MonitorError::Cancelled),
                outcome = authenticate(&self.transport, &self.credentials, redirect_url) => outcome,
            };

            let err = match outcome {
                Ok(session) => return Ok(Heartbeat::new(session)),
                Err(err) => err,
            };
            warn!(
                "Authorization attempt {} failed after stage '{}' ({}): {}",
                attempts,
                err.stage,
                err.kind(),
                err.source
            );

            if self.settings.retries_exhausted(attempts) {
                return Err(MonitorError::MaxRetriesReached { attempts });
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => return Err(MonitorError::Cancelled),
                _ = sleep(self.settings.retry_delay) => {}
            }
        }
    }

    async fn send_heartbeat(&mut self) {
        let Some(heartbeat) = self.heartbeat.as_mut() else {
            return;
        };

        let result = tokio::select! {
            _ = self.shutdown.cancelled() => return,
            result = heartbeat.beat(&self.transport) => result,
        };

        if let Err(e) = result {
            warn!("Heartbeat failed ({}): {}", e.kind(), e);
            self.heartbeat = None;
        }
    }

    async fn logout(&mut self) {
        let Some(heartbeat) = self.heartbeat.take() else {
            return;
        };

        info!("Logging out");
        match heartbeat.logout(&self.transport).await {
            Ok(()) => info!("Logout request sent"),
            Err(e) => warn!("Logout failed: {}", e),
        }
    }
}

async fn heartbeat_due(due: Option<Instant>) {
    match due {
        Some(due) => sleep_until(due).await,
        None => std::future::pending().await,
    }
}
