//! Session keep-alive
//!
//! The portal decides the cadence: every heartbeat response carries the
//! interval to wait before the next one.

use super::codec::{self, StateResponse};
use super::handshake::Session;
use super::transport::{Transport, TransportError};
use super::AuthError;
use std::time::Duration;
use tokio::time::{Instant, timeout};
use tracing::{debug, info};

/// Upper bound on the logout request so shutdown cannot hang
pub const LOGOUT_TIMEOUT: Duration = Duration::from_secs(1);

/// A logged-in session and when its next heartbeat is due
#[derive(Debug)]
pub struct Heartbeat {
    session: Session,
    interval: Duration,
    due: Instant,
}

impl Heartbeat {
    /// The first heartbeat waits for the login's keep-retry interval
    pub fn new(session: Session) -> Self {
        let interval = session.heartbeat_interval;
        Self {
            session,
            interval,
            due: Instant::now() + interval,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Wait before the next heartbeat
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn due(&self) -> Instant {
        self.due
    }

    /// Send one heartbeat and re-arm with the interval the portal returns
    pub async fn beat<T: Transport>(&mut self, transport: &T) -> Result<Duration, AuthError> {
        let request = self.session.state_request();
        let response: StateResponse = codec::exchange(
            transport,
            &self.session.keep_url,
            &self.session.identity.client_id,
            self.session.algorithm,
            &request,
            None,
        )
        .await?;

        let interval = codec::parse_seconds("interval", &response.interval)?;
        self.interval = interval;
        self.due = Instant::now() + interval;
        debug!("Heartbeat sent, level {:?}", response.level);
        info!("Next heartbeat in {}s", interval.as_secs());
        Ok(interval)
    }

    /// Post the state document to the term URL, once, under a short deadline.
    /// The reply only has to decrypt; its content is not interpreted.
    pub async fn logout<T: Transport>(self, transport: &T) -> Result<(), AuthError> {
        let term_url = self.session.term_url.clone();
        let request = self.session.state_request();
        let exchange = codec::post_encrypted(
            transport,
            &term_url,
            &self.session.identity.client_id,
            self.session.algorithm,
            &request,
            Some(LOGOUT_TIMEOUT),
        );

        timeout(LOGOUT_TIMEOUT, exchange)
            .await
            .map_err(|_| TransportError::Timeout(term_url.clone()))??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Algorithm;
    use crate::portal::authenticate;
    use crate::portal::testing::{
        FakePortal, KEEP_URL, MockTransport, REDIRECT_URL, TERM_URL, credentials,
    };

    async fn logged_in(portal: &FakePortal) -> Heartbeat {
        let session = authenticate(portal, &credentials(), REDIRECT_URL)
            .await
            .unwrap();
        Heartbeat::new(session)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_wait_is_keep_retry() {
        let portal = FakePortal::new(Algorithm::AesCbc).keep_retry("60");
        let heartbeat = logged_in(&portal).await;

        assert_eq!(heartbeat.interval(), Duration::from_secs(60));
        assert_eq!(heartbeat.due(), Instant::now() + Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_rearms_from_response() {
        let portal = FakePortal::new(Algorithm::Sm4Cbc)
            .keep_retry("60")
            .heartbeat_intervals(&["45", "30"]);
        let mut heartbeat = logged_in(&portal).await;

        assert_eq!(heartbeat.beat(&portal).await.unwrap(), Duration::from_secs(45));
        assert_eq!(heartbeat.interval(), Duration::from_secs(45));
        assert_eq!(heartbeat.due(), Instant::now() + Duration::from_secs(45));

        assert_eq!(heartbeat.beat(&portal).await.unwrap(), Duration::from_secs(30));
        assert_eq!(heartbeat.due(), Instant::now() + Duration::from_secs(30));

        let keeps = portal.requests_to(KEEP_URL);
        assert_eq!(keeps.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_numeric_interval_fails() {
        let portal = FakePortal::new(Algorithm::XteaIv).heartbeat_intervals(&["later"]);
        let mut heartbeat = logged_in(&portal).await;

        let err = heartbeat.beat(&portal).await.unwrap_err();
        assert!(matches!(err, AuthError::Codec(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_surfaces() {
        let portal = FakePortal::new(Algorithm::Zuc).failing_heartbeats();
        let mut heartbeat = logged_in(&portal).await;

        let err = heartbeat.beat(&portal).await.unwrap_err();
        assert!(matches!(err, AuthError::Transport(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_posts_state_to_term_url() {
        let portal = FakePortal::new(Algorithm::DesEdeEcb);
        let heartbeat = logged_in(&portal).await;
        assert!(portal.is_online());

        heartbeat.logout(&portal).await.unwrap();

        let terms = portal.requests_to(TERM_URL);
        assert_eq!(terms.len(), 1);
        assert_eq!(terms[0].request.timeout, Some(LOGOUT_TIMEOUT));
        assert!(!portal.is_online());
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_accepts_any_decryptable_reply() {
        let portal = FakePortal::new(Algorithm::Sm4Ecb).term_reply(b"logged out");
        let heartbeat = logged_in(&portal).await;

        heartbeat.logout(&portal).await.unwrap();
        assert_eq!(portal.requests_to(TERM_URL).len(), 1);
        assert!(!portal.is_online());
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_is_bounded() {
        let portal = FakePortal::new(Algorithm::AesEcb);
        let heartbeat = logged_in(&portal).await;

        let stalled = MockTransport::stalled();
        let started = Instant::now();
        let err = heartbeat.logout(&stalled).await.unwrap_err();

        assert!(matches!(err, AuthError::Transport(TransportError::Timeout(_))));
        assert!(started.elapsed() >= LOGOUT_TIMEOUT);
        assert!(started.elapsed() < LOGOUT_TIMEOUT * 2);
    }
}
