//! Authentication state machine
//!
//! Walks the portal login one stage at a time:
//! 1. school info - GET the redirect URL, collect the school headers
//! 2. EConfig - GET the index page, extract the ticket and auth URLs
//! 3. user/AC IP - read them from the ticket URL query
//! 4. algorithm negotiation - the portal assigns a cipher
//! 5. ticket - encrypted ticket request
//! 6. login - encrypted login, yields keep/term URLs and heartbeat interval
//!
//! Every attempt starts from nothing. Values produced by one stage are
//! handed to the next as locals, so a retry cannot see a previous
//! attempt's fields.

use super::codec::{
    self, LoginRequest, LoginResponse, StateRequest, TicketRequest, TicketResponse,
};
use super::transport::Transport;
use super::{AuthError, Credentials, ErrorKind, USER_AGENT};
use crate::crypto::{self, Algorithm, PLACEHOLDER_ALGORITHM_ID};
use codec::CodecError;
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

/// Gap between ticket and login; the portal rejects logins sent back to back
const LOGIN_PAUSE: Duration = Duration::from_millis(333);

const HOSTNAME_LEN: usize = 10;

/// Where the state machine stood when it stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    SchoolInfoFetched,
    EConfigResolved,
    UserIpResolved,
    AlgorithmNegotiated,
    TicketObtained,
    LoggedIn,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::SchoolInfoFetched => "school info fetched",
            Stage::EConfigResolved => "EConfig resolved",
            Stage::UserIpResolved => "user IP resolved",
            Stage::AlgorithmNegotiated => "algorithm negotiated",
            Stage::TicketObtained => "ticket obtained",
            Stage::LoggedIn => "logged in",
        };
        f.write_str(name)
    }
}

/// A failed attempt and the last stage it completed
#[derive(Error, Debug)]
#[error("Handshake failed after stage '{stage}': {source}")]
pub struct HandshakeError {
    pub stage: Stage,
    pub source: AuthError,
}

impl HandshakeError {
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

/// Per-attempt identity presented to the portal
#[derive(Debug, Clone)]
pub struct Identity {
    pub client_id: Uuid,
    pub hostname: String,
    pub mac: String,
}

impl Identity {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            client_id: Uuid::new_v4(),
            hostname: random_hostname(&mut rng),
            mac: random_mac(&mut rng),
        }
    }
}

fn random_hostname<R: Rng>(rng: &mut R) -> String {
    (0..HOSTNAME_LEN)
        .map(|_| char::from(rng.sample(Alphanumeric)))
        .collect()
}

/// Unicast, locally administered
fn random_mac<R: Rng>(rng: &mut R) -> String {
    let mut octets: [u8; 6] = rng.r#gen();
    octets[0] = (octets[0] & 0xfe) | 0x02;
    octets
        .iter()
        .map(|octet| format!("{:02x}", octet))
        .collect::<Vec<_>>()
        .join(":")
}

/// Headers from the stage-1 redirect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchoolInfo {
    pub domain: String,
    pub area: String,
    pub school_id: String,
    pub index_url: String,
}

/// Everything a logged-in account needs to keep and end its session
#[derive(Debug, Clone)]
pub struct Session {
    pub identity: Identity,
    pub school: SchoolInfo,
    pub ticket_url: String,
    pub auth_url: String,
    pub user_ip: String,
    pub ac_ip: String,
    pub algorithm: Algorithm,
    pub ticket: String,
    pub keep_url: String,
    pub term_url: String,
    pub heartbeat_interval: Duration,
}

impl Session {
    /// State document used for heartbeats and logout
    pub fn state_request(&self) -> StateRequest {
        StateRequest {
            user_agent: USER_AGENT.to_string(),
            client_id: self.identity.client_id.to_string(),
            local_time: codec::local_time(),
            host_name: self.identity.hostname.clone(),
            ipv4: self.user_ip.clone(),
            ticket: self.ticket.clone(),
            ipv6: String::new(),
            mac: self.identity.mac.clone(),
            ostag: self.identity.hostname.clone(),
        }
    }
}

/// Run one full attempt against the portal behind `redirect_url`
pub async fn authenticate<T: Transport>(
    transport: &T,
    credentials: &Credentials,
    redirect_url: &str,
) -> Result<Session, HandshakeError> {
    let mut stage = Stage::Idle;
    run_stages(transport, credentials, redirect_url, &mut stage)
        .await
        .map_err(|source| HandshakeError { stage, source })
}

async fn run_stages<T: Transport>(
    transport: &T,
    credentials: &Credentials,
    redirect_url: &str,
    stage: &mut Stage,
) -> Result<Session, AuthError> {
    let school = fetch_school_info(transport, redirect_url).await?;
    info!("Domain: {}, area: {}, school id: {}", school.domain, school.area, school.school_id);
    info!("Index URL: {}", school.index_url);
    *stage = Stage::SchoolInfoFetched;

    let identity = Identity::generate();
    debug!(
        "Client id {}, hostname {}, mac {}",
        identity.client_id, identity.hostname, identity.mac
    );

    let econfig = fetch_econfig(transport, &identity, &school).await?;
    info!("Ticket URL: {}", econfig.ticket_url);
    *stage = Stage::EConfigResolved;

    let (user_ip, ac_ip) = client_addresses(&econfig.ticket_url)?;
    info!("User IP: {}, AC IP: {}", user_ip, ac_ip);
    *stage = Stage::UserIpResolved;

    let algorithm = negotiate_algorithm(transport, &identity, &econfig.ticket_url).await?;
    info!("Algorithm: {} ({})", algorithm, algorithm.id());
    *stage = Stage::AlgorithmNegotiated;

    let ticket_request = TicketRequest {
        user_agent: USER_AGENT.to_string(),
        client_id: identity.client_id.to_string(),
        local_time: codec::local_time(),
        host_name: identity.hostname.clone(),
        ipv4: user_ip.clone(),
        ipv6: String::new(),
        mac: identity.mac.clone(),
        ostag: identity.hostname.clone(),
        gwip: ac_ip.clone(),
    };
    let response: TicketResponse = codec::exchange(
        transport,
        &econfig.ticket_url,
        &identity.client_id,
        algorithm,
        &ticket_request,
        None,
    )
    .await?;
    if response.ticket.is_empty() {
        return Err(CodecError::MissingField("ticket").into());
    }
    let ticket = response.ticket;
    info!("Ticket: {}", ticket);
    *stage = Stage::TicketObtained;

    tokio::time::sleep(LOGIN_PAUSE).await;

    let login_request = LoginRequest {
        user_agent: USER_AGENT.to_string(),
        client_id: identity.client_id.to_string(),
        ticket: ticket.clone(),
        local_time: codec::local_time(),
        userid: credentials.username.clone(),
        passwd: credentials.password.clone(),
    };
    let response: LoginResponse = codec::exchange(
        transport,
        &econfig.auth_url,
        &identity.client_id,
        algorithm,
        &login_request,
        None,
    )
    .await?;
    let heartbeat_interval = codec::parse_seconds("keep-retry", &response.keep_retry)?;
    if response.keep_url.is_empty() {
        return Err(CodecError::MissingField("keep-url").into());
    }
    if response.term_url.is_empty() {
        return Err(CodecError::MissingField("term-url").into());
    }
    info!("Keep URL: {}", response.keep_url);
    info!("Term URL: {}", response.term_url);
    *stage = Stage::LoggedIn;

    Ok(Session {
        identity,
        school,
        ticket_url: econfig.ticket_url,
        auth_url: econfig.auth_url,
        user_ip,
        ac_ip,
        algorithm,
        ticket,
        keep_url: response.keep_url,
        term_url: response.term_url,
        heartbeat_interval,
    })
}

/// Stage 1. Sent before the identity exists, so the client id is nil.
async fn fetch_school_info<T: Transport>(
    transport: &T,
    redirect_url: &str,
) -> Result<SchoolInfo, AuthError> {
    let request = codec::get_request(redirect_url, &Uuid::nil(), None);
    let response = transport.send(request).await?;

    let school = match (
        response.header("domain"),
        response.header("area"),
        response.header("schoolid"),
        response.header("Location"),
    ) {
        (Some(domain), Some(area), Some(school_id), Some(index_url)) => SchoolInfo {
            domain: domain.to_string(),
            area: area.to_string(),
            school_id: school_id.to_string(),
            index_url: index_url.to_string(),
        },
        _ => return Err(AuthError::MissingSchoolInfo),
    };

    if response.status != 302 {
        return Err(AuthError::UnexpectedStatus {
            status: response.status,
            expected: 302,
        });
    }
    Ok(school)
}

async fn fetch_econfig<T: Transport>(
    transport: &T,
    identity: &Identity,
    school: &SchoolInfo,
) -> Result<codec::EConfig, AuthError> {
    let request = codec::get_request(&school.index_url, &identity.client_id, Some(school));
    let response = transport.send(request).await?;
    Ok(codec::parse_econfig(&response.body)?)
}

fn client_addresses(ticket_url: &str) -> Result<(String, String), AuthError> {
    let url = Url::parse(ticket_url)?;
    let query = |name: &str| {
        url.query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty())
    };

    match (query("wlanuserip"), query("wlanacip")) {
        (Some(user_ip), Some(ac_ip)) => Ok((user_ip, ac_ip)),
        _ => Err(AuthError::MissingClientAddress),
    }
}

async fn negotiate_algorithm<T: Transport>(
    transport: &T,
    identity: &Identity,
    ticket_url: &str,
) -> Result<Algorithm, AuthError> {
    let request = codec::post_request(
        ticket_url,
        &identity.client_id,
        PLACEHOLDER_ALGORITHM_ID,
        PLACEHOLDER_ALGORITHM_ID.as_bytes().to_vec(),
    );
    let response = transport.send(request).await?;

    let negotiation = codec::decode_algorithm_id(&response.body)?;
    debug!("Negotiation key: {}", hex::encode(&negotiation.key));
    Ok(crypto::lookup(&negotiation.algorithm_id)?)
}
