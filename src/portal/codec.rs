//! Portal message shapes and framing
//!
//! Outbound XML documents are serialized with a fixed prolog, encrypted
//! with the negotiated [`Algorithm`], and posted as an uppercase hex
//! envelope. Responses come back the same way.

use super::handshake::SchoolInfo;
use super::transport::{PortalRequest, Transport};
use super::{AuthError, USER_AGENT};
use crate::crypto::Algorithm;
use md5::{Digest, Md5};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::string::FromUtf8Error;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

pub const ACCEPT: &str = "text/html,text/xml,application/xhtml+xml,application/x-javascript,*/*";

const XML_PROLOG: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

const ECONFIG_START: &str = "<!--//config.campus.js.chinatelecom.com ";
const ECONFIG_END: &str = "//config.campus.js.chinatelecom.com-->";
const ECONFIG_NOISE: [&str; 2] = ["&width=0", "&adtype=0"];

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("XML parsing failed: {0}")]
    XmlError(#[from] quick_xml::DeError),

    #[error("XML serialization failed: {0}")]
    XmlWriteError(#[from] quick_xml::SeError),

    #[error("Payload is not UTF-8: {0}")]
    Utf8Error(#[from] FromUtf8Error),

    #[error("EConfig {0} marker not found")]
    MarkerNotFound(&'static str),

    #[error("Algorithm negotiation data truncated: {0}")]
    Truncated(&'static str),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid number in {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
}

/// Ticket request, posted to the ticket URL
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "request")]
pub struct TicketRequest {
    #[serde(rename = "user-agent")]
    pub user_agent: String,
    #[serde(rename = "client-id")]
    pub client_id: String,
    #[serde(rename = "local-time")]
    pub local_time: String,
    #[serde(rename = "host-name")]
    pub host_name: String,
    pub ipv4: String,
    #[serde(default)]
    pub ipv6: String,
    pub mac: String,
    pub ostag: String,
    pub gwip: String,
}

/// Login request, posted to the auth URL
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename = "request")]
pub struct LoginRequest {
    #[serde(rename = "user-agent")]
    pub user_agent: String,
    #[serde(rename = "client-id")]
    pub client_id: String,
    pub ticket: String,
    #[serde(rename = "local-time")]
    pub local_time: String,
    pub userid: String,
    pub passwd: String,
}

/// Heartbeat and logout request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "request")]
pub struct StateRequest {
    #[serde(rename = "user-agent")]
    pub user_agent: String,
    #[serde(rename = "client-id")]
    pub client_id: String,
    #[serde(rename = "local-time")]
    pub local_time: String,
    #[serde(rename = "host-name")]
    pub host_name: String,
    pub ipv4: String,
    pub ticket: String,
    #[serde(default)]
    pub ipv6: String,
    pub mac: String,
    pub ostag: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename = "response", default)]
pub struct TicketResponse {
    pub ticket: String,
    pub expire: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename = "response", default)]
pub struct LoginResponse {
    pub userid: String,
    #[serde(rename = "keep-retry")]
    pub keep_retry: String,
    #[serde(rename = "keep-url")]
    pub keep_url: String,
    #[serde(rename = "term-url")]
    pub term_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename = "response", default)]
pub struct StateResponse {
    pub interval: String,
    pub level: String,
}

/// Configuration fragment embedded in the portal index page
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename = "config", default)]
pub struct EConfig {
    #[serde(rename = "ticket-url")]
    pub ticket_url: String,
    #[serde(rename = "auth-url")]
    pub auth_url: String,
    #[serde(rename = "query-url")]
    pub query_url: String,
    #[serde(rename = "state-url")]
    pub state_url: String,
    #[serde(rename = "state-interval")]
    pub state_interval: String,
}

/// Result of algorithm negotiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiation {
    pub key: Vec<u8>,
    pub algorithm_id: String,
}

/// Serialize a message with the XML prolog the portal expects
pub fn to_document<T: Serialize>(message: &T) -> Result<Vec<u8>, CodecError> {
    let body = quick_xml::se::to_string(message)?;
    let mut document = String::with_capacity(XML_PROLOG.len() + body.len());
    document.push_str(XML_PROLOG);
    document.push_str(&body);
    Ok(document.into_bytes())
}

pub fn from_document<T: DeserializeOwned>(document: &[u8]) -> Result<T, CodecError> {
    let text = String::from_utf8(document.to_vec())?;
    Ok(quick_xml::de::from_str(&text)?)
}

/// Pull the EConfig payload out of the index page and drop the noise tokens
pub fn extract_econfig(page: &str) -> Result<String, CodecError> {
    let (_, rest) = page
        .split_once(ECONFIG_START)
        .ok_or(CodecError::MarkerNotFound("start"))?;
    let (payload, _) = rest
        .split_once(ECONFIG_END)
        .ok_or(CodecError::MarkerNotFound("end"))?;

    Ok(ECONFIG_NOISE
        .iter()
        .fold(payload.to_string(), |acc, noise| acc.replace(noise, "")))
}

/// Parse the index page into the EConfig; both URLs are required
pub fn parse_econfig(page: &[u8]) -> Result<EConfig, CodecError> {
    let payload = extract_econfig(&String::from_utf8_lossy(page))?;
    let config: EConfig = from_document(payload.as_bytes())?;

    if config.ticket_url.is_empty() {
        return Err(CodecError::MissingField("ticket-url"));
    }
    if config.auth_url.is_empty() {
        return Err(CodecError::MissingField("auth-url"));
    }
    Ok(config)
}

/// Decode `[3 reserved][len][key][len][algorithm id]`
pub fn decode_algorithm_id(data: &[u8]) -> Result<Negotiation, CodecError> {
    if data.len() < 4 {
        return Err(CodecError::Truncated("insufficient header length"));
    }

    let key_len = data[3] as usize;
    let mut pos = 4;
    let key = data
        .get(pos..pos + key_len)
        .ok_or(CodecError::Truncated("key length exceeds data size"))?;
    pos += key_len;

    let id_len = *data
        .get(pos)
        .ok_or(CodecError::Truncated("missing algorithm id header"))? as usize;
    pos += 1;

    let id = data
        .get(pos..pos + id_len)
        .ok_or(CodecError::Truncated("algorithm id length exceeds data size"))?;

    Ok(Negotiation {
        key: key.to_vec(),
        algorithm_id: String::from_utf8_lossy(id).into_owned(),
    })
}

/// Whole seconds, as the portal sends them
pub fn parse_seconds(field: &'static str, value: &str) -> Result<Duration, CodecError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| CodecError::InvalidNumber {
            field,
            value: value.to_string(),
        })
}

pub fn local_time() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// GET with the client signature; school headers once stage 1 has them
pub fn get_request(url: &str, client_id: &Uuid, school: Option<&SchoolInfo>) -> PortalRequest {
    let mut request = PortalRequest::get(url)
        .header("User-Agent", USER_AGENT)
        .header("Accept", ACCEPT)
        .header("Client-ID", client_id.to_string())
        .header("Connection", "keep-alive");

    if let Some(school) = school {
        request = request
            .header("CDC-SchoolId", school.school_id.as_str())
            .header("CDC-Domain", school.domain.as_str())
            .header("CDC-Area", school.area.as_str());
    }
    request
}

/// POST with the checksum of the exact body and the algorithm id
pub fn post_request(url: &str, client_id: &Uuid, algorithm_id: &str, body: Vec<u8>) -> PortalRequest {
    let checksum = hex::encode(Md5::digest(&body));
    PortalRequest::post(url, body)
        .header("User-Agent", USER_AGENT)
        .header("Accept", ACCEPT)
        .header("Client-ID", client_id.to_string())
        .header("CDC-Checksum", checksum)
        .header("Algo-ID", algorithm_id)
}

/// Encrypt, post, decrypt, parse
pub async fn exchange<T, M, R>(
    transport: &T,
    url: &str,
    client_id: &Uuid,
    algorithm: Algorithm,
    message: &M,
    timeout: Option<Duration>,
) -> Result<R, AuthError>
where
    T: Transport,
    M: Serialize,
    R: DeserializeOwned,
{
    let plaintext = post_encrypted(transport, url, client_id, algorithm, message, timeout).await?;
    Ok(from_document(&plaintext)?)
}

/// Encrypt, post, decrypt; the reply is returned unparsed
pub async fn post_encrypted<T, M>(
    transport: &T,
    url: &str,
    client_id: &Uuid,
    algorithm: Algorithm,
    message: &M,
    timeout: Option<Duration>,
) -> Result<Vec<u8>, AuthError>
where
    T: Transport,
    M: Serialize,
{
    let document = to_document(message)?;
    let envelope = algorithm.encrypt(&document);

    let mut request = post_request(url, client_id, algorithm.id(), envelope.into_bytes());
    if let Some(timeout) = timeout {
        request = request.timeout(timeout);
    }

    let response = transport.send(request).await?;
    let plaintext = algorithm.decrypt(&response.body)?;
    debug!("Response from {}: {}", url, String::from_utf8_lossy(&plaintext));
    Ok(plaintext)
}
