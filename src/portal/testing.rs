//! In-process portal doubles for the protocol tests

use super::codec::{
    self, LoginRequest, LoginResponse, StateRequest, StateResponse, TicketRequest, TicketResponse,
};
use super::transport::{PortalRequest, PortalResponse, Transport, TransportError};
use super::Credentials;
use crate::crypto::{Algorithm, PLACEHOLDER_ALGORITHM_ID};
use md5::{Digest, Md5};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

pub const PROBE_URL: &str = "http://probe.test/generate_204";
pub const REDIRECT_URL: &str = "http://portal.test/redirect";
pub const INDEX_URL: &str = "http://portal.test/index";
pub const TICKET_URL: &str = "http://portal.test/ticket?wlanuserip=10.1.2.3&wlanacip=10.0.0.1";
pub const AUTH_URL: &str = "http://portal.test/auth";
pub const KEEP_URL: &str = "http://portal.test/keep";
pub const TERM_URL: &str = "http://portal.test/term";

pub fn credentials() -> Credentials {
    Credentials {
        username: "student".to_string(),
        password: "hunter2".to_string(),
    }
}

/// A request as the double saw it
#[derive(Debug, Clone)]
pub struct Recorded {
    pub request: PortalRequest,
    pub at: Instant,
}

#[derive(Debug)]
struct PortalState {
    algorithm: Algorithm,
    assigned_id: String,
    online: bool,
    school_failures: usize,
    stage_one_status: u16,
    with_location: bool,
    ticket_url: String,
    keep_retry: String,
    intervals: VecDeque<String>,
    failing_heartbeats: bool,
    term_reply: Option<Vec<u8>>,
    tickets_issued: usize,
    ticket: String,
    requests: Vec<Recorded>,
}

/// Scripted ESurfing portal plus the connectivity probe in front of it
#[derive(Debug, Clone)]
pub struct FakePortal {
    state: Arc<Mutex<PortalState>>,
}

impl FakePortal {
    pub fn new(algorithm: Algorithm) -> Self {
        let state = PortalState {
            algorithm,
            assigned_id: algorithm.id().to_string(),
            online: true,
            school_failures: 0,
            stage_one_status: 302,
            with_location: true,
            ticket_url: TICKET_URL.to_string(),
            keep_retry: "60".to_string(),
            intervals: VecDeque::from(["60".to_string()]),
            failing_heartbeats: false,
            term_reply: None,
            tickets_issued: 0,
            ticket: String::new(),
            requests: Vec::new(),
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn with(self, f: impl FnOnce(&mut PortalState)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    /// Probe answers with a redirect until someone logs in
    pub fn offline(self) -> Self {
        self.with(|s| s.online = false)
    }

    /// Negotiation hands out this id instead of the real one
    pub fn assigning(self, id: &str) -> Self {
        let id = id.to_string();
        self.with(|s| s.assigned_id = id)
    }

    /// The first `n` stage-1 requests get a bare 502
    pub fn failing_school_info(self, n: usize) -> Self {
        self.with(|s| s.school_failures = n)
    }

    pub fn without_location(self) -> Self {
        self.with(|s| s.with_location = false)
    }

    pub fn stage_one_status(self, status: u16) -> Self {
        self.with(|s| s.stage_one_status = status)
    }

    pub fn ticket_url(self, url: &str) -> Self {
        let url = url.to_string();
        self.with(|s| s.ticket_url = url)
    }

    pub fn keep_retry(self, seconds: &str) -> Self {
        let seconds = seconds.to_string();
        self.with(|s| s.keep_retry = seconds)
    }

    /// Heartbeat responses in order; the last one repeats
    pub fn heartbeat_intervals(self, intervals: &[&str]) -> Self {
        let intervals = intervals.iter().map(|i| i.to_string()).collect();
        self.with(|s| s.intervals = intervals)
    }

    pub fn failing_heartbeats(self) -> Self {
        self.with(|s| s.failing_heartbeats = true)
    }

    /// Plaintext the term URL answers with instead of a `<response>` document
    pub fn term_reply(self, reply: &[u8]) -> Self {
        let reply = reply.to_vec();
        self.with(|s| s.term_reply = Some(reply))
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn requests_to(&self, url: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.request.url == url)
            .collect()
    }

    /// Last ticket handed out
    pub fn ticket(&self) -> String {
        self.state.lock().unwrap().ticket.clone()
    }

    pub fn is_online(&self) -> bool {
        self.state.lock().unwrap().online
    }

    pub fn set_online(&self, online: bool) {
        self.state.lock().unwrap().online = online;
    }

    fn respond(&self, request: PortalRequest) -> Result<PortalResponse, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(Recorded {
            request: request.clone(),
            at: Instant::now(),
        });

        if let Some(checksum) = request.header_value("CDC-Checksum") {
            if checksum != hex::encode(Md5::digest(&request.body)) {
                return Ok(PortalResponse::new(400));
            }
        }

        let url = request.url.as_str();
        if url == PROBE_URL {
            return Ok(if state.online {
                PortalResponse::new(204)
            } else {
                PortalResponse::new(302).with_header("Location", REDIRECT_URL)
            });
        }
        if url == REDIRECT_URL {
            return Ok(state.school_info());
        }
        if url == INDEX_URL {
            return Ok(PortalResponse::new(200).with_body(state.index_page()));
        }
        if url == state.ticket_url {
            return Ok(state.ticket(&request));
        }
        if url == AUTH_URL {
            return Ok(state.login(&request));
        }
        if url == KEEP_URL {
            if state.failing_heartbeats {
                return Err(TransportError::Connection("keep-alive refused".to_string()));
            }
            return Ok(state.keep(&request));
        }
        if url == TERM_URL {
            state.online = false;
            return Ok(match &state.term_reply {
                Some(reply) => PortalResponse::new(200).with_body(state.algorithm.encrypt(reply)),
                None => state.encrypted(&StateResponse::default()),
            });
        }
        Ok(PortalResponse::new(404))
    }
}

impl PortalState {
    fn school_info(&mut self) -> PortalResponse {
        if self.school_failures > 0 {
            self.school_failures -= 1;
            return PortalResponse::new(502);
        }

        let response = PortalResponse::new(self.stage_one_status)
            .with_header("domain", "gd")
            .with_header("area", "gz")
            .with_header("schoolid", "1234");
        if self.with_location {
            response.with_header("Location", INDEX_URL)
        } else {
            response
        }
    }

    fn index_page(&self) -> String {
        format!(
            "<html><script><!--//config.campus.js.chinatelecom.com <config>\
             <ticket-url><![CDATA[{}&width=0]]></ticket-url>\
             <auth-url><![CDATA[{}]]></auth-url>\
             </config>//config.campus.js.chinatelecom.com--></script></html>",
            self.ticket_url, AUTH_URL
        )
    }

    fn ticket(&mut self, request: &PortalRequest) -> PortalResponse {
        if request.header_value("Algo-ID") == Some(PLACEHOLDER_ALGORITHM_ID) {
            let mut body = vec![0, 0, 0, 4, 1, 2, 3, 4, self.assigned_id.len() as u8];
            body.extend_from_slice(self.assigned_id.as_bytes());
            return PortalResponse::new(200).with_body(body);
        }

        if self.decrypt::<TicketRequest>(request).is_none() {
            return PortalResponse::new(400);
        }
        self.tickets_issued += 1;
        self.ticket = format!("TICKET-{}", self.tickets_issued);
        self.encrypted(&TicketResponse {
            ticket: self.ticket.clone(),
            expire: "3600".to_string(),
        })
    }

    fn login(&mut self, request: &PortalRequest) -> PortalResponse {
        let Some(login) = self.decrypt::<LoginRequest>(request) else {
            return PortalResponse::new(400);
        };
        let expected = credentials();
        if login.userid != expected.username
            || login.passwd != expected.password
            || login.ticket != self.ticket
        {
            return self.encrypted(&LoginResponse::default());
        }

        self.online = true;
        self.encrypted(&LoginResponse {
            userid: login.userid,
            keep_retry: self.keep_retry.clone(),
            keep_url: KEEP_URL.to_string(),
            term_url: TERM_URL.to_string(),
        })
    }

    fn keep(&mut self, request: &PortalRequest) -> PortalResponse {
        if self.decrypt::<StateRequest>(request).is_none() {
            return PortalResponse::new(400);
        }
        let interval = if self.intervals.len() > 1 {
            self.intervals.pop_front()
        } else {
            self.intervals.front().cloned()
        };
        self.encrypted(&StateResponse {
            interval: interval.unwrap_or_default(),
            level: "1".to_string(),
        })
    }

    /// Only accepts payloads under the algorithm it actually runs
    fn decrypt<T: serde::de::DeserializeOwned>(&self, request: &PortalRequest) -> Option<T> {
        if request.header_value("Algo-ID") != Some(self.algorithm.id()) {
            return None;
        }
        let plaintext = self.algorithm.decrypt(&request.body).ok()?;
        codec::from_document(&plaintext).ok()
    }

    fn encrypted<T: serde::Serialize>(&self, message: &T) -> PortalResponse {
        let document = codec::to_document(message).unwrap();
        PortalResponse::new(200).with_body(self.algorithm.encrypt(&document))
    }
}

impl Transport for FakePortal {
    async fn send(&self, request: PortalRequest) -> Result<PortalResponse, TransportError> {
        self.respond(request)
    }
}

#[derive(Debug, Default)]
struct Script {
    responses: VecDeque<Result<PortalResponse, TransportError>>,
    requests: Vec<PortalRequest>,
    stalled: bool,
}

/// Replays canned responses in order, then fails
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    script: Arc<Mutex<Script>>,
}

impl MockTransport {
    pub fn new(responses: Vec<Result<PortalResponse, TransportError>>) -> Self {
        let script = Script {
            responses: responses.into(),
            ..Script::default()
        };
        Self {
            script: Arc::new(Mutex::new(script)),
        }
    }

    /// Never answers
    pub fn stalled() -> Self {
        let transport = Self::default();
        transport.script.lock().unwrap().stalled = true;
        transport
    }

    pub fn requests(&self) -> Vec<PortalRequest> {
        self.script.lock().unwrap().requests.clone()
    }

    fn next(&self, request: PortalRequest) -> Option<Result<PortalResponse, TransportError>> {
        let mut script = self.script.lock().unwrap();
        script.requests.push(request);
        if script.stalled {
            return None;
        }
        Some(
            script
                .responses
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Connection("script exhausted".to_string()))),
        )
    }
}

impl Transport for MockTransport {
    async fn send(&self, request: PortalRequest) -> Result<PortalResponse, TransportError> {
        match self.next(request) {
            Some(response) => response,
            None => std::future::pending().await,
        }
    }
}
