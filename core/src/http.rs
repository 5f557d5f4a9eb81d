//! HTTP transport types and the blocking transport.
//!
//! # Design
//! Requests and responses are plain owned data. The client builds an
//! `HttpRequest`, hands it to a `Transport`, and interprets the returned
//! `HttpResponse` itself, so status mapping lives in one place and tests can
//! swap the network for a scripted transport. A `Transport` only reports
//! whether the round trip completed; it never judges the status code.

use tracing::{debug, error};

use crate::error::{Error, Result};

/// HTTP method for a request. A body implies `Post`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// An HTTP request described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    /// Value of the first header called `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    /// Render the response as a raw HTTP/1.1 message: status line, headers,
    /// a blank line, then the body.
    ///
    /// Header names are written in canonical form (`X-Auth-Token`) because
    /// HTTP libraries lowercase them while header lookup is case-sensitive.
    pub fn to_raw(&self) -> String {
        let mut raw = format!("HTTP/1.1 {}\r\n", self.status);
        for (name, value) in &self.headers {
            raw.push_str(&canonical_header_name(name));
            raw.push_str(": ");
            raw.push_str(value);
            raw.push_str("\r\n");
        }
        raw.push_str("\r\n");
        raw.push_str(&self.body);
        raw
    }
}

/// `x-server-management-url` -> `X-Server-Management-Url`.
pub fn canonical_header_name(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => {
                    first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Performs one HTTP round trip.
///
/// Implementations return every status code as data and only fail with
/// `Error::Transport` when no response was obtained.
pub trait Transport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        (**self).execute(request)
    }
}

/// Largest response body `UreqTransport` will read.
pub const MAX_BODY_BYTES: u64 = 64 * 1024 * 1024;

/// Blocking transport on a `ureq` agent with default timeouts.
///
/// Redirects are not followed: a 3xx comes back as the response, and the
/// session token never travels to the host a `Location` header names.
/// Bodies are read as bytes; invalid UTF-8 is replaced with U+FFFD rather
/// than failing a completed round trip.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl std::fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UreqTransport").finish_non_exhaustive()
    }
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .max_redirects(0)
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let transport_error = |source: ureq::Error| {
            error!(url = %request.url, %source, "transport failure");
            Error::Transport {
                url: request.url.clone(),
                source: Box::new(source),
            }
        };

        let sent = match &request.body {
            Some(body) => {
                let mut builder = self.agent.post(&request.url);
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                builder.send(body.as_bytes())
            }
            None => {
                let mut builder = self.agent.get(&request.url);
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                builder.call()
            }
        };
        let mut response = sent.map_err(transport_error)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let bytes = response
            .body_mut()
            .with_config()
            .limit(MAX_BODY_BYTES)
            .read_to_vec()
            .map_err(transport_error)?;
        let body = String::from_utf8_lossy(&bytes).into_owned();

        debug!(status, url = %request.url, "response received");
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
