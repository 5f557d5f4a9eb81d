//! Session-holding client for the Clodo server-management API.
//!
//! # Design
//! `ClodoClient` logs in once (at construction or through `login`) and keeps
//! the returned token and management URL in its `Session`. Every operation
//! validates its parameters locally, describes its request as a `Call`, and
//! passes it to `dispatch`, the one place that talks to the `Transport` and
//! maps status codes to errors. Operations return the raw response body in
//! the negotiated format; decoding it is left to the caller.
//!
//! Each public call makes at most one round trip and blocks until it
//! finishes. Nothing is retried.

use std::fmt::Display;

use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{Error, RemoteErrorKind, Result};
use crate::headers::find_header;
use crate::http::{HttpMethod, HttpRequest, Transport, UreqTransport};
use crate::payload::{self, Period, ServerDocument, JSON_CONTENT_TYPE, XML_CONTENT_TYPE};
use crate::session::{mask, Session};
use crate::types::{
    numeric, parse_for, timestamp, DataFormat, Datacenter, NewServer, PowerAction, ServerType,
    SupportLevel,
};

pub const AUTH_USER_HEADER: &str = "X-Auth-User";
pub const AUTH_KEY_HEADER: &str = "X-Auth-Key";
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";
pub const MANAGEMENT_URL_HEADER: &str = "X-Server-Management-Url";

/// One outbound request, built by an operation and consumed by `dispatch`.
#[derive(Debug)]
struct Call {
    headers: Vec<(String, String)>,
    login: bool,
    path: String,
    body: Option<String>,
    base_url: Option<String>,
}

impl Call {
    fn login(username: &str, password: &str) -> Self {
        Self {
            headers: vec![
                (AUTH_USER_HEADER.to_string(), username.to_string()),
                (AUTH_KEY_HEADER.to_string(), password.to_string()),
            ],
            login: true,
            path: String::new(),
            body: None,
            base_url: None,
        }
    }

    fn get(path: impl Into<String>) -> Self {
        Self {
            headers: Vec::new(),
            login: false,
            path: path.into(),
            body: None,
            base_url: None,
        }
    }

    fn post(path: impl Into<String>, content_type: &str, body: String) -> Self {
        Self {
            headers: vec![("Content-Type".to_string(), content_type.to_string())],
            login: false,
            path: path.into(),
            body: Some(body),
            base_url: None,
        }
    }

    /// Send to `base_url` instead of the session's management URL.
    fn at(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }
}

/// Client for one account session.
///
/// Not meant to be shared between threads: one instance is one logical
/// session, and `login` replaces the credentials every other call reads.
/// Wrap it in a lock if several threads need it.
#[derive(Debug)]
pub struct ClodoClient<T = UreqTransport> {
    config: ClientConfig,
    transport: T,
    session: Session,
}

impl ClodoClient<UreqTransport> {
    /// Log in to the public API over HTTP. `format` must be `xml` or `json`.
    pub fn connect(username: &str, password: &str, format: &str) -> Result<Self> {
        Self::with_transport(
            ClientConfig::default(),
            UreqTransport::new(),
            username,
            password,
            format,
        )
    }
}

impl<T: Transport> ClodoClient<T> {
    /// Build a client on a custom configuration and transport, then log in.
    ///
    /// The format is checked before anything is sent.
    pub fn with_transport(
        config: ClientConfig,
        transport: T,
        username: &str,
        password: &str,
        format: &str,
    ) -> Result<Self> {
        let format: DataFormat = format.parse()?;
        let mut client = Self {
            config,
            transport,
            session: Session::new(format),
        };
        client.login(username, password)?;
        Ok(client)
    }

    /// Log in (again), replacing the current session.
    ///
    /// Fails with `IncompleteSession` if the response lacks the token or the
    /// management URL; the previous session is then kept untouched.
    pub fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let raw = self.dispatch(Call::login(username.trim(), password.trim()))?;
        let token = session_header(&raw, AUTH_TOKEN_HEADER)?;
        let management_url = session_header(&raw, MANAGEMENT_URL_HEADER)?;

        info!(
            user = username.trim(),
            token = %mask(&token),
            management_url = %management_url,
            "logged in"
        );
        self.session.set(token, management_url);
        Ok(())
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn format(&self) -> DataFormat {
        self.session.format()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Perform one request. Login calls go to the API root and return the
    /// whole raw response; all others carry `Accept` and the session token
    /// and return only the body.
    fn dispatch(&self, call: Call) -> Result<String> {
        let (url, headers) = if call.login {
            (self.config.api_root.clone(), call.headers)
        } else {
            let base = call
                .base_url
                .as_deref()
                .unwrap_or(self.session.management_url());
            let mut headers = vec![
                ("Accept".to_string(), self.session.format().mime().to_string()),
                (
                    AUTH_TOKEN_HEADER.to_string(),
                    self.session.token().to_string(),
                ),
            ];
            headers.extend(call.headers);
            (format!("{base}{}", call.path), headers)
        };

        let request = HttpRequest {
            method: if call.body.is_some() {
                HttpMethod::Post
            } else {
                HttpMethod::Get
            },
            url,
            headers,
            body: call.body,
        };
        debug!(
            method = request.method.as_str(),
            url = %request.url,
            login = call.login,
            token = %mask(self.session.token()),
            "dispatching request"
        );

        let response = self.transport.execute(&request)?;
        check_status(response.status, &request.url)?;

        if call.login {
            Ok(response.to_raw())
        } else {
            Ok(response.body)
        }
    }

    /// `GET /servers/{id}`
    pub fn get_server(&self, id: impl Display) -> Result<String> {
        let id = numeric("get_server", "id", id)?;
        self.dispatch(Call::get(format!("/servers/{id}")))
    }

    /// `GET /servers`, or `/servers/detail` with full records.
    pub fn list_servers(&self, detail: bool) -> Result<String> {
        let path = if detail { "/servers/detail" } else { "/servers" };
        self.dispatch(Call::get(path))
    }

    /// Request quotas of the account.
    pub fn get_limits(&self) -> Result<String> {
        self.dispatch(Call::get("/limits"))
    }

    /// Create a server in the requested datacenter.
    ///
    /// Sent to the datacenter's own endpoint rather than the management URL.
    pub fn create_server(&self, server: &NewServer) -> Result<String> {
        const OP: &str = "create_server";
        let datacenter: Datacenter = parse_for(OP, &server.datacenter)?;
        let server_type: ServerType = parse_for(OP, &server.server_type)?;
        let memory = numeric(OP, "memory", &server.memory)?;
        let memory_max = numeric(OP, "memory_max", &server.memory_max)?;
        let hdd = numeric(OP, "hdd", &server.hdd)?;
        let support: SupportLevel = parse_for(OP, &server.support)?;
        let os = numeric(OP, "os", &server.os)?;

        let body = ServerDocument {
            title: server.name.clone(),
            server_type,
            memory,
            memory_max,
            hdd,
            support,
            os,
        }
        .to_xml()?;
        let base = self.config.datacenter_base(datacenter);
        self.dispatch(Call::post("/servers", XML_CONTENT_TYPE, body).at(base))
    }

    /// Start, stop or reboot a server. `action` is one of `start`, `stop`,
    /// `reboot`.
    pub fn power_action(&self, id: impl Display, action: &str) -> Result<String> {
        const OP: &str = "power_action";
        let action: PowerAction = parse_for(OP, action)?;
        let id = numeric(OP, "id", id)?;
        let body = payload::power_action_xml(action)?;
        self.dispatch(Call::post(
            format!("/servers/{id}/action"),
            XML_CONTENT_TYPE,
            body,
        ))
    }

    /// Reinstall a server from image `image_id`; `isp` toggles the
    /// ISPmanager panel.
    pub fn rebuild_server(
        &self,
        id: impl Display,
        image_id: impl Display,
        isp: impl Display,
    ) -> Result<String> {
        const OP: &str = "rebuild_server";
        let id = numeric(OP, "id", id)?;
        let image_id = numeric(OP, "image_id", image_id)?;
        let isp = numeric(OP, "isp", isp)?;
        let body = payload::rebuild_xml(&image_id, &isp)?;
        self.dispatch(Call::post(
            format!("/servers/{id}/action"),
            XML_CONTENT_TYPE,
            body,
        ))
    }

    /// Current account balance.
    pub fn get_balance(&self) -> Result<String> {
        self.dispatch(Call::get("/billing/balance"))
    }

    /// Billing operations between `from` and `to`, optionally for server
    /// `id` (empty for the whole account).
    ///
    /// The request goes to `/billing` even when an id is given unless
    /// `ClientConfig::qualified_billing_path` is set.
    pub fn get_billing_info(&self, from: &str, to: &str, id: &str) -> Result<String> {
        const OP: &str = "get_billing_info";
        if !id.is_empty() {
            numeric(OP, "id", id)?;
        }
        let period = Period {
            from: timestamp(OP, "from", from)?,
            to: timestamp(OP, "to", to)?,
        };
        let path = if self.config.qualified_billing_path && !id.is_empty() {
            format!("/billing/{id}")
        } else {
            "/billing".to_string()
        };
        let body = payload::billing_json(period)?;
        self.dispatch(Call::post(path, JSON_CONTENT_TYPE, body))
    }

    /// Resource usage of server `id` between `from` and `to`.
    pub fn get_server_stats(&self, id: impl Display, from: &str, to: &str) -> Result<String> {
        const OP: &str = "get_server_stats";
        let id = numeric(OP, "id", id)?;
        let period = Period {
            from: timestamp(OP, "from", from)?,
            to: timestamp(OP, "to", to)?,
        };
        let body = payload::stats_json(period)?;
        self.dispatch(Call::post(format!("/stats/{id}"), JSON_CONTENT_TYPE, body))
    }

    /// Recent event log of server `id`.
    pub fn get_server_log(&self, id: impl Display) -> Result<String> {
        let id = numeric("get_server_log", "id", id)?;
        self.dispatch(Call::get(format!("/servers/{id}/log/")))
    }

    /// Operating system images available for new servers.
    pub fn list_images(&self, detail: bool) -> Result<String> {
        let path = if detail { "/images/detail" } else { "/images" };
        self.dispatch(Call::get(path))
    }
}

/// Map a status code to an error. Anything not explicitly mapped is success.
fn check_status(status: u16, url: &str) -> Result<()> {
    match RemoteErrorKind::from_status(status) {
        None => Ok(()),
        Some(kind) => {
            warn!(status, %kind, url, "request rejected");
            Err(Error::Remote { status, kind })
        }
    }
}

fn session_header(raw: &str, name: &'static str) -> Result<String> {
    match find_header(raw, name) {
        Some(value) if !value.trim().is_empty() => Ok(value.trim_end().to_string()),
        _ => Err(Error::IncompleteSession { header: name }),
    }
}
