use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use axum::{
    body::Body,
    extract::{Path, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
    Reader, Writer,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};
use uuid::Uuid;

pub const DEFAULT_USER: &str = "demo";
pub const DEFAULT_KEY: &str = "secret";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    pub id: u64,
    pub name: String,
    pub datacenter: String,
    pub server_type: String,
    pub memory: String,
    pub memory_max: String,
    pub hdd: String,
    pub support: String,
    pub image_id: String,
    pub isp: String,
    pub status: String,
    #[serde(skip)]
    pub admin_pass: String,
    #[serde(skip)]
    pub log: Vec<String>,
}

/// A request as it reached the server, before routing.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Action {
    Start,
    Stop,
    Reboot,
    Rebuild { image_id: String, isp: String },
}

#[derive(Deserialize)]
struct Period {
    from: i64,
    to: i64,
}

#[derive(Deserialize)]
struct BillingQuery {
    billing: Period,
}

#[derive(Deserialize)]
struct StatsQuery {
    stats: Period,
}

struct Inner {
    base_url: String,
    accounts: HashMap<String, String>,
    tokens: RwLock<HashSet<String>>,
    servers: RwLock<BTreeMap<u64, Server>>,
    next_id: AtomicU64,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Shared state of the emulated API.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

impl AppState {
    /// State for a server reachable at `base_url`, with the default account.
    pub fn new(base_url: &str) -> Self {
        Self::with_accounts(base_url, &[(DEFAULT_USER, DEFAULT_KEY)])
    }

    pub fn with_accounts(base_url: &str, accounts: &[(&str, &str)]) -> Self {
        let inner = Inner {
            base_url: base_url.trim_end_matches('/').to_string(),
            accounts: accounts
                .iter()
                .map(|(user, key)| (user.to_string(), key.to_string()))
                .collect(),
            tokens: RwLock::new(HashSet::new()),
            servers: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            requests: Mutex::new(Vec::new()),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Handed out by login as `X-Server-Management-Url`.
    pub fn management_url(&self) -> String {
        format!("{}/v1", self.inner.base_url)
    }

    /// Creation endpoint template, `{datacenter}` left for the client.
    pub fn datacenter_url(&self) -> String {
        format!("{}/dc/{{datacenter}}", self.inner.base_url)
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.inner
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, request: RecordedRequest) {
        self.inner
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
    }
}

pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .route("/limits", get(limits))
        .route("/servers", get(list_servers))
        .route("/servers/detail", get(list_servers_detail))
        .route("/servers/{id}", get(get_server))
        .route("/servers/{id}/action", post(server_action))
        .route("/servers/{id}/log/", get(server_log))
        .route("/billing", post(billing))
        .route("/billing/balance", get(balance))
        .route("/stats/{id}", post(stats))
        .route("/images", get(list_images))
        .route("/images/detail", get(list_images_detail));

    let protected = Router::new()
        .nest("/v1", api)
        .route("/dc/{datacenter}/servers", post(create_server))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/", get(login))
        .merge(protected)
        .layer(middleware::from_fn_with_state(state.clone(), record))
        .with_state(state)
}

/// Serve on `listener`, advertising its own address as the management URL.
pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    serve(listener, AppState::new(&format!("http://{addr}"))).await
}

pub async fn serve(listener: TcpListener, state: AppState) -> Result<(), std::io::Error> {
    info!(base_url = state.base_url(), "mock API listening");
    axum::serve(listener, app(state)).await
}

// --- middleware ---

async fn record(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;
    debug!(method = %parts.method, path = parts.uri.path(), "request");
    state.record(RecordedRequest {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        headers: parts
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect(),
        body: String::from_utf8_lossy(&bytes).into_owned(),
    });
    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}

async fn require_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = header_str(&headers, "x-auth-token");
    if state.inner.tokens.read().await.contains(token) {
        Ok(next.run(request).await)
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

// --- login ---

async fn login(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user = header_str(&headers, "x-auth-user");
    let key = header_str(&headers, "x-auth-key");
    match state.inner.accounts.get(user) {
        Some(expected) if expected == key => {
            let token = Uuid::new_v4().simple().to_string();
            state.inner.tokens.write().await.insert(token.clone());
            (
                StatusCode::NO_CONTENT,
                [
                    ("X-Auth-Token", token),
                    ("X-Server-Management-Url", state.management_url()),
                ],
            )
                .into_response()
        }
        _ => StatusCode::UNAUTHORIZED.into_response(),
    }
}

// --- servers ---

async fn limits(headers: HeaderMap) -> Response {
    render(
        &headers,
        json!({
            "limits": {
                "rate": [{"verb": "POST", "uri": "*", "value": 10, "unit": "MINUTE"}],
                "absolute": {"maxTotalServers": 10}
            }
        }),
    )
}

async fn list_servers(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let servers = state.inner.servers.read().await;
    let summaries: Vec<Value> = servers
        .values()
        .map(|s| json!({"id": s.id, "name": s.name}))
        .collect();
    render(&headers, json!({ "servers": summaries }))
}

async fn list_servers_detail(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let servers = state.inner.servers.read().await;
    let details: Vec<&Server> = servers.values().collect();
    render(&headers, json!({ "servers": details }))
}

async fn get_server(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    headers: HeaderMap,
) -> Result<Response, StatusCode> {
    let servers = state.inner.servers.read().await;
    let server = servers.get(&id).ok_or(StatusCode::NOT_FOUND)?;
    Ok(render(&headers, json!({ "server": server })))
}

async fn create_server(
    State(state): State<AppState>,
    Path(datacenter): Path<String>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, StatusCode> {
    if !matches!(datacenter.as_str(), "oversun" | "kh") {
        return Err(StatusCode::NOT_FOUND);
    }
    let fields = parse_fields(&body).ok_or(StatusCode::BAD_REQUEST)?;
    let field = |name: &str| fields.get(name).cloned().unwrap_or_default();
    let name = field("vps_title");
    let server_type = field("vps_type");
    if name.is_empty() || server_type.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let id = state.inner.next_id.fetch_add(1, Ordering::SeqCst);
    let admin_pass = Uuid::new_v4().simple().to_string()[..12].to_string();
    let server = Server {
        id,
        name,
        datacenter,
        server_type,
        memory: field("vps_memory"),
        memory_max: field("vps_memory_max"),
        hdd: field("vps_hdd"),
        support: field("vps_admin"),
        image_id: field("vps_os"),
        isp: "0".to_string(),
        status: "running".to_string(),
        admin_pass: admin_pass.clone(),
        log: vec!["created".to_string()],
    };
    let name = server.name.clone();
    state.inner.servers.write().await.insert(id, server);

    let mut response = render(
        &headers,
        json!({"server": {"id": id, "name": name, "adminPass": admin_pass}}),
    );
    *response.status_mut() = StatusCode::ACCEPTED;
    Ok(response)
}

async fn server_action(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    body: String,
) -> Result<StatusCode, StatusCode> {
    let mut servers = state.inner.servers.write().await;
    let server = servers.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;
    let action = parse_action(&body).ok_or(StatusCode::BAD_REQUEST)?;
    let status = match action {
        Action::Start | Action::Reboot => "running",
        Action::Stop => "stopped",
        Action::Rebuild { image_id, isp } => {
            server.log.push(format!("rebuild image={image_id} isp={isp}"));
            server.image_id = image_id;
            server.isp = isp;
            server.status = "running".to_string();
            return Ok(StatusCode::ACCEPTED);
        }
    };
    server.log.push(format!("{} -> {status}", server.status));
    server.status = status.to_string();
    Ok(StatusCode::NO_CONTENT)
}

async fn server_log(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    headers: HeaderMap,
) -> Result<Response, StatusCode> {
    let servers = state.inner.servers.read().await;
    let server = servers.get(&id).ok_or(StatusCode::NOT_FOUND)?;
    Ok(render(&headers, json!({ "log": server.log })))
}

async fn stats(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, StatusCode> {
    if !state.inner.servers.read().await.contains_key(&id) {
        return Err(StatusCode::NOT_FOUND);
    }
    let query: StatsQuery = serde_json::from_str(&body).map_err(|_| StatusCode::BAD_REQUEST)?;
    let Period { from, to } = query.stats;
    Ok(render(
        &headers,
        json!({"stats": {"id": id, "from": from, "to": to, "cpu": [], "memory": []}}),
    ))
}

// --- billing and images ---

async fn balance(headers: HeaderMap) -> Response {
    render(&headers, json!({"balance": {"amount": "100.00", "currency": "RUB"}}))
}

async fn billing(headers: HeaderMap, body: String) -> Result<Response, StatusCode> {
    let query: BillingQuery = serde_json::from_str(&body).map_err(|_| StatusCode::BAD_REQUEST)?;
    let Period { from, to } = query.billing;
    if from > to {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(render(
        &headers,
        json!({"billing": {"from": from, "to": to, "operations": []}}),
    ))
}

fn images() -> [(u64, &'static str, &'static str); 2] {
    [(521, "Debian 12", "linux"), (530, "Ubuntu 24.04", "linux")]
}

async fn list_images(headers: HeaderMap) -> Response {
    let images: Vec<Value> = images()
        .iter()
        .map(|(id, name, _)| json!({"id": id, "name": name}))
        .collect();
    render(&headers, json!({ "images": images }))
}

async fn list_images_detail(headers: HeaderMap) -> Response {
    let images: Vec<Value> = images()
        .iter()
        .map(|(id, name, family)| json!({"id": id, "name": name, "family": family, "status": "ACTIVE"}))
        .collect();
    render(&headers, json!({ "images": images }))
}

// --- helpers ---

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}

/// Answer in XML when the client asked for it, JSON otherwise.
fn render(headers: &HeaderMap, value: Value) -> Response {
    if header_str(headers, "accept") == "application/xml" {
        match to_xml(&value) {
            Ok(xml) => ([(header::CONTENT_TYPE, "application/xml")], xml).into_response(),
            Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
        }
    } else {
        ([(header::CONTENT_TYPE, "application/json")], value.to_string()).into_response()
    }
}

/// XML document for a JSON value: the declaration, a newline, then one
/// element per top-level key.
fn to_xml(value: &Value) -> std::io::Result<String> {
    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Text(BytesText::new("\n")))?;
    if let Value::Object(map) = value {
        for (name, child) in map {
            write_xml(&mut writer, name, child)?;
        }
    }
    String::from_utf8(writer.into_inner())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

fn write_xml(writer: &mut Writer<Vec<u8>>, name: &str, value: &Value) -> std::io::Result<()> {
    match value {
        Value::Null => writer.write_event(Event::Empty(BytesStart::new(name))),
        Value::Object(map) => {
            writer.write_event(Event::Start(BytesStart::new(name)))?;
            for (key, child) in map {
                write_xml(writer, key, child)?;
            }
            writer.write_event(Event::End(BytesEnd::new(name)))
        }
        Value::Array(items) => {
            writer.write_event(Event::Start(BytesStart::new(name)))?;
            for item in items {
                write_xml(writer, "item", item)?;
            }
            writer.write_event(Event::End(BytesEnd::new(name)))
        }
        Value::String(text) => write_leaf(writer, name, text),
        other => write_leaf(writer, name, &other.to_string()),
    }
}

fn write_leaf(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> std::io::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))
}

/// Root element of a server action document.
fn parse_action(body: &str) -> Option<Action> {
    let mut reader = Reader::from_str(body);
    loop {
        match reader.read_event().ok()? {
            Event::Empty(element) | Event::Start(element) => {
                return match element.name().as_ref() {
                    b"start" => Some(Action::Start),
                    b"stop" => Some(Action::Stop),
                    b"reboot" => Some(Action::Reboot),
                    b"rebuild" => {
                        let mut image_id = None;
                        let mut isp = None;
                        for attr in element.attributes().flatten() {
                            let value = attr.unescape_value().ok()?.into_owned();
                            match attr.key.as_ref() {
                                b"imageId" => image_id = Some(value),
                                b"vps_isp" => isp = Some(value),
                                _ => {}
                            }
                        }
                        Some(Action::Rebuild {
                            image_id: image_id?,
                            isp: isp?,
                        })
                    }
                    _ => None,
                };
            }
            Event::Eof => return None,
            _ => {}
        }
    }
}

/// Text content of each leaf element, keyed by element name.
fn parse_fields(body: &str) -> Option<HashMap<String, String>> {
    let mut reader = Reader::from_str(body);
    let mut fields = HashMap::new();
    let mut current: Option<String> = None;
    loop {
        match reader.read_event().ok()? {
            Event::Start(element) => {
                current = Some(String::from_utf8_lossy(element.name().as_ref()).into_owned());
            }
            Event::Text(text) => {
                if let Some(name) = &current {
                    fields.insert(name.clone(), text.unescape().ok()?.into_owned());
                }
            }
            Event::End(_) => current = None,
            Event::Eof => return Some(fields),
            _ => {}
        }
    }
}
