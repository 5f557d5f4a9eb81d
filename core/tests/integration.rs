//! Full session lifecycle against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then drives every client
//! operation over real HTTP through `UreqTransport`. The server records what
//! it received, so the tests check the wire-level requests as well as the
//! client's results.

use std::sync::{Arc, Mutex};

use axum::{
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use clodo_core::{ClientConfig, ClodoClient, Error, NewServer, RemoteErrorKind, UreqTransport};
use mock_server::{AppState, DEFAULT_KEY, DEFAULT_USER};

/// Start a mock server on a random port and return its shared state.
fn start_server() -> AppState {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    let state = AppState::with_accounts(
        &format!("http://{addr}"),
        &[(DEFAULT_USER, DEFAULT_KEY), ("second", "other-key")],
    );
    let server_state = state.clone();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::serve(listener, server_state).await
        })
        .unwrap();
    });

    state
}

/// Serve a bare router on a random port and return its base URL.
fn start_router(router: Router) -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            axum::serve(listener, router).await
        })
        .unwrap();
    });

    format!("http://{addr}")
}

/// A server whose login answers with a fixed token and whose management URL
/// is `{base}/v1`, plus the caller's extra routes.
fn start_api(routes: Router) -> String {
    let management = Arc::new(Mutex::new(String::new()));
    let login_management = management.clone();
    let router = Router::new()
        .route(
            "/",
            get(move || {
                let management = login_management.lock().unwrap().clone();
                async move {
                    (
                        StatusCode::NO_CONTENT,
                        [("X-Auth-Token", "abc123".to_string()), ("X-Server-Management-Url", management)],
                    )
                }
            }),
        )
        .merge(routes);
    let base = start_router(router);
    *management.lock().unwrap() = format!("{base}/v1");
    base
}

fn config(state: &AppState) -> ClientConfig {
    ClientConfig::default()
        .with_api_root(state.base_url())
        .with_datacenter_url(&state.datacenter_url())
}

fn connect(state: &AppState, format: &str) -> ClodoClient {
    ClodoClient::with_transport(
        config(state),
        UreqTransport::new(),
        DEFAULT_USER,
        DEFAULT_KEY,
        format,
    )
    .unwrap()
}

fn new_server(name: &str) -> NewServer {
    NewServer {
        datacenter: "oversun".to_string(),
        name: name.to_string(),
        server_type: "VirtualServer".to_string(),
        memory: "512".to_string(),
        memory_max: "0".to_string(),
        hdd: "5".to_string(),
        support: "1".to_string(),
        os: "521".to_string(),
    }
}

#[test]
fn server_lifecycle() {
    let state = start_server();

    // Step 1: log in; the session points at the mock's management URL.
    let client = connect(&state, "json");
    assert_eq!(client.session().management_url(), state.management_url());
    let token = client.session().token().to_string();
    assert!(!token.is_empty());

    // Step 2: limits carry the token and the negotiated Accept header.
    let limits: serde_json::Value = serde_json::from_str(&client.get_limits().unwrap()).unwrap();
    assert_eq!(limits["limits"]["absolute"]["maxTotalServers"], 10);
    let recorded = state.requests();
    let last = recorded.last().unwrap();
    assert_eq!(last.path, "/v1/limits");
    assert_eq!(last.header("x-auth-token"), Some(token.as_str()));
    assert_eq!(last.header("accept"), Some("application/json"));

    // Step 3: create a server in a datacenter.
    let created: serde_json::Value =
        serde_json::from_str(&client.create_server(&new_server("web & db")).unwrap()).unwrap();
    let id = created["server"]["id"].as_u64().unwrap();
    assert_eq!(created["server"]["name"], "web & db");
    assert_eq!(state.requests().last().unwrap().path, "/dc/oversun/servers");

    // Step 4: list and fetch it.
    let list: serde_json::Value = serde_json::from_str(&client.list_servers(false).unwrap()).unwrap();
    assert_eq!(list["servers"].as_array().unwrap().len(), 1);
    let server: serde_json::Value = serde_json::from_str(&client.get_server(id).unwrap()).unwrap();
    assert_eq!(server["server"]["status"], "running");

    // Step 5: stop it.
    client.power_action(id, "stop").unwrap();
    let recorded = state.requests();
    let last = recorded.last().unwrap();
    assert_eq!(last.method, "POST");
    assert_eq!(last.path, format!("/v1/servers/{id}/action"));
    assert_eq!(last.body, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<stop/>");
    let server: serde_json::Value = serde_json::from_str(&client.get_server(id).unwrap()).unwrap();
    assert_eq!(server["server"]["status"], "stopped");

    // Step 6: rebuild from another image.
    client.rebuild_server(id, 530, 1).unwrap();
    let detail: serde_json::Value = serde_json::from_str(&client.list_servers(true).unwrap()).unwrap();
    assert_eq!(detail["servers"][0]["imageId"], "530");
    assert_eq!(detail["servers"][0]["isp"], "1");

    // Step 7: log, stats, billing, balance, images.
    let log: serde_json::Value = serde_json::from_str(&client.get_server_log(id).unwrap()).unwrap();
    assert_eq!(log["log"].as_array().unwrap().len(), 3);

    let stats: serde_json::Value =
        serde_json::from_str(&client.get_server_stats(id, "2024-01-01", "2024-01-02").unwrap())
            .unwrap();
    assert_eq!(stats["stats"]["from"], 1_704_067_200);
    assert_eq!(stats["stats"]["to"], 1_704_153_600);

    let billing: serde_json::Value =
        serde_json::from_str(&client.get_billing_info("@100", "@200", &id.to_string()).unwrap())
            .unwrap();
    assert_eq!(billing["billing"]["from"], 100);
    assert_eq!(state.requests().last().unwrap().path, "/v1/billing");

    let balance: serde_json::Value = serde_json::from_str(&client.get_balance().unwrap()).unwrap();
    assert_eq!(balance["balance"]["currency"], "RUB");

    let images: serde_json::Value = serde_json::from_str(&client.list_images(true).unwrap()).unwrap();
    assert_eq!(images["images"][0]["id"], 521);

    // Step 8: unknown server maps to NotFound.
    let err = client.get_server(9999).unwrap_err();
    assert!(matches!(
        err,
        Error::Remote {
            status: 404,
            kind: RemoteErrorKind::NotFound
        }
    ));

    // Step 9: malformed billing window maps to BadRequest.
    let err = client.get_billing_info("@200", "@100", "").unwrap_err();
    assert_eq!(err.status(), Some(400));
}

#[test]
fn xml_session_receives_xml() {
    let state = start_server();
    let client = connect(&state, "xml");

    let balance = client.get_balance().unwrap();
    assert!(balance.starts_with("<?xml"));
    assert!(balance.contains("<currency>RUB</currency>"));
    assert_eq!(
        state.requests().last().unwrap().header("accept"),
        Some("application/xml")
    );
}

#[test]
fn relogin_switches_token() {
    let state = start_server();
    let mut client = connect(&state, "json");
    let first = client.session().token().to_string();

    client.login("second", "other-key").unwrap();
    let second = client.session().token().to_string();
    assert_ne!(first, second);

    client.get_limits().unwrap();
    let recorded = state.requests();
    let last = recorded.last().unwrap();
    assert_eq!(last.header("x-auth-token"), Some(second.as_str()));
}

#[test]
fn bad_credentials_are_unauthorized() {
    let state = start_server();
    let err = ClodoClient::with_transport(
        config(&state),
        UreqTransport::new(),
        DEFAULT_USER,
        "wrong",
        "json",
    )
    .unwrap_err();
    assert!(err.is_unauthorized());
}

#[test]
fn invalid_format_never_contacts_server() {
    let state = start_server();
    let err = ClodoClient::with_transport(
        config(&state),
        UreqTransport::new(),
        DEFAULT_USER,
        DEFAULT_KEY,
        "yaml",
    )
    .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert!(state.requests().is_empty());
}

#[test]
fn unreachable_host_is_a_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = ClodoClient::with_transport(
        ClientConfig::default().with_api_root(&format!("http://{addr}")),
        UreqTransport::new(),
        DEFAULT_USER,
        DEFAULT_KEY,
        "json",
    )
    .unwrap_err();
    assert!(matches!(err, Error::Transport { .. }));
}

#[test]
fn redirects_are_returned_not_followed() {
    let tokens_seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let seen = tokens_seen.clone();
    let other = start_router(Router::new().route(
        "/steal",
        get(move |headers: HeaderMap| {
            if let Some(token) = headers.get("x-auth-token") {
                seen.lock().unwrap().push(token.to_str().unwrap().to_string());
            }
            async { "from-other-host" }
        }),
    ));

    let location = format!("{other}/steal");
    let base = start_api(Router::new().route(
        "/v1/limits",
        get(move || {
            let location = location.clone();
            async move { (StatusCode::FOUND, [(header::LOCATION, location)], "moved").into_response() }
        }),
    ));

    let client = ClodoClient::with_transport(
        ClientConfig::default().with_api_root(&base),
        UreqTransport::new(),
        DEFAULT_USER,
        DEFAULT_KEY,
        "json",
    )
    .unwrap();

    assert_eq!(client.get_limits().unwrap(), "moved");
    assert!(tokens_seen.lock().unwrap().is_empty());
}

#[test]
fn non_utf8_body_is_a_success() {
    let base = start_api(Router::new().route(
        "/v1/servers/1/log/",
        get(|| async { vec![0x6c_u8, 0xff, 0xfe, 0x0a] }),
    ));

    let client = ClodoClient::with_transport(
        ClientConfig::default().with_api_root(&base),
        UreqTransport::new(),
        DEFAULT_USER,
        DEFAULT_KEY,
        "json",
    )
    .unwrap();

    assert_eq!(client.get_server_log(1).unwrap(), "l\u{FFFD}\u{FFFD}\n");
}
