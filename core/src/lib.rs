//! Blocking client for the Clodo virtual-server hosting API.
//!
//! # Overview
//! `ClodoClient` logs in with a username and API key, keeps the session
//! token and per-account management URL it receives, and exposes one method
//! per API action: server lookup and listing, creation, power control,
//! rebuild, billing, usage statistics, logs and OS images. Every method
//! returns the raw response body in the format chosen at construction
//! (`xml` or `json`); decoding it is up to the caller.
//!
//! # Design
//! - All traffic goes through a single dispatcher that attaches the
//!   session headers and maps HTTP statuses to `Error::Remote`.
//! - Parameters are validated locally first; a bad value yields
//!   `Error::Validation` without touching the network.
//! - The network sits behind the `Transport` trait. `UreqTransport` is the
//!   default; tests plug in scripted transports.
//! - One client is one session and is not synchronized internally.

pub mod client;
pub mod config;
pub mod error;
pub mod headers;
pub mod http;
pub mod payload;
pub mod session;
pub mod types;

pub use client::ClodoClient;
pub use config::ClientConfig;
pub use error::{Error, RemoteErrorKind, Result};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
pub use session::Session;
pub use types::{DataFormat, Datacenter, NewServer, PowerAction, ServerType, SupportLevel};
