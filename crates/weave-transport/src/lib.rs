//! Server and transports for Weave documents.
//!
//! [`DocumentServer`] holds the authoritative copy of a document and orders
//! the transactions of every session. It is transport-agnostic: sessions are
//! outboxes of [`WireMessage`](weave_codec::WireMessage)s. Two transports are
//! provided:
//!
//! - [`LocalHub`] / [`LocalCarrier`]: in-process, for tests and embedding.
//! - [`TcpCarrier`] / [`DocumentListener`]: framed TCP, the carrier running
//!   its socket on a worker thread.

pub mod config;
pub mod error;
pub mod hub;
pub mod listener;
pub mod server;
pub mod tcp;

pub use config::ServerConfig;
pub use error::{TransportError, TransportResult};
pub use hub::{LocalCarrier, LocalHub};
pub use listener::DocumentListener;
pub use server::{greeting, DocumentServer, SessionId, ACTOR_KEY};
pub use tcp::TcpCarrier;
