//! Sidecar protocol - newline-delimited JSON frames over TCP
//!
//! ## Message Types
//!
//! - `Request`: client-initiated operations (`connect`, `message.send`, ...)
//! - `Response`: sidecar replies, matched to requests by ID
//! - `Event`: gateway events pushed by the sidecar
//! - `Error`: errors not tied to a request
//! - `Ping`/`Pong`: keepalive

pub mod methods;
pub mod schema;

pub use schema::{
    ErrorFrame, EventFrame, GatewayFrame, ProtocolError, RequestFrame, ResponseFrame,
};
