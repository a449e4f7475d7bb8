//! HTTP API for MinuTAG.
//!
//! Exposes the document upload endpoint (plus its legacy alias) and a
//! liveness probe.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use router::create_router;
pub use server::WebServer;
