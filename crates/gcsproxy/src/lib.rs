//! # gcsproxy
//!
//! HTTP gateway that serves a Google Cloud Storage bucket like a web root.
//!
//! This crate provides:
//! - **Object serving**: GET with ETag, Last-Modified, metadata headers,
//!   conditional requests and byte ranges
//! - **Directories**: index documents, then optional HTML/JSON listings
//! - **Writes**: optional PUT and DELETE
//! - **Error pages**: per-status documents from the bucket, or pass-through
//!   to the next service
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   HTTP Clients                      │
//! └─────────────────────────┬───────────────────────────┘
//!                           │
//! ┌─────────────────────────▼───────────────────────────┐
//! │                  gateway_middleware                 │
//! ├─────────────────────────────────────────────────────┤
//! │  resolve │ hide filter │ method dispatch            │
//! ├─────────────────────────────────────────────────────┤
//! │  object fetch │ index lookup │ listing │ put/delete │
//! ├─────────────────────────────────────────────────────┤
//! │         error pages  ──pass-through──▶  next        │
//! ├─────────────────────────────────────────────────────┤
//! │                  gcsproxy-store                     │
//! │          (Cloud Storage JSON API, memory)           │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod error_pages;
pub mod gateway;
pub mod hide;
pub mod index;
pub mod listing;
pub mod middleware;
pub mod resolve;
pub mod response;
pub mod routes;
pub mod server;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, FileConfig, GatewayConfig, StoreSettings};
pub use error::{GatewayError, Result};
pub use gateway::{Gateway, GatewayMethod, Outcome};
pub use routes::{create_router, create_router_with_fallback};
pub use server::{run_server, run_server_with_shutdown};
