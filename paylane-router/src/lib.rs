//! HTTP service for the paylane payment router.
//!
//! Wires the core, store, and on-chain engine crates behind an Axum
//! surface:
//!
//! - `POST /v1/router/{agent_id}` - the metered call pipeline
//! - `POST /permits`, `GET /permits`, `PATCH /permits/{id}`,
//!   `POST /permits/revoke` - permit administration
//! - `GET /health`
//!
//! See [`config::RouterConfig`] for the environment surface and
//! [`error::RouterError`] for the status mapping.

pub mod config;
pub mod error;
pub mod handlers;
pub mod permits;
pub mod seed;
pub mod service;

pub use config::{ConfigError, RouterConfig};
pub use error::RouterError;
pub use service::{CallRequest, CallResponse, RouterService};
