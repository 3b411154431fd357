//! Matching Service (OBS)
//!
//! Stateless RPC wrapper around the matching engine: consumes order and
//! connect requests from its request queue, invokes the engine, and
//! publishes results back via the request's reply queue and correlation id.
//!
//! Order placement is idempotent on the order id, so the at-least-once
//! delivery of the serving loop can never double-apply an order.

pub mod config;
pub mod service;

pub use config::ObsConfig;
pub use service::{MatchingService, ServiceError};
