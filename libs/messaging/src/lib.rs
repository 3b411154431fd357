//! Broker transport and RPC channel
//!
//! Turns a fire-and-forget publish/subscribe transport into a
//! request/response call with bounded wait:
//!
//! - [`BrokerTransport`]: the contract an external broker must satisfy
//!   (named queues, reply-address and correlation-id metadata, explicit
//!   acknowledgement).
//! - [`InMemoryBroker`]: in-process implementation used by tests and the
//!   single-process demo.
//! - [`RpcClient`]: correlation-id request/response with timeout and retry.
//!   A timeout is an **unknown outcome** — the request may have been applied
//!   server-side — so callers poll rather than blindly resubmit.
//! - [`serve`]: at-least-once server loop that replies before acknowledging.

pub mod broker;
pub mod memory;
pub mod rpc;
pub mod server;

pub use broker::{BrokerError, BrokerTransport, Consumer, Delivery, Envelope};
pub use memory::InMemoryBroker;
pub use rpc::{RpcClient, RpcError};
pub use server::serve;
