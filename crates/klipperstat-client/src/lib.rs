//! Klipper API client and the `klipperstat` command-line interface.
//!
//! ```text
//! EndpointResolver ──► Session::connect ──► RpcClient::list_objects
//!                                               │
//!                         ┌─────────────────────┴─────────────────┐
//!                         ▼                                       ▼
//!              RpcClient::query_status                  RpcClient::subscribe
//!                         │                                       │
//!                   StatusSnapshot                      Subscription::next
//! ```
//!
//! [`Orchestrator`] runs the whole sequence and retries it from endpoint
//! resolution on any retryable failure.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod rpc;
pub mod session;
pub mod shutdown;
pub mod subscription;

pub use cli::Cli;
pub use error::{ClientError, ClientResult};
pub use orchestrator::{Handshake, Orchestrator, RetryPolicy, StatusReport};
pub use rpc::RpcClient;
pub use session::{ReadDeadline, Session, SessionOptions, SessionState};
pub use shutdown::{ShutdownHandle, ShutdownReason, SignalHandler};
pub use subscription::Subscription;
