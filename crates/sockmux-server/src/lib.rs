//! # sockmux-server
//!
//! Namespace multiplexing on top of a message-oriented transport.
//!
//! - [`namespace`]: per-namespace callback storage and the shared registry
//! - [`server`]: registration API, accept loop, one worker per connection
//! - [`transport`]: the transport seam plus in-memory and WebSocket transports
//! - [`binder`]: the seam that turns a raw connection into a session
//! - [`logging`]: subscriber setup from loaded settings

#![deny(unsafe_code)]

pub mod binder;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod namespace;
pub mod server;
pub mod transport;

pub use binder::ConnectionBinder;
pub use config::ServerConfig;
pub use logging::init_logging;
pub use namespace::{
    Conn, EventHandler, EventOutcome, NamespaceHandler, NamespaceRegistry, SocketRef,
};
pub use server::{Server, ServerState};
pub use transport::Transport;
