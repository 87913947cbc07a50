//! Namespaces: per-namespace callbacks and the registry that owns them.

pub mod conn;
pub mod handler;
pub mod registry;

pub use conn::{ChannelConn, Conn, OutboundEvent, SocketRef};
pub use handler::{
    ConnectHandler, DisconnectHandler, ErrorHandler, EventHandler, EventOutcome, NamespaceHandler,
};
pub use registry::NamespaceRegistry;
