//! The transport seam and its implementations.
//!
//! A transport delivers raw, already-framed connections one at a time and
//! owns whatever HTTP surface is needed to establish them. The server never
//! looks inside a raw connection; it only hands it to the binder.

pub mod memory;
pub mod websocket;

use async_trait::async_trait;
use axum::extract::Request;
use axum::response::Response;
use sockmux_core::TransportError;

pub use memory::{MemoryDialer, MemoryOptions, MemoryTransport};
pub use websocket::{WsOptions, WsRawConn, WsTransport};

/// Source of raw connections.
#[async_trait]
pub trait Transport: Sized + Send + Sync + 'static {
    /// One accepted connection, before binding.
    type Raw: Send + 'static;
    /// Construction options.
    type Options: Send;

    /// Build the transport, validating `options`.
    fn from_options(options: Self::Options) -> Result<Self, TransportError>;

    /// Wait for the next raw connection.
    ///
    /// Fails with [`TransportError::Closed`] once [`Transport::close`] has been
    /// called, including for calls already waiting.
    async fn accept(&self) -> Result<Self::Raw, TransportError>;

    /// Stop accepting connections.
    async fn close(&self) -> Result<(), TransportError>;

    /// Handle an inbound HTTP request addressed to the transport.
    async fn serve_http(&self, request: Request) -> Response;
}
