//! Per-namespace connection handle given to callbacks.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde_json::Value;
use sockmux_core::{EmitError, normalize_namespace};
use tokio::sync::mpsc;

/// Shared handle to a connection joined to one namespace.
pub type SocketRef = Arc<dyn Conn>;

/// A connection as seen from inside one namespace.
///
/// Implemented by the binder; callbacks only ever see it behind a
/// [`SocketRef`].
pub trait Conn: Send + Sync {
    /// Session identifier, shared by every namespace of one raw connection.
    fn id(&self) -> &str;

    /// Canonical name of the namespace this handle belongs to.
    fn namespace(&self) -> &str;

    /// Peer address, when the transport knows it.
    fn remote_addr(&self) -> Option<SocketAddr> {
        None
    }

    /// Queue an event for the peer.
    fn emit(&self, event: &str, payload: Value) -> Result<(), EmitError>;

    /// Leave the namespace. Further `emit` calls fail with [`EmitError::Closed`].
    fn close(&self);
}

/// An event queued by [`ChannelConn::emit`].
#[derive(Clone, Debug, PartialEq)]
pub struct OutboundEvent {
    /// Namespace the event is sent on.
    pub namespace: String,
    /// Event name.
    pub event: String,
    /// Event payload.
    pub payload: Value,
}

/// [`Conn`] backed by a bounded channel drained by the binder's writer task.
pub struct ChannelConn {
    id: String,
    namespace: String,
    remote_addr: Option<SocketAddr>,
    tx: mpsc::Sender<OutboundEvent>,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl ChannelConn {
    /// Create a handle for `namespace` (normalized) on session `id`.
    pub fn new(
        id: impl Into<String>,
        namespace: &str,
        remote_addr: Option<SocketAddr>,
        tx: mpsc::Sender<OutboundEvent>,
    ) -> Self {
        Self {
            id: id.into(),
            namespace: normalize_namespace(namespace).to_owned(),
            remote_addr,
            tx,
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    /// Events rejected because the channel was full.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Whether [`Conn::close`] was called or the receiver is gone.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.tx.is_closed()
    }
}

impl Conn for ChannelConn {
    fn id(&self) -> &str {
        &self.id
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    fn emit(&self, event: &str, payload: Value) -> Result<(), EmitError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EmitError::Closed);
        }
        let outbound = OutboundEvent {
            namespace: self.namespace.clone(),
            event: event.to_owned(),
            payload,
        };
        self.tx.try_send(outbound).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                EmitError::Full
            }
            mpsc::error::TrySendError::Closed(_) => EmitError::Closed,
        })
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
