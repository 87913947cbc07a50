//! Callbacks registered for one namespace.
//!
//! A [`NamespaceHandler`] holds at most one callback per lifecycle kind plus
//! one callback per event name. Setting a callback again replaces the old
//! one. Every accessor clones the callback's `Arc` out from under the lock,
//! so callbacks always run with no lock held and may register further
//! callbacks themselves.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use sockmux_core::{Error, HandlerError};
use tracing::trace;

use super::conn::SocketRef;

/// Called when a connection joins the namespace. An `Err` refuses the join.
pub type ConnectHandler = Arc<dyn Fn(SocketRef) -> Result<(), HandlerError> + Send + Sync>;

/// Called when a connection leaves the namespace, with the reason.
pub type DisconnectHandler = Arc<dyn Fn(SocketRef, &str) + Send + Sync>;

/// Called with errors scoped to the namespace.
pub type ErrorHandler = Arc<dyn Fn(&Error) + Send + Sync>;

/// An event callback in one of the accepted shapes.
#[derive(Clone)]
pub enum EventHandler {
    /// Ignores the payload.
    Bare(Arc<dyn Fn(SocketRef) + Send + Sync>),
    /// Receives the decoded payload.
    Payload(Arc<dyn Fn(SocketRef, Value) + Send + Sync>),
    /// Receives the payload and returns the acknowledgement sent back.
    WithAck(Arc<dyn Fn(SocketRef, Value) -> Value + Send + Sync>),
}

impl EventHandler {
    /// Wrap a callback that takes no payload.
    pub fn bare<F>(f: F) -> Self
    where
        F: Fn(SocketRef) + Send + Sync + 'static,
    {
        Self::Bare(Arc::new(f))
    }

    /// Wrap a callback that takes the payload.
    pub fn payload<F>(f: F) -> Self
    where
        F: Fn(SocketRef, Value) + Send + Sync + 'static,
    {
        Self::Payload(Arc::new(f))
    }

    /// Wrap a callback whose return value acknowledges the event.
    pub fn with_ack<F>(f: F) -> Self
    where
        F: Fn(SocketRef, Value) -> Value + Send + Sync + 'static,
    {
        Self::WithAck(Arc::new(f))
    }

    /// Shape name, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bare(_) => "bare",
            Self::Payload(_) => "payload",
            Self::WithAck(_) => "with_ack",
        }
    }

    /// Whether the peer should expect an acknowledgement.
    pub fn expects_ack(&self) -> bool {
        matches!(self, Self::WithAck(_))
    }

    /// Whether both handlers wrap the very same callback allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bare(a), Self::Bare(b)) => Arc::ptr_eq(a, b),
            (Self::Payload(a), Self::Payload(b)) => Arc::ptr_eq(a, b),
            (Self::WithAck(a), Self::WithAck(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Invoke the callback.
    pub fn call(&self, conn: SocketRef, payload: Value) -> EventOutcome {
        match self {
            Self::Bare(f) => {
                f(conn);
                EventOutcome::Handled
            }
            Self::Payload(f) => {
                f(conn, payload);
                EventOutcome::Handled
            }
            Self::WithAck(f) => EventOutcome::Acked(f(conn, payload)),
        }
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EventHandler").field(&self.kind()).finish()
    }
}

/// Result of dispatching an event to a namespace.
#[derive(Clone, Debug, PartialEq)]
pub enum EventOutcome {
    /// A callback ran; nothing to acknowledge.
    Handled,
    /// A callback ran and produced this acknowledgement.
    Acked(Value),
    /// No callback is registered for the event.
    Unhandled,
}

/// Callbacks for one namespace.
pub struct NamespaceHandler {
    name: String,
    on_connect: RwLock<Option<ConnectHandler>>,
    on_disconnect: RwLock<Option<DisconnectHandler>>,
    on_error: RwLock<Option<ErrorHandler>>,
    events: RwLock<HashMap<String, EventHandler>>,
}

impl NamespaceHandler {
    /// Create a handler with no callbacks. `name` should already be canonical.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            on_connect: RwLock::new(None),
            on_disconnect: RwLock::new(None),
            on_error: RwLock::new(None),
            events: RwLock::new(HashMap::new()),
        }
    }

    /// Canonical namespace name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace the connect callback.
    pub fn set_connect(&self, f: ConnectHandler) {
        *self.on_connect.write() = Some(f);
    }

    /// Replace the disconnect callback.
    pub fn set_disconnect(&self, f: DisconnectHandler) {
        *self.on_disconnect.write() = Some(f);
    }

    /// Replace the error callback.
    pub fn set_error(&self, f: ErrorHandler) {
        *self.on_error.write() = Some(f);
    }

    /// Replace the callback for `event`.
    pub fn set_event(&self, event: impl Into<String>, f: EventHandler) {
        let _ = self.events.write().insert(event.into(), f);
    }

    /// Current connect callback.
    pub fn connect_handler(&self) -> Option<ConnectHandler> {
        self.on_connect.read().clone()
    }

    /// Current disconnect callback.
    pub fn disconnect_handler(&self) -> Option<DisconnectHandler> {
        self.on_disconnect.read().clone()
    }

    /// Current error callback.
    pub fn error_handler(&self) -> Option<ErrorHandler> {
        self.on_error.read().clone()
    }

    /// Current callback for `event`.
    pub fn event_handler(&self, event: &str) -> Option<EventHandler> {
        self.events.read().get(event).cloned()
    }

    /// Registered event names, sorted.
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.events.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Run the connect callback. `Ok` when none is registered.
    pub fn dispatch_connect(&self, conn: SocketRef) -> Result<(), HandlerError> {
        match self.connect_handler() {
            Some(f) => f(conn),
            None => Ok(()),
        }
    }

    /// Run the disconnect callback. Returns whether one was registered.
    pub fn dispatch_disconnect(&self, conn: SocketRef, reason: &str) -> bool {
        let Some(f) = self.disconnect_handler() else {
            return false;
        };
        f(conn, reason);
        true
    }

    /// Run the error callback. Returns whether one was registered.
    pub fn dispatch_error(&self, err: &Error) -> bool {
        let Some(f) = self.error_handler() else {
            return false;
        };
        f(err);
        true
    }

    /// Run the callback registered for `event`.
    pub fn dispatch_event(&self, conn: SocketRef, event: &str, payload: Value) -> EventOutcome {
        let Some(handler) = self.event_handler(event) else {
            trace!(namespace = %self.name, event, "no callback for event");
            return EventOutcome::Unhandled;
        };
        handler.call(conn, payload)
    }
}

impl fmt::Debug for NamespaceHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamespaceHandler")
            .field("name", &self.name)
            .field("on_connect", &self.on_connect.read().is_some())
            .field("on_disconnect", &self.on_disconnect.read().is_some())
            .field("on_error", &self.on_error.read().is_some())
            .field("events", &self.event_names())
            .finish()
    }
}
