//! `Server`: registration API plus the accept loop.

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use axum::Router;
use axum::extract::Request;
use axum::response::Response;
use metrics::{counter, gauge};
use parking_lot::{Mutex, RwLock};
use sockmux_core::{BindError, Error, HandlerError, TransportError, is_root};
use sockmux_settings::SockmuxSettings;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span, error, info, warn};

use crate::binder::ConnectionBinder;
use crate::config::ServerConfig;
use crate::metrics::{
    BIND_FAILURES_TOTAL, BINDINGS_ACTIVE, BINDINGS_SUCCEEDED_TOTAL, CONNECTIONS_ACCEPTED_TOTAL,
};
use crate::namespace::{ErrorHandler, EventHandler, NamespaceRegistry, SocketRef};
use crate::transport::{Transport, WsOptions, WsRawConn, WsTransport};

/// Lifecycle of a [`Server`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerState {
    /// Constructed, no accept loop has run yet.
    Idle,
    /// An accept loop is running.
    Serving,
    /// `close` was called. Terminal.
    Closed,
}

/// Where a binding failure ended up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Reported {
    RootErrorCallback,
    DiagnosticHook,
    Dropped,
}

impl Reported {
    fn as_str(self) -> &'static str {
        match self {
            Self::RootErrorCallback => "root_error_callback",
            Self::DiagnosticHook => "diagnostic_hook",
            Self::Dropped => "dropped",
        }
    }
}

/// State shared between the server and its connection workers.
struct Shared<B> {
    binder: B,
    registry: Arc<NamespaceRegistry>,
    unhandled_bind_error: RwLock<Option<ErrorHandler>>,
    warn_unhandled: bool,
    in_flight: AtomicUsize,
}

impl<B> Shared<B> {
    async fn bind_connection<R>(&self, raw: R)
    where
        R: Send + 'static,
        B: ConnectionBinder<R>,
    {
        let _active = ActiveBinding::enter(&self.in_flight);
        match self.binder.bind(raw, self.registry.clone()).await {
            Ok(_connection) => {
                counter!(BINDINGS_SUCCEEDED_TOTAL).increment(1);
                debug!("connection bound");
            }
            Err(err) => {
                let _ = self.report_bind_failure(err);
            }
        }
    }

    /// Deliver a binding failure to exactly one sink.
    fn report_bind_failure(&self, err: BindError) -> Reported {
        let code = err.code();
        let err = Error::from(err);
        debug!(code, error = %err, "connection binding failed");

        let reported = if self
            .registry
            .root()
            .is_some_and(|root| root.dispatch_error(&err))
        {
            Reported::RootErrorCallback
        } else {
            let hook = self.unhandled_bind_error.read().clone();
            match hook {
                Some(hook) => {
                    hook(&err);
                    Reported::DiagnosticHook
                }
                None => {
                    if self.warn_unhandled {
                        warn!(code, error = %err, "binding failure dropped: no root error callback");
                    }
                    Reported::Dropped
                }
            }
        };

        counter!(BIND_FAILURES_TOTAL, "code" => code, "reported" => reported.as_str())
            .increment(1);
        reported
    }
}

/// Counts a worker as in flight until dropped.
struct ActiveBinding<'a>(&'a AtomicUsize);

impl<'a> ActiveBinding<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        let _ = counter.fetch_add(1, Ordering::AcqRel);
        gauge!(BINDINGS_ACTIVE).increment(1.0);
        Self(counter)
    }
}

impl Drop for ActiveBinding<'_> {
    fn drop(&mut self) {
        let _ = self.0.fetch_sub(1, Ordering::AcqRel);
        gauge!(BINDINGS_ACTIVE).decrement(1.0);
    }
}

/// Namespace-multiplexing server over a transport `T`.
///
/// Owns its [`NamespaceRegistry`]; independent servers in one process share
/// nothing. Registration is safe at any time, including while serving, but
/// only registrations made before [`Server::serve`] are guaranteed to be seen
/// by every connection.
pub struct Server<T, B>
where
    T: Transport,
    B: ConnectionBinder<T::Raw>,
{
    transport: Arc<T>,
    shared: Arc<Shared<B>>,
    config: ServerConfig,
    state: Mutex<ServerState>,
    bindings: Option<Arc<Semaphore>>,
    shutdown: CancellationToken,
    conn_seq: AtomicU64,
}

impl<T, B> Server<T, B>
where
    T: Transport,
    B: ConnectionBinder<T::Raw>,
{
    /// Build a server with the default [`ServerConfig`].
    pub fn new(options: T::Options, binder: B) -> Result<Self, TransportError> {
        Self::with_config(options, binder, ServerConfig::default())
    }

    /// Build a server. Transport construction errors are returned unchanged.
    pub fn with_config(
        options: T::Options,
        binder: B,
        config: ServerConfig,
    ) -> Result<Self, TransportError> {
        let transport = T::from_options(options)?;
        let bindings = config.max_concurrent_bindings.map(|limit| {
            if limit == 0 {
                warn!("max_concurrent_bindings of 0 would stall the server, using 1");
            }
            Arc::new(Semaphore::new(limit.max(1)))
        });
        info!(
            transport = std::any::type_name::<T>(),
            max_concurrent_bindings = ?config.max_concurrent_bindings,
            "server created"
        );
        Ok(Self {
            transport: Arc::new(transport),
            shared: Arc::new(Shared {
                binder,
                registry: Arc::new(NamespaceRegistry::new()),
                unhandled_bind_error: RwLock::new(None),
                warn_unhandled: config.warn_unhandled_bind_errors,
                in_flight: AtomicUsize::new(0),
            }),
            config,
            state: Mutex::new(ServerState::Idle),
            bindings,
            shutdown: CancellationToken::new(),
            conn_seq: AtomicU64::new(0),
        })
    }

    /// Register the connect callback for `namespace`.
    pub fn on_connect<F>(&self, namespace: &str, f: F)
    where
        F: Fn(SocketRef) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.shared
            .registry
            .get_or_create(namespace)
            .set_connect(Arc::new(f));
    }

    /// Register the disconnect callback for `namespace`.
    pub fn on_disconnect<F>(&self, namespace: &str, f: F)
    where
        F: Fn(SocketRef, &str) + Send + Sync + 'static,
    {
        self.shared
            .registry
            .get_or_create(namespace)
            .set_disconnect(Arc::new(f));
    }

    /// Register the error callback for `namespace`.
    ///
    /// The callback on the root namespace also receives binding failures.
    pub fn on_error<F>(&self, namespace: &str, f: F)
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        if is_root(namespace) {
            debug!("root error callback registered, binding failures will be reported to it");
        }
        self.shared
            .registry
            .get_or_create(namespace)
            .set_error(Arc::new(f));
    }

    /// Register `handler` for `event` on `namespace`.
    pub fn on_event(&self, namespace: &str, event: &str, handler: EventHandler) {
        self.shared
            .registry
            .get_or_create(namespace)
            .set_event(event, handler);
    }

    /// Hook for binding failures that no root error callback took.
    ///
    /// Without it such failures are dropped, logged at `debug` (or `warn`
    /// with `warn_unhandled_bind_errors`).
    pub fn on_unhandled_bind_error<F>(&self, f: F)
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        *self.shared.unhandled_bind_error.write() = Some(Arc::new(f));
    }

    /// Run the accept loop.
    ///
    /// Each accepted connection is bound on its own task; binding failures
    /// never stop the loop. Returns only when `accept` fails, which includes
    /// the transport being closed.
    pub async fn serve(&self) -> Result<Infallible, TransportError> {
        {
            let mut state = self.state.lock();
            if *state == ServerState::Closed {
                return Err(TransportError::Closed);
            }
            *state = ServerState::Serving;
        }
        info!(
            max_concurrent_bindings = ?self.config.max_concurrent_bindings,
            "accept loop started"
        );

        let err = loop {
            let permit = match self.acquire_slot().await {
                Ok(permit) => permit,
                Err(err) => break err,
            };
            let raw = match self.transport.accept().await {
                Ok(raw) => raw,
                Err(err) => break err,
            };

            let seq = self.conn_seq.fetch_add(1, Ordering::Relaxed);
            counter!(CONNECTIONS_ACCEPTED_TOTAL).increment(1);
            let shared = self.shared.clone();
            drop(tokio::spawn(
                async move {
                    shared.bind_connection(raw).await;
                    drop(permit);
                }
                .instrument(debug_span!("connection", conn_seq = seq)),
            ));
        };

        {
            let mut state = self.state.lock();
            if *state == ServerState::Serving {
                *state = ServerState::Idle;
            }
        }
        if err.is_closed() {
            info!("accept loop stopped");
        } else {
            error!(code = err.code(), error = %err, "accept loop failed");
        }
        Err(err)
    }

    async fn acquire_slot(&self) -> Result<Option<OwnedSemaphorePermit>, TransportError> {
        let Some(bindings) = &self.bindings else {
            return Ok(None);
        };
        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => Err(TransportError::Closed),
            permit = bindings.clone().acquire_owned() => {
                permit.map(Some).map_err(|_| TransportError::Closed)
            }
        }
    }

    /// Close the transport. In-flight workers keep running.
    pub async fn close(&self) -> Result<(), TransportError> {
        *self.state.lock() = ServerState::Closed;
        self.shutdown.cancel();
        info!(in_flight = self.in_flight(), "server closing");
        self.transport.close().await
    }

    /// Hand an HTTP request straight to the transport.
    pub async fn serve_http(&self, request: Request) -> Response {
        self.transport.serve_http(request).await
    }

    /// Router that forwards every request to the transport.
    pub fn router(&self) -> Router {
        let transport = self.transport.clone();
        Router::new().fallback(move |request: Request| async move {
            transport.serve_http(request).await
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServerState {
        *self.state.lock()
    }

    /// The namespace registry shared with every worker.
    pub fn registry(&self) -> &Arc<NamespaceRegistry> {
        &self.shared.registry
    }

    /// Workers currently inside `bind`.
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    /// The underlying transport.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

impl<B> Server<WsTransport, B>
where
    B: ConnectionBinder<WsRawConn>,
{
    /// Build a WebSocket server from loaded settings.
    pub fn from_settings(settings: &SockmuxSettings, binder: B) -> Result<Self, TransportError> {
        Self::with_config(
            WsOptions::from(&settings.transport),
            binder,
            ServerConfig::from(&settings.server),
        )
    }
}
