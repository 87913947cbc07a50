//! WebSocket transport built on axum's upgrade extractor.
//!
//! `serve_http` upgrades requests on the configured path and queues the
//! resulting sockets; `accept` hands them out one at a time. Framing,
//! ping/pong and close frames are handled by axum/tungstenite underneath.

use std::fmt;
use std::net::SocketAddr;

use async_trait::async_trait;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, FromRequestParts, Request};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use sockmux_core::TransportError;
use sockmux_settings::TransportSettings;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::Transport;

/// Options for [`WsTransport`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WsOptions {
    /// Path that accepts upgrades. A trailing slash is optional on requests.
    pub path: String,
    /// Upgraded sockets buffered before `accept` picks them up.
    pub accept_backlog: usize,
    /// Largest inbound message, in bytes.
    pub max_message_size: usize,
}

impl Default for WsOptions {
    fn default() -> Self {
        Self::from(&TransportSettings::default())
    }
}

impl From<&TransportSettings> for WsOptions {
    fn from(settings: &TransportSettings) -> Self {
        Self {
            path: settings.path.clone(),
            accept_backlog: settings.accept_backlog,
            max_message_size: settings.max_message_size,
        }
    }
}

/// An upgraded WebSocket waiting to be bound.
pub struct WsRawConn {
    /// Transport-assigned connection id (UUID v7).
    pub id: String,
    /// The upgraded socket.
    pub socket: WebSocket,
    /// Peer address, present when the router was served with connect info.
    pub remote_addr: Option<SocketAddr>,
    /// Headers of the upgrade request.
    pub headers: HeaderMap,
    /// URI of the upgrade request, including the query string.
    pub uri: Uri,
}

impl fmt::Debug for WsRawConn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsRawConn")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("uri", &self.uri)
            .finish_non_exhaustive()
    }
}

/// Transport accepting WebSocket upgrades over HTTP.
pub struct WsTransport {
    options: WsOptions,
    tx: mpsc::Sender<WsRawConn>,
    rx: Mutex<mpsc::Receiver<WsRawConn>>,
    shutdown: CancellationToken,
}

impl WsTransport {
    /// Options the transport was built with.
    pub fn options(&self) -> &WsOptions {
        &self.options
    }

    fn matches_path(&self, path: &str) -> bool {
        path.trim_end_matches('/') == self.options.path.trim_end_matches('/')
    }
}

#[async_trait]
impl Transport for WsTransport {
    type Raw = WsRawConn;
    type Options = WsOptions;

    fn from_options(options: WsOptions) -> Result<Self, TransportError> {
        if options.accept_backlog == 0 {
            return Err(TransportError::InvalidConfig(
                "accept backlog must be at least 1".into(),
            ));
        }
        if options.max_message_size == 0 {
            return Err(TransportError::InvalidConfig(
                "max message size must be at least 1 byte".into(),
            ));
        }
        if !options.path.starts_with('/') {
            return Err(TransportError::InvalidConfig(format!(
                "upgrade path must start with '/', got {:?}",
                options.path
            )));
        }
        let (tx, rx) = mpsc::channel(options.accept_backlog);
        Ok(Self {
            options,
            tx,
            rx: Mutex::new(rx),
            shutdown: CancellationToken::new(),
        })
    }

    async fn accept(&self) -> Result<WsRawConn, TransportError> {
        let mut rx = tokio::select! {
            biased;
            () = self.shutdown.cancelled() => return Err(TransportError::Closed),
            rx = self.rx.lock() => rx,
        };
        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => Err(TransportError::Closed),
            raw = rx.recv() => raw.ok_or(TransportError::Closed),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        if !self.shutdown.is_cancelled() {
            info!(path = %self.options.path, "websocket transport closed");
            self.shutdown.cancel();
        }
        Ok(())
    }

    async fn serve_http(&self, request: Request) -> Response {
        if self.shutdown.is_cancelled() {
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
        if !self.matches_path(request.uri().path()) {
            return StatusCode::NOT_FOUND.into_response();
        }

        let (mut parts, _body) = request.into_parts();
        let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
            Ok(upgrade) => upgrade,
            Err(rejection) => {
                debug!(uri = %parts.uri, "rejected non-websocket request");
                return rejection.into_response();
            }
        };

        let remote_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0);
        let id = Uuid::now_v7().to_string();
        let headers = parts.headers;
        let uri = parts.uri;
        let tx = self.tx.clone();
        let shutdown = self.shutdown.clone();

        upgrade
            .max_message_size(self.options.max_message_size)
            .on_upgrade(move |socket| async move {
                debug!(conn_id = %id, ?remote_addr, "websocket upgraded");
                let raw = WsRawConn {
                    id,
                    socket,
                    remote_addr,
                    headers,
                    uri,
                };
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => {
                        debug!("transport closed before upgraded socket was queued");
                    }
                    sent = tx.send(raw) => {
                        if sent.is_err() {
                            warn!("accept queue dropped, discarding upgraded socket");
                        }
                    }
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use axum::body::Body;

    use super::*;

    fn transport() -> WsTransport {
        WsTransport::from_options(WsOptions::default()).unwrap()
    }

    fn get(uri: &str) -> Request {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn default_options_follow_settings() {
        let opts = WsOptions::default();
        assert_eq!(opts.path, "/socket.io/");
        assert_eq!(opts.accept_backlog, 128);
        assert_eq!(opts.max_message_size, 1024 * 1024);
    }

    #[test]
    fn invalid_options_rejected() {
        let zero_backlog = WsOptions {
            accept_backlog: 0,
            ..WsOptions::default()
        };
        assert!(matches!(
            WsTransport::from_options(zero_backlog),
            Err(TransportError::InvalidConfig(_))
        ));

        let relative = WsOptions {
            path: "socket.io".into(),
            ..WsOptions::default()
        };
        assert!(matches!(
            WsTransport::from_options(relative),
            Err(TransportError::InvalidConfig(_))
        ));

        let zero_size = WsOptions {
            max_message_size: 0,
            ..WsOptions::default()
        };
        assert!(WsTransport::from_options(zero_size).is_err());
    }

    #[test]
    fn path_matching_ignores_trailing_slash() {
        let t = transport();
        assert!(t.matches_path("/socket.io/"));
        assert!(t.matches_path("/socket.io"));
        assert!(!t.matches_path("/socket.io/extra"));
        assert!(!t.matches_path("/"));
    }

    #[tokio::test]
    async fn other_paths_are_not_found() {
        let t = transport();
        let resp = t.serve_http(get("/health")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn plain_get_on_upgrade_path_is_rejected() {
        let t = transport();
        let resp = t.serve_http(get("/socket.io/?EIO=4")).await;
        assert!(resp.status().is_client_error());
        assert_ne!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn closed_transport_is_unavailable() {
        let t = transport();
        t.close().await.unwrap();
        let resp = t.serve_http(get("/socket.io/")).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_matches!(t.accept().await, Err(TransportError::Closed));
    }
}
