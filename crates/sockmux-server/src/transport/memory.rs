//! In-process transport fed through a channel.
//!
//! Raw connections are whatever value the caller pushes through a
//! [`MemoryDialer`]. Used to embed the server without a network listener and
//! to drive it deterministically in tests.

use async_trait::async_trait;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sockmux_core::TransportError;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::Transport;

/// Options for [`MemoryTransport`].
#[derive(Clone, Debug)]
pub struct MemoryOptions {
    /// Connections buffered before `dial` waits. Must be non-zero.
    pub capacity: usize,
}

impl Default for MemoryOptions {
    fn default() -> Self {
        Self { capacity: 64 }
    }
}

/// Channel-backed transport carrying raw connections of type `R`.
pub struct MemoryTransport<R> {
    tx: mpsc::Sender<R>,
    rx: Mutex<mpsc::Receiver<R>>,
    shutdown: CancellationToken,
}

impl<R: Send + 'static> MemoryTransport<R> {
    /// Handle for pushing raw connections into this transport.
    pub fn dialer(&self) -> MemoryDialer<R> {
        MemoryDialer {
            tx: self.tx.clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    /// Whether [`Transport::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

#[async_trait]
impl<R: Send + 'static> Transport for MemoryTransport<R> {
    type Raw = R;
    type Options = MemoryOptions;

    fn from_options(options: MemoryOptions) -> Result<Self, TransportError> {
        if options.capacity == 0 {
            return Err(TransportError::InvalidConfig(
                "memory transport capacity must be at least 1".into(),
            ));
        }
        let (tx, rx) = mpsc::channel(options.capacity);
        Ok(Self {
            tx,
            rx: Mutex::new(rx),
            shutdown: CancellationToken::new(),
        })
    }

    async fn accept(&self) -> Result<R, TransportError> {
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
            info!("memory transport closed");
            self.shutdown.cancel();
        }
        Ok(())
    }

    async fn serve_http(&self, _request: Request) -> Response {
        StatusCode::NOT_FOUND.into_response()
    }
}

/// Sends raw connections into a [`MemoryTransport`].
pub struct MemoryDialer<R> {
    tx: mpsc::Sender<R>,
    shutdown: CancellationToken,
}

impl<R> Clone for MemoryDialer<R> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<R: Send + 'static> MemoryDialer<R> {
    /// Queue `raw` for the next `accept`, waiting while the buffer is full.
    pub async fn dial(&self, raw: R) -> Result<(), TransportError> {
        if self.shutdown.is_cancelled() {
            return Err(TransportError::Closed);
        }
        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => Err(TransportError::Closed),
            sent = self.tx.send(raw) => sent.map_err(|_| TransportError::Closed),
        }
    }
}
