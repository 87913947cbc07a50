//! Seam between the accept loop and the per-connection protocol.

use std::sync::Arc;

use async_trait::async_trait;
use sockmux_core::BindError;

use crate::namespace::NamespaceRegistry;

/// Turns a raw transport connection into a namespace-aware session.
///
/// The binder owns everything after the raw connection is accepted:
/// namespace handshakes, event decoding, acknowledgements, and invoking the
/// callbacks it finds in `registry`. A binder that wants to create a
/// namespace on first use must go through
/// [`NamespaceRegistry::get_or_create`].
///
/// `bind` runs on its own task per connection. The session keeps running on
/// tasks the binder spawns; the returned [`ConnectionBinder::Connection`] is
/// only a handle and may be dropped by the caller.
#[async_trait]
pub trait ConnectionBinder<R>: Send + Sync + 'static
where
    R: Send + 'static,
{
    /// Handle to a bound session.
    type Connection: Send + 'static;

    /// Bind `raw` to the namespaces in `registry`.
    async fn bind(
        &self,
        raw: R,
        registry: Arc<NamespaceRegistry>,
    ) -> Result<Self::Connection, BindError>;
}
