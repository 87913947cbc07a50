//! Server configuration.

use serde::{Deserialize, Serialize};
use sockmux_settings::ServerSettings;

/// Configuration for the accept loop and connection workers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Cap on connections being bound at once. `None` (default) spawns a
    /// worker for every accepted connection immediately; `Some(n)` makes the
    /// accept loop wait for a free slot, so connections queue in the
    /// transport instead.
    pub max_concurrent_bindings: Option<usize>,
    /// Log unreported binding failures at `warn` instead of `debug`.
    pub warn_unhandled_bind_errors: bool,
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            max_concurrent_bindings: settings.max_concurrent_bindings,
            warn_unhandled_bind_errors: settings.warn_unhandled_bind_errors,
        }
    }
}
