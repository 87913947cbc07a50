//! Settings type definitions.
//!
//! All types use camelCase field names and `#[serde(default)]`, so a partial
//! JSON file only needs to mention the values it changes.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SockmuxSettings {
    /// Accept loop and connection binding behaviour.
    pub server: ServerSettings,
    /// WebSocket transport options.
    pub transport: TransportSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl SockmuxSettings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server.max_concurrent_bindings == Some(0) {
            return Err(SettingsError::InvalidValue(
                "server.maxConcurrentBindings must be at least 1".into(),
            ));
        }
        if self.transport.accept_backlog == 0 {
            return Err(SettingsError::InvalidValue(
                "transport.acceptBacklog must be at least 1".into(),
            ));
        }
        if !self.transport.path.starts_with('/') {
            return Err(SettingsError::InvalidValue(format!(
                "transport.path must start with '/', got {:?}",
                self.transport.path
            )));
        }
        Ok(())
    }
}

/// Server settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Upper bound on connections being bound at once. `None` spawns one
    /// worker per accepted connection without limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_bindings: Option<usize>,
    /// Log binding failures at `warn` when no error callback or hook
    /// receives them.
    pub warn_unhandled_bind_errors: bool,
}

/// WebSocket transport settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportSettings {
    /// HTTP path that accepts WebSocket upgrades.
    pub path: String,
    /// Upgraded connections buffered before `accept` picks them up.
    pub accept_backlog: usize,
    /// Largest inbound WebSocket message, in bytes.
    pub max_message_size: usize,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            path: "/socket.io/".into(),
            accept_backlog: 128,
            max_message_size: 1024 * 1024,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default `EnvFilter` directive, overridden by `RUST_LOG`.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}
