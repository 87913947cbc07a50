//! Metric names recorded through the `metrics` facade.
//!
//! No recorder is installed here; embedding applications pick their own
//! exporter.

/// Raw connections handed out by the transport (counter).
pub const CONNECTIONS_ACCEPTED_TOTAL: &str = "sockmux_connections_accepted_total";
/// Connections bound into sessions (counter).
pub const BINDINGS_SUCCEEDED_TOTAL: &str = "sockmux_bindings_succeeded_total";
/// Binding failures (counter, labels: code, reported).
pub const BIND_FAILURES_TOTAL: &str = "sockmux_bind_failures_total";
/// Workers currently inside `ConnectionBinder::bind` (gauge).
pub const BINDINGS_ACTIVE: &str = "sockmux_bindings_active";
/// Namespaces created in a registry (counter).
pub const NAMESPACES_CREATED_TOTAL: &str = "sockmux_namespaces_created_total";
