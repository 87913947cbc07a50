//! # sockmux-core
//!
//! Foundation types shared by every sockmux crate.
//!
//! - **Namespaces**: canonical spelling of namespace names (`""` and `"/"` are the same namespace)
//! - **Errors**: transport, binding, handler and emit failures via `thiserror`
//! - **Logging**: `tracing` subscriber setup and an in-memory capture for tests

#![deny(unsafe_code)]

pub mod errors;
pub mod logging;
pub mod namespace;

pub use errors::{BindError, EmitError, Error, HandlerError, TransportError};
pub use namespace::{ROOT_NAMESPACE, is_root, normalize_namespace};
