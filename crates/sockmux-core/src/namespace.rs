//! Namespace names.
//!
//! A namespace is addressed by a path-like string. The default namespace has
//! two accepted spellings, `""` and `"/"`, which always resolve to
//! [`ROOT_NAMESPACE`].

/// Canonical name of the default namespace.
pub const ROOT_NAMESPACE: &str = "/";

/// Map a namespace name to its canonical form.
///
/// `""` becomes `"/"`; every other name is returned unchanged.
pub fn normalize_namespace(name: &str) -> &str {
    if name.is_empty() { ROOT_NAMESPACE } else { name }
}

/// Whether `name` refers to the default namespace.
pub fn is_root(name: &str) -> bool {
    name.is_empty() || name == ROOT_NAMESPACE
}
