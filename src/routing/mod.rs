//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming path "/api/<key>/<rest>?<query>"
//!     → split_api_path (first segment after the API root)
//!     → registry.rs (O(1) key lookup)
//!     → descriptor.rs (forwarded path: strip or preserve prefix)
//!
//! Registry Compilation (at startup):
//!     ServiceConfig[]
//!     → Validate keys and origins
//!     → Freeze as immutable ServiceRegistry
//! ```
//!
//! # Design Decisions
//! - Registry compiled at startup, immutable at runtime
//! - Single-segment exact match, no wildcards or regex
//! - Ambiguity rejected at construction, never at request time

pub mod descriptor;
pub mod registry;

pub use descriptor::{OriginError, ServiceDescriptor, UpstreamOrigin};
pub use registry::{RegistryError, ServiceRegistry};

/// Root under which every proxied service lives.
pub const API_ROOT: &str = "/api";

/// Whether a path is the API root or anything beneath it.
pub fn is_under_api_root(path: &str) -> bool {
    match path.strip_prefix(API_ROOT) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Split `/api/<key><rest>` into `(key, rest)`.
///
/// `rest` is empty or starts with `/`. Returns `None` when the path is not
/// under the API root or the key segment is empty.
pub fn split_api_path(path: &str) -> Option<(&str, &str)> {
    let after_root = path.strip_prefix(API_ROOT)?.strip_prefix('/')?;
    let (key, rest) = match after_root.find('/') {
        Some(idx) => after_root.split_at(idx),
        None => (after_root, ""),
    };
    if key.is_empty() {
        None
    } else {
        Some((key, rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_api_path() {
        assert_eq!(split_api_path("/api/user-management/profile"), Some(("user-management", "/profile")));
        assert_eq!(split_api_path("/api/user-management/"), Some(("user-management", "/")));
        assert_eq!(split_api_path("/api/user-management"), Some(("user-management", "")));
        assert_eq!(split_api_path("/api/"), None);
        assert_eq!(split_api_path("/api"), None);
        assert_eq!(split_api_path("/apis/x"), None);
        assert_eq!(split_api_path("/health"), None);
    }

    #[test]
    fn test_is_under_api_root() {
        assert!(is_under_api_root("/api"));
        assert!(is_under_api_root("/api/"));
        assert!(is_under_api_root("/api/unknown/x"));
        assert!(!is_under_api_root("/apikeys"));
        assert!(!is_under_api_root("/ws"));
    }
}
