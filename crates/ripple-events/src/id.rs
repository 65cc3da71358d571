//! Process-wide unique identifiers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Generate an identifier that is unique for the lifetime of the process.
///
/// Identifiers are the prefix followed by a monotonically increasing counter
/// shared by every prefix, so `unique_id("c")` and `unique_id("l")` never
/// produce the same numeric suffix.
///
/// ```
/// use ripple_events::unique_id;
///
/// let a = unique_id("c");
/// let b = unique_id("c");
/// assert!(a.starts_with('c'));
/// assert_ne!(a, b);
/// ```
pub fn unique_id(prefix: &str) -> String {
    let n = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{}{}", prefix, n)
}

/// Identity of an entity taking part in event relationships.
///
/// Every [`EventHub`](crate::EventHub) lazily acquires one the first time it
/// is needed. It serves as the default listener context and as the key under
/// which other entities remember what they are listening to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListenerId(String);

impl ListenerId {
    /// Create a fresh listener identity.
    pub fn new() -> Self {
        Self(unique_id("l"))
    }

    /// Get the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_ids_never_repeat() {
        let ids: Vec<String> = (0..100).map(|_| unique_id("x")).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), ids.len());
    }

    #[test]
    fn test_prefixes_share_counter() {
        let a = unique_id("c");
        let b = unique_id("l");
        assert_ne!(&a[1..], &b[1..]);
    }

    #[test]
    fn test_listener_id_prefix() {
        let id = ListenerId::new();
        assert!(id.as_str().starts_with('l'));
        assert_ne!(id, ListenerId::new());
    }
}
