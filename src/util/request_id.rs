//! Invocation ID generation for tracing dispatched requests through logs.

use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Counter for sequential invocation IDs.
static INVOCATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Identifier attached to a dispatched invocation for log correlation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InvocationId(String);

impl InvocationId {
    /// Next sequential ID, unique within this process.
    ///
    /// Format: `inv-{counter}` with the counter zero-padded to 12 hex digits.
    pub fn next() -> Self {
        let count = INVOCATION_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("inv-{count:012x}"))
    }

    /// Random UUID-based ID, suitable for correlating across processes.
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InvocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for InvocationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_next_is_sequential_and_prefixed() {
        let id1 = InvocationId::next();
        let id2 = InvocationId::next();

        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("inv-"));
        assert!(id2.as_str().starts_with("inv-"));
    }

    #[test]
    fn test_next_uniqueness() {
        let mut ids = HashSet::new();
        for _ in 0..1000 {
            let id = InvocationId::next();
            assert!(ids.insert(id), "duplicate ID generated");
        }
    }

    #[test]
    fn test_random_is_uuid_shaped() {
        let id = InvocationId::random();

        // UUID format: 36 chars with hyphens
        assert_eq!(id.as_str().len(), 36);
        assert!(id.as_str().contains('-'));
        assert_ne!(id, InvocationId::random());
    }

    #[test]
    fn test_display() {
        let id = InvocationId::next();
        assert_eq!(format!("{id}"), id.as_str());
    }
}
