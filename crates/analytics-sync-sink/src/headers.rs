//! Mutable request headers with snapshot-replace semantics.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Header set read on every outbound request and replaceable wholesale by
/// the host application.
///
/// Writers swap in a new immutable map; readers clone the `Arc` and always
/// see a complete, consistent snapshot, never a half-updated one.
pub struct MutableHeaderProvider {
    current: RwLock<Arc<HashMap<String, String>>>,
}

impl MutableHeaderProvider {
    /// Create a provider with the given initial headers.
    pub fn new(initial: HashMap<String, String>) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// Current header snapshot.
    pub fn snapshot(&self) -> Arc<HashMap<String, String>> {
        self.current.read().expect("lock poisoned").clone()
    }

    /// Replace the entire header set. Not merged with the previous set.
    pub fn replace(&self, headers: HashMap<String, String>) {
        *self.current.write().expect("lock poisoned") = Arc::new(headers);
    }
}

impl Default for MutableHeaderProvider {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}
