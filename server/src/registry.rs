//! # Registry
//!
//! Process-wide mapping from subdomain to the live [`AgentHandle`] that
//! should receive requests for it. Backed by a [`DashMap`] for
//! lock-free concurrent access — the teacher's idiom for every shared
//! registry in this codebase — rather than a single coarse lock.

use std::sync::Arc;

use dashmap::DashMap;

use crate::agent_handle::AgentHandle;

#[derive(Default)]
pub struct Registry {
    handles: DashMap<String, Arc<AgentHandle>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            handles: DashMap::new(),
        }
    }

    /// Installs the mapping, unconditionally replacing any prior handle
    /// for this subdomain. The previous handle's session is left to
    /// discover its channel is dead on its own; no explicit close
    /// happens here.
    pub fn register(&self, subdomain: String, handle: Arc<AgentHandle>) {
        self.handles.insert(subdomain, handle);
    }

    pub fn lookup(&self, subdomain: &str) -> Option<Arc<AgentHandle>> {
        self.handles.get(subdomain).map(|entry| entry.clone())
    }

    /// Idempotent removal.
    pub fn remove(&self, subdomain: &str) {
        self.handles.remove(subdomain);
    }

    /// Removes the mapping only if it still points at `handle` — used by
    /// a terminating session so it doesn't clobber a newer registration
    /// for the same subdomain that replaced it in the meantime.
    pub fn remove_if_current(&self, subdomain: &str, handle: &Arc<AgentHandle>) {
        self.handles
            .remove_if(subdomain, |_, current| Arc::ptr_eq(current, handle));
    }

    /// Snapshot of currently registered subdomains; ordering unspecified.
    pub fn list_subdomains(&self) -> Vec<String> {
        self.handles.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_handle::AgentHandle;
    use tokio::sync::mpsc;

    fn dummy_handle() -> Arc<AgentHandle> {
        let (tx, _rx) = mpsc::unbounded_channel();
        Arc::new(AgentHandle::new("dummy".to_string(), tx))
    }

    #[test]
    fn register_lookup_remove_round_trips() {
        let reg = Registry::new();
        let handle = dummy_handle();
        reg.register("foo".to_string(), handle.clone());

        let found = reg.lookup("foo").expect("should find handle");
        assert!(Arc::ptr_eq(&found, &handle));

        reg.remove("foo");
        assert!(reg.lookup("foo").is_none());
    }

    #[test]
    fn register_replaces_prior_handle() {
        let reg = Registry::new();
        let first = dummy_handle();
        let second = dummy_handle();
        reg.register("foo".to_string(), first.clone());
        reg.register("foo".to_string(), second.clone());

        let found = reg.lookup("foo").unwrap();
        assert!(Arc::ptr_eq(&found, &second));
    }

    #[test]
    fn remove_if_current_ignores_superseded_handle() {
        let reg = Registry::new();
        let first = dummy_handle();
        let second = dummy_handle();
        reg.register("foo".to_string(), first.clone());
        reg.register("foo".to_string(), second.clone());

        // A stale session for `first` tries to clean up after itself;
        // it must not evict the newer registration.
        reg.remove_if_current("foo", &first);
        let found = reg.lookup("foo").unwrap();
        assert!(Arc::ptr_eq(&found, &second));

        reg.remove_if_current("foo", &second);
        assert!(reg.lookup("foo").is_none());
    }

    #[test]
    fn list_subdomains_reflects_current_registrations() {
        let reg = Registry::new();
        reg.register("a".to_string(), dummy_handle());
        reg.register("b".to_string(), dummy_handle());
        let mut subs = reg.list_subdomains();
        subs.sort();
        assert_eq!(subs, vec!["a".to_string(), "b".to_string()]);
    }
}
