//! Runtime registry: the open sessions of this process, keyed by id.

use std::collections::{HashMap, HashSet, VecDeque};

use log::debug;

/// Builds the runtime for a newly registered session.
pub type RuntimeFactory<R> = Box<dyn FnMut(&str) -> R + Send>;

/// Open session runtimes plus a bounded memory of closed session ids.
pub struct SessionRegistry<R> {
    entries: HashMap<String, R>,
    closed: VecDeque<String>,
    closed_index: HashSet<String>,
    closed_capacity: usize,
    factory: RuntimeFactory<R>,
}

impl<R> SessionRegistry<R> {
    pub fn new(factory: RuntimeFactory<R>, closed_capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            closed: VecDeque::new(),
            closed_index: HashSet::new(),
            closed_capacity,
            factory,
        }
    }

    /// Explicitly open a session. Clears a previous close and keeps an
    /// existing runtime.
    pub fn register(&mut self, session_id: &str) -> &mut R {
        self.forget_closed(session_id);
        let factory = &mut self.factory;
        self.entries
            .entry(session_id.to_string())
            .or_insert_with(|| factory(session_id))
    }

    /// Register with a prebuilt runtime, replacing any existing one.
    pub fn insert(&mut self, session_id: &str, runtime: R) {
        self.forget_closed(session_id);
        self.entries.insert(session_id.to_string(), runtime);
    }

    /// Register on first sight, unless the session was closed.
    pub fn ensure(&mut self, session_id: &str) -> Option<&mut R> {
        if self.closed_index.contains(session_id) {
            debug!("Ignoring start of closed session {}", session_id);
            return None;
        }
        let factory = &mut self.factory;
        Some(
            self.entries
                .entry(session_id.to_string())
                .or_insert_with(|| factory(session_id)),
        )
    }

    pub fn get(&self, session_id: &str) -> Option<&R> {
        self.entries.get(session_id)
    }

    pub fn get_mut(&mut self, session_id: &str) -> Option<&mut R> {
        self.entries.get_mut(session_id)
    }

    /// Remove a session and remember it as closed.
    pub fn remove(&mut self, session_id: &str) -> Option<R> {
        let runtime = self.entries.remove(session_id);
        self.remember_closed(session_id);
        runtime
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.entries.contains_key(session_id)
    }

    pub fn is_closed(&self, session_id: &str) -> bool {
        self.closed_index.contains(session_id)
    }

    /// Open session ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut R)> {
        self.entries.iter_mut()
    }

    fn remember_closed(&mut self, session_id: &str) {
        if self.closed_capacity == 0 || !self.closed_index.insert(session_id.to_string()) {
            return;
        }
        self.closed.push_back(session_id.to_string());
        while self.closed.len() > self.closed_capacity {
            if let Some(oldest) = self.closed.pop_front() {
                self.closed_index.remove(&oldest);
            }
        }
    }

    fn forget_closed(&mut self, session_id: &str) {
        if self.closed_index.remove(session_id) {
            self.closed.retain(|id| id != session_id);
        }
    }
}

impl<R> std::fmt::Debug for SessionRegistry<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("open", &self.entries.len())
            .field("closed", &self.closed.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(capacity: usize) -> SessionRegistry<String> {
        SessionRegistry::new(Box::new(|id: &str| format!("runtime:{id}")), capacity)
    }

    #[test]
    fn test_ensure_creates_once() {
        let mut reg = registry(4);
        reg.ensure("s1").unwrap().push('!');
        reg.ensure("s1");
        assert_eq!(reg.get("s1").map(String::as_str), Some("runtime:s1!"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_closed_session_is_not_resurrected() {
        let mut reg = registry(4);
        reg.ensure("s1");
        assert!(reg.remove("s1").is_some());
        assert!(reg.ensure("s1").is_none());
        assert!(!reg.contains("s1"));

        reg.register("s1");
        assert!(reg.contains("s1"));
        assert!(!reg.is_closed("s1"));
    }

    #[test]
    fn test_closed_memory_is_bounded() {
        let mut reg = registry(2);
        for id in ["a", "b", "c"] {
            reg.remove(id);
        }
        assert!(!reg.is_closed("a"));
        assert!(reg.is_closed("b"));
        assert!(reg.is_closed("c"));
        assert!(reg.ensure("a").is_some());
    }

    #[test]
    fn test_ids_sorted() {
        let mut reg = registry(0);
        reg.ensure("b");
        reg.ensure("a");
        assert_eq!(reg.ids(), vec!["a".to_string(), "b".to_string()]);
    }
}
