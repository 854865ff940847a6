use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
pub use string_cache::DefaultAtom as Atom;

lazy_static! {
    static ref SESSION_IDS: RwLock<Vec<Atom>> = RwLock::new(Vec::new());
}

/// Intern a session id and return its stable slot. Slots are handed out in
/// first-seen order, which is the order sessions are listed to the user.
pub fn intern_session(eid: &str) -> usize {
    let atom = Atom::from(eid);
    let mut ids = SESSION_IDS.write().unwrap_or_else(|e| e.into_inner());
    match ids.iter().position(|a| *a == atom) {
        Some(idx) => idx,
        None => {
            ids.push(atom);
            ids.len() - 1
        }
    }
}

/// Current count of known session ids
pub fn session_count() -> usize {
    SESSION_IDS.read().map_or(0, |ids| ids.len())
}

pub fn session_id(slot: usize) -> Option<String> {
    SESSION_IDS
        .read()
        .ok()
        .and_then(|ids| ids.get(slot).map(|a| a.to_string()))
}

/// Loaded sessions keyed by id. A session is loaded once and shared after
/// that; switching back to it does not reload.
#[derive(Debug)]
pub struct SessionCache<S> {
    sessions: HashMap<Atom, Arc<S>>,
}

impl<S> SessionCache<S> {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    pub fn get(&self, eid: &str) -> Option<Arc<S>> {
        self.sessions.get(&Atom::from(eid)).cloned()
    }

    /// Returns the cached session, or runs `load` and caches its result.
    /// A failed load caches nothing.
    pub fn get_or_load<E>(
        &mut self,
        eid: &str,
        load: impl FnOnce() -> Result<S, E>,
    ) -> Result<Arc<S>, E> {
        let key = Atom::from(eid);
        if let Some(s) = self.sessions.get(&key) {
            return Ok(s.clone());
        }
        let session = Arc::new(load()?);
        intern_session(eid);
        self.sessions.insert(key, session.clone());
        Ok(session)
    }

    pub fn contains(&self, eid: &str) -> bool {
        self.sessions.contains_key(&Atom::from(eid))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl<S> Default for SessionCache<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable() {
        let a = intern_session("cache-test-a");
        let b = intern_session("cache-test-b");
        assert_ne!(a, b);
        assert_eq!(intern_session("cache-test-a"), a);
        assert_eq!(session_id(b).as_deref(), Some("cache-test-b"));
        assert!(session_count() >= 2);
    }

    #[test]
    fn loads_once_then_reuses() {
        let mut cache: SessionCache<u32> = SessionCache::new();
        let mut loads = 0;
        let first = cache
            .get_or_load("eid-1", || {
                loads += 1;
                Ok::<_, String>(7)
            })
            .unwrap();
        let second = cache
            .get_or_load("eid-1", || {
                loads += 1;
                Ok::<_, String>(8)
            })
            .unwrap();
        assert_eq!(*first, 7);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loads, 1);
    }

    #[test]
    fn failed_load_is_not_cached() {
        let mut cache: SessionCache<u32> = SessionCache::new();
        let err = cache.get_or_load("eid-bad", || Err("missing file"));
        assert_eq!(err.unwrap_err(), "missing file");
        assert!(!cache.contains("eid-bad"));
        assert!(cache.is_empty());
    }
}
