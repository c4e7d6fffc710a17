//! Session state manager.
//!
//! `SessionManager` is the single owner of the authentication state and the only code
//! that touches the persisted token. It is built once at startup and shared by `Rc`
//! with every consumer; consumers read snapshots and never mutate fields directly.
//!
//! Write order is fixed: `login` writes the store before updating memory, `logout`
//! resets memory before erasing the store. Credential problems never surface as
//! errors; they all resolve to the logged-out state.

use crate::store::TokenStore;
use crate::token::{self, Claims, Role};
use std::cell::{Cell, RefCell};

/// Source of "now" in epoch seconds
pub trait Clock {
    fn now(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Read-only view of the current session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    identity: Option<(Role, String)>,
    is_initializing: bool,
}

impl Session {
    fn from_claims(claims: Option<&Claims>, is_initializing: bool) -> Self {
        Self {
            identity: claims.map(|c| (c.role, c.subject_id.clone())),
            is_initializing,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    pub fn role(&self) -> Option<Role> {
        self.identity.as_ref().map(|(role, _)| *role)
    }

    pub fn subject_id(&self) -> Option<&str> {
        self.identity.as_ref().map(|(_, id)| id.as_str())
    }

    /// While true the state is provisional; no authorization decision may be made.
    pub fn is_initializing(&self) -> bool {
        self.is_initializing
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role() == Some(role)
    }
}

impl std::fmt::Display for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_initializing {
            return f.write_str("initializing");
        }
        match &self.identity {
            Some((role, id)) => write!(f, "authenticated as {} (id {})", role, id),
            None => f.write_str("not logged in"),
        }
    }
}

type Listener = Box<dyn Fn(&Session)>;

pub struct SessionManager<S: TokenStore, C: Clock = SystemClock> {
    store: S,
    clock: C,
    key: String,
    claims: RefCell<Option<Claims>>,
    initializing: Cell<bool>,
    listeners: RefCell<Vec<Listener>>,
}

impl<S: TokenStore> SessionManager<S, SystemClock> {
    pub fn new(store: S, key: &str) -> Self {
        Self::with_clock(store, key, SystemClock)
    }
}

impl<S: TokenStore, C: Clock> SessionManager<S, C> {
    /// Create a manager in the initializing state. Call `bootstrap` before use.
    pub fn with_clock(store: S, key: &str, clock: C) -> Self {
        Self {
            store,
            clock,
            key: key.to_string(),
            claims: RefCell::new(None),
            initializing: Cell::new(true),
            listeners: RefCell::new(Vec::new()),
        }
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Current snapshot. Performs no expiry check.
    pub fn state(&self) -> Session {
        Session::from_claims(self.claims.borrow().as_ref(), self.initializing.get())
    }

    /// Register a callback run with the new snapshot after each completed operation.
    /// Listeners must not subscribe from inside a callback.
    pub fn subscribe(&self, listener: impl Fn(&Session) + 'static) {
        self.listeners.borrow_mut().push(Box::new(listener));
    }

    /// Restore the session from the persisted store. Safe to call again; the result
    /// depends only on the stored value and the clock.
    pub fn bootstrap(&self) {
        let stored = match self.store.get(&self.key) {
            Ok(stored) => stored,
            Err(e) => {
                log::warn!("session store unavailable, starting logged out: {}", e);
                None
            }
        };

        let claims = stored.and_then(|raw| match self.validate(&raw) {
            Some(claims) => Some(claims),
            None => {
                self.erase();
                None
            }
        });

        match &claims {
            Some(c) => log::info!("restored {} session", c.role),
            None => log::debug!("no session to restore"),
        }
        self.claims.replace(claims);
        self.initializing.set(false);
        self.notify();
    }

    /// Install a credential obtained from the identity issuer. Returns whether the
    /// session is now authenticated. An invalid or expired credential clears any
    /// previous session and the store.
    pub fn login(&self, raw: &str) -> bool {
        // A failed write must not leave an older token behind for the next reload
        let persisted = match self.store.set(&self.key, raw) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("could not persist token, session will not survive reload: {}", e);
                self.erase();
                false
            }
        };

        let claims = self.validate(raw);
        if claims.is_none() && persisted {
            self.erase();
        }

        let ok = claims.is_some();
        match &claims {
            Some(c) => log::info!("logged in as {}", c.role),
            None => log::info!("login rejected, session cleared"),
        }
        self.claims.replace(claims);
        self.notify();
        ok
    }

    /// Drop the session. Idempotent.
    pub fn logout(&self) {
        let was_authenticated = self.claims.replace(None).is_some();
        self.erase();
        if was_authenticated {
            log::info!("logged out");
        }
        self.notify();
    }

    /// Re-check the held credential against the clock and log out if it has expired.
    /// Returns whether the session is still authenticated.
    pub fn revalidate(&self) -> bool {
        let expired = match self.claims.borrow().as_ref() {
            Some(c) => c.is_expired_at(self.clock.now()),
            None => return false,
        };
        if expired {
            log::info!("session expired");
            self.logout();
        }
        !expired
    }

    fn validate(&self, raw: &str) -> Option<Claims> {
        match token::decode(raw) {
            Ok(claims) if claims.is_expired_at(self.clock.now()) => {
                log::debug!("token expired at {}", claims.expires_at);
                None
            }
            Ok(claims) => Some(claims),
            Err(e) => {
                log::debug!("token rejected: {}", e);
                None
            }
        }
    }

    fn erase(&self) {
        if let Err(e) = self.store.remove(&self.key) {
            log::warn!("could not erase persisted token: {}", e);
        }
    }

    fn notify(&self) {
        let snapshot = self.state();
        for listener in self.listeners.borrow().iter() {
            listener(&snapshot);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::{DisabledStore, FileStore, MemoryStore, StoreError};
    use crate::token::encode_for_test;
    use serde_json::json;
    use std::rc::Rc;

    pub(crate) const NOW: i64 = 1_700_000_000;

    /// Clock that can be moved by tests
    #[derive(Clone, Default)]
    pub(crate) struct FixedClock(pub Rc<Cell<i64>>);

    impl FixedClock {
        pub(crate) fn at(now: i64) -> Self {
            Self(Rc::new(Cell::new(now)))
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> i64 {
            self.0.get()
        }
    }

    pub(crate) fn token(role: &str, sub: &str, exp: i64) -> String {
        encode_for_test(&json!({"role": role, "sub": sub, "exp": exp}))
    }

    fn manager() -> SessionManager<MemoryStore, FixedClock> {
        SessionManager::with_clock(MemoryStore::new(), "token", FixedClock::at(NOW))
    }

    #[test]
    fn test_starts_initializing() {
        let mgr = manager();
        let state = mgr.state();
        assert!(state.is_initializing());
        assert!(!state.is_authenticated());
        assert_eq!(state.role(), None);
    }

    #[test]
    fn test_bootstrap_empty_store() {
        let mgr = manager();
        mgr.bootstrap();
        let state = mgr.state();
        assert!(!state.is_initializing());
        assert!(!state.is_authenticated());
        assert_eq!(state.subject_id(), None);
    }

    #[test]
    fn test_bootstrap_restores_valid_token() {
        let mgr = manager();
        mgr.store().set("token", &token("Lecturer", "42", NOW + 3600)).unwrap();
        mgr.bootstrap();
        let state = mgr.state();
        assert!(state.is_authenticated());
        assert_eq!(state.role(), Some(Role::Lecturer));
        assert_eq!(state.subject_id(), Some("42"));
    }

    #[test]
    fn test_bootstrap_is_idempotent() {
        let mgr = manager();
        mgr.store().set("token", &token("student", "9", NOW + 60)).unwrap();
        mgr.bootstrap();
        let first = mgr.state();
        mgr.bootstrap();
        assert_eq!(mgr.state(), first);

        let mgr = manager();
        mgr.store().set("token", "garbage").unwrap();
        mgr.bootstrap();
        let first = mgr.state();
        mgr.bootstrap();
        assert_eq!(mgr.state(), first);
    }

    #[test]
    fn test_bootstrap_expired_token_is_erased() {
        let mgr = manager();
        mgr.store().set("token", &token("student", "1", NOW - 1)).unwrap();
        mgr.bootstrap();
        let state = mgr.state();
        assert!(!state.is_authenticated());
        assert_eq!(state.role(), None);
        assert_eq!(state.subject_id(), None);
        assert_eq!(mgr.store().get("token").unwrap(), None);
    }

    #[test]
    fn test_bootstrap_corrupt_token_is_erased() {
        let mgr = manager();
        mgr.store().set("token", "not-a-token").unwrap();
        mgr.bootstrap();
        assert!(!mgr.state().is_authenticated());
        assert!(!mgr.state().is_initializing());
        assert_eq!(mgr.store().get("token").unwrap(), None);
    }

    #[test]
    fn test_login_round_trip() {
        let mgr = manager();
        mgr.bootstrap();
        assert!(mgr.login(&token("LECTURER", "42", NOW + 3600)));
        let state = mgr.state();
        assert!(state.is_authenticated());
        assert_eq!(state.role().map(|r| r.as_str()), Some("lecturer"));
        assert_eq!(state.subject_id(), Some("42"));
        assert!(mgr.store().get("token").unwrap().is_some());
    }

    #[test]
    fn test_login_normalizes_role() {
        let mgr = manager();
        mgr.bootstrap();
        mgr.login(&token("Student", "7", NOW + 10));
        assert_eq!(mgr.state().role().map(|r| r.as_str()), Some("student"));
    }

    #[test]
    fn test_login_fails_closed() {
        let expired = token("student", "1", NOW);
        let unknown_role = token("admin", "1", NOW + 10);
        for bad in ["", "a.b.c", "x.y", expired.as_str(), unknown_role.as_str()] {
            let mgr = manager();
            mgr.bootstrap();
            assert!(mgr.login(&token("lecturer", "42", NOW + 3600)));

            assert!(!mgr.login(bad), "accepted {:?}", bad);
            let state = mgr.state();
            assert!(!state.is_authenticated());
            assert_eq!(state.role(), None);
            assert_eq!(state.subject_id(), None);
            assert_eq!(mgr.store().get("token").unwrap(), None);
        }
    }

    #[test]
    fn test_login_replaces_previous_session() {
        let mgr = manager();
        mgr.bootstrap();
        mgr.login(&token("lecturer", "1", NOW + 10));
        mgr.login(&token("student", "2", NOW + 10));
        assert_eq!(mgr.state().role(), Some(Role::Student));
        assert_eq!(mgr.state().subject_id(), Some("2"));
    }

    #[test]
    fn test_logout_is_total_and_idempotent() {
        let mgr = manager();
        mgr.bootstrap();
        mgr.login(&token("lecturer", "42", NOW + 3600));
        mgr.logout();
        let after = mgr.state();
        assert!(!after.is_authenticated());
        assert_eq!(after.role(), None);
        assert_eq!(after.subject_id(), None);
        assert_eq!(mgr.store().get("token").unwrap(), None);

        mgr.logout();
        assert_eq!(mgr.state(), after);
        assert_eq!(mgr.store().get("token").unwrap(), None);
    }

    /// Store that refuses writes but still reads and deletes
    struct ReadOnlyStore(MemoryStore);

    impl TokenStore for ReadOnlyStore {
        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.0.get(key)
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::other("no space left on device")))
        }

        fn remove(&self, key: &str) -> Result<(), StoreError> {
            self.0.remove(key)
        }
    }

    #[test]
    fn test_login_write_failure_does_not_keep_prior_token() {
        let inner = MemoryStore::new();
        inner.set("token", &token("lecturer", "A", NOW + 3600)).unwrap();
        let mgr = SessionManager::with_clock(ReadOnlyStore(inner), "token", FixedClock::at(NOW));
        mgr.bootstrap();
        assert_eq!(mgr.state().subject_id(), Some("A"));

        assert!(mgr.login(&token("student", "B", NOW + 3600)));
        assert_eq!(mgr.state().subject_id(), Some("B"));
        assert_eq!(mgr.store().get("token").unwrap(), None);

        // Reload: nothing restored, and certainly not the previous user
        mgr.bootstrap();
        assert!(!mgr.state().is_authenticated());
    }

    #[test]
    fn test_bootstrap_erases_non_utf8_token_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileStore::new(tmp.path(), "tab");
        store.set("token", "placeholder").unwrap();
        let path = std::fs::read_dir(store.dir())
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .path();
        std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();

        let mgr = SessionManager::with_clock(store, "token", FixedClock::at(NOW));
        mgr.bootstrap();
        assert!(!mgr.state().is_authenticated());
        assert!(!mgr.state().is_initializing());
        assert!(!path.exists());

        mgr.bootstrap();
        assert!(!mgr.state().is_authenticated());
    }

    #[test]
    fn test_store_unavailable_degrades() {
        let mgr = SessionManager::with_clock(DisabledStore, "token", FixedClock::at(NOW));
        mgr.bootstrap();
        assert!(!mgr.state().is_initializing());
        assert!(!mgr.state().is_authenticated());

        assert!(mgr.login(&token("student", "3", NOW + 10)));
        assert_eq!(mgr.state().subject_id(), Some("3"));
        mgr.logout();
        assert!(!mgr.state().is_authenticated());
    }

    #[test]
    fn test_state_does_not_check_expiry_but_revalidate_does() {
        let clock = FixedClock::at(NOW);
        let mgr = SessionManager::with_clock(MemoryStore::new(), "token", clock.clone());
        mgr.bootstrap();
        mgr.login(&token("student", "5", NOW + 10));

        clock.0.set(NOW + 10);
        assert!(mgr.state().is_authenticated());

        assert!(!mgr.revalidate());
        assert!(!mgr.state().is_authenticated());
        assert_eq!(mgr.store().get("token").unwrap(), None);
        assert!(!mgr.revalidate());
    }

    #[test]
    fn test_revalidate_keeps_live_session() {
        let mgr = manager();
        mgr.bootstrap();
        mgr.login(&token("student", "5", NOW + 10));
        assert!(mgr.revalidate());
        assert!(mgr.state().is_authenticated());
    }

    #[test]
    fn test_listeners_see_complete_snapshots() {
        let mgr = manager();
        let seen: Rc<RefCell<Vec<Session>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        mgr.subscribe(move |s| sink.borrow_mut().push(s.clone()));

        mgr.bootstrap();
        mgr.login(&token("lecturer", "42", NOW + 10));
        mgr.logout();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 3);
        assert!(!seen[0].is_initializing() && !seen[0].is_authenticated());
        assert!(seen[1].has_role(Role::Lecturer));
        assert_eq!(seen[1].subject_id(), Some("42"));
        assert!(!seen[2].is_authenticated());
        for s in seen.iter() {
            assert_eq!(s.is_authenticated(), s.role().is_some());
            assert_eq!(s.is_authenticated(), s.subject_id().is_some());
        }
    }

    #[test]
    fn test_display() {
        let mgr = manager();
        assert_eq!(mgr.state().to_string(), "initializing");
        mgr.bootstrap();
        assert_eq!(mgr.state().to_string(), "not logged in");
        mgr.login(&token("student", "8", NOW + 10));
        assert_eq!(mgr.state().to_string(), "authenticated as student (id 8)");
    }
}
