use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::storage::KeyValueStore;

/// Storage key for the bearer token
pub const TOKEN_KEY: &str = "access_token";

/// Storage key for the user identifier
pub const USER_ID_KEY: &str = "user_id";

/// Current login state. Token and user id are always set or cleared together.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Session {
    token: Option<String>,
    user_id: Option<String>,
}

impl Session {
    fn logged_in(token: String, user_id: String) -> Self {
        Self {
            token: Some(token),
            user_id: Some(user_id),
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// An empty token counts as logged out.
    pub fn is_authenticated(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

// Keep the token out of logs
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("user_id", &self.user_id)
            .finish()
    }
}

struct Inner {
    storage: Arc<dyn KeyValueStore>,
    state: watch::Sender<Session>,
}

/// Shared handle to the session. Clone is cheap; all clones see the same state.
///
/// Hosts observe login/logout through [`SessionStore::subscribe`] instead of
/// reloading: after `logout` returns, every receiver already holds the
/// logged-out session.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl SessionStore {
    /// Open the store, loading whatever was last persisted.
    pub fn open(storage: Arc<dyn KeyValueStore>) -> Result<Self> {
        let token = storage
            .get(TOKEN_KEY)
            .context("Failed to load stored token")?
            .filter(|t| !t.is_empty());
        let user_id = storage
            .get(USER_ID_KEY)
            .context("Failed to load stored user id")?;

        let session = match (token, user_id) {
            (Some(token), Some(user_id)) => Session::logged_in(token, user_id),
            (None, None) => Session::default(),
            _ => {
                warn!("Stored session is incomplete, starting logged out");
                Session::default()
            }
        };
        debug!(authenticated = session.is_authenticated(), "Session loaded");

        let (state, _) = watch::channel(session);
        Ok(Self {
            inner: Arc::new(Inner { storage, state }),
        })
    }

    /// Snapshot of the current session
    pub fn session(&self) -> Session {
        self.inner.state.borrow().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.inner.state.borrow().token.clone()
    }

    pub fn user_id(&self) -> Option<String> {
        self.inner.state.borrow().user_id.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    /// Receive every session change from now on.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.state.subscribe()
    }

    /// Log in: persist both slots, then publish the new session.
    ///
    /// If the token can't be written nothing changes. If the token was
    /// written but the user id wasn't, the stored pair no longer matches any
    /// session, so both slots are cleared and the store ends up logged out.
    pub fn set_auth(&self, token: &str, user_id: &str) -> Result<()> {
        let storage = &self.inner.storage;
        storage
            .set(TOKEN_KEY, token)
            .context("Failed to persist token")?;
        if let Err(e) = storage.set(USER_ID_KEY, user_id) {
            warn!("Failed to persist user id, clearing session");
            self.inner.state.send_replace(Session::default());
            let cleared = storage
                .remove(TOKEN_KEY)
                .and_then(|()| storage.remove(USER_ID_KEY));
            return match cleared {
                Ok(()) => Err(e).context("Failed to persist user id"),
                Err(cleanup) => Err(e).context(format!(
                    "Failed to persist user id; clearing the stored session also failed: {:#}",
                    cleanup
                )),
            };
        }

        self.inner
            .state
            .send_replace(Session::logged_in(token.to_string(), user_id.to_string()));
        info!(user_id = user_id, "Logged in");
        Ok(())
    }

    /// Log out: clear memory, remove both slots, notify subscribers.
    ///
    /// The in-memory session is cleared even when storage removal fails, so
    /// nothing keeps using a token the caller asked to drop.
    pub fn logout(&self) -> Result<()> {
        let previous = self.inner.state.send_replace(Session::default());
        if previous.is_authenticated() {
            info!("Logged out");
        }

        let storage = &self.inner.storage;
        let token_result = storage.remove(TOKEN_KEY);
        let user_result = storage.remove(USER_ID_KEY);
        token_result.context("Failed to remove stored token")?;
        user_result.context("Failed to remove stored user id")?;
        Ok(())
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("session", &*self.inner.state.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryStore;

    fn memory_store() -> (Arc<MemoryStore>, SessionStore) {
        let storage = Arc::new(MemoryStore::new());
        let store = SessionStore::open(storage.clone()).unwrap();
        (storage, store)
    }

    #[test]
    fn test_open_empty_storage_is_logged_out() {
        let (_, store) = memory_store();
        assert!(!store.is_authenticated());
        assert_eq!(store.session(), Session::default());
    }

    #[test]
    fn test_set_auth_updates_memory_and_storage() {
        let (storage, store) = memory_store();
        store.set_auth("tok-1", "user-1").unwrap();

        assert!(store.is_authenticated());
        assert_eq!(store.token().as_deref(), Some("tok-1"));
        assert_eq!(store.user_id().as_deref(), Some("user-1"));
        assert_eq!(storage.get(TOKEN_KEY).unwrap().as_deref(), Some("tok-1"));
        assert_eq!(storage.get(USER_ID_KEY).unwrap().as_deref(), Some("user-1"));
    }

    #[test]
    fn test_set_auth_overwrites_previous_login() {
        let (storage, store) = memory_store();
        store.set_auth("old", "alice").unwrap();
        store.set_auth("new", "bob").unwrap();

        assert_eq!(store.token().as_deref(), Some("new"));
        assert_eq!(store.user_id().as_deref(), Some("bob"));
        assert_eq!(storage.get(USER_ID_KEY).unwrap().as_deref(), Some("bob"));
    }

    #[test]
    fn test_logout_clears_everything() {
        let (storage, store) = memory_store();
        store.set_auth("tok", "user").unwrap();
        store.logout().unwrap();

        assert!(!store.is_authenticated());
        assert_eq!(store.token(), None);
        assert_eq!(store.user_id(), None);
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
        assert_eq!(storage.get(USER_ID_KEY).unwrap(), None);
    }

    #[test]
    fn test_logout_when_logged_out_is_noop() {
        let (_, store) = memory_store();
        store.logout().unwrap();
        store.logout().unwrap();
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_open_restores_persisted_session() {
        let storage = Arc::new(MemoryStore::new());
        SessionStore::open(storage.clone())
            .unwrap()
            .set_auth("persisted", "u-9")
            .unwrap();

        let reopened = SessionStore::open(storage).unwrap();
        assert!(reopened.is_authenticated());
        assert_eq!(reopened.token().as_deref(), Some("persisted"));
        assert_eq!(reopened.user_id().as_deref(), Some("u-9"));
    }

    #[test]
    fn test_open_with_only_token_is_logged_out() {
        let storage = Arc::new(MemoryStore::new());
        storage.set(TOKEN_KEY, "orphan").unwrap();

        let store = SessionStore::open(storage).unwrap();
        assert!(!store.is_authenticated());
        assert_eq!(store.user_id(), None);
    }

    #[test]
    fn test_empty_token_is_not_authenticated() {
        let (_, store) = memory_store();
        store.set_auth("", "user").unwrap();
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_clones_share_state() {
        let (_, store) = memory_store();
        let other = store.clone();
        store.set_auth("tok", "user").unwrap();
        assert!(other.is_authenticated());
        other.logout().unwrap();
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_subscribers_observe_transitions() {
        let (_, store) = memory_store();
        let mut rx = store.subscribe();

        store.set_auth("tok", "user").unwrap();
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_authenticated());

        store.logout().unwrap();
        assert!(rx.has_changed().unwrap());
        assert!(!rx.borrow_and_update().is_authenticated());
    }

    /// Memory storage whose writes to chosen keys can be made to fail
    #[derive(Default)]
    struct FailingStore {
        inner: MemoryStore,
        fail_set: std::sync::Mutex<Option<&'static str>>,
        fail_remove: std::sync::atomic::AtomicBool,
    }

    impl FailingStore {
        fn fail_set_on(&self, key: &'static str) {
            *self.fail_set.lock().unwrap() = Some(key);
        }
    }

    impl KeyValueStore for FailingStore {
        fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<()> {
            if matches!(*self.fail_set.lock().unwrap(), Some(k) if k == key) {
                return Err(anyhow::anyhow!("quota exceeded"));
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<()> {
            if self.fail_remove.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(anyhow::anyhow!("storage offline"));
            }
            self.inner.remove(key)
        }
    }

    #[test]
    fn test_failed_user_id_write_clears_both_slots() {
        let storage = Arc::new(FailingStore::default());
        let store = SessionStore::open(storage.clone()).unwrap();
        store.set_auth("old", "alice").unwrap();
        let mut rx = store.subscribe();

        storage.fail_set_on(USER_ID_KEY);
        assert!(store.set_auth("new", "bob").is_err());

        // Memory and storage agree: logged out
        assert!(!store.is_authenticated());
        assert_eq!(store.session(), Session::default());
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
        assert_eq!(storage.get(USER_ID_KEY).unwrap(), None);
        assert!(rx.has_changed().unwrap());
        assert!(!rx.borrow_and_update().is_authenticated());

        let reopened = SessionStore::open(storage).unwrap();
        assert_eq!(reopened.session(), store.session());
    }

    #[test]
    fn test_failed_token_write_keeps_previous_session() {
        let storage = Arc::new(FailingStore::default());
        let store = SessionStore::open(storage.clone()).unwrap();
        store.set_auth("old", "alice").unwrap();

        storage.fail_set_on(TOKEN_KEY);
        assert!(store.set_auth("new", "bob").is_err());

        assert_eq!(store.token().as_deref(), Some("old"));
        assert_eq!(store.user_id().as_deref(), Some("alice"));
        assert_eq!(storage.get(TOKEN_KEY).unwrap().as_deref(), Some("old"));
        assert_eq!(storage.get(USER_ID_KEY).unwrap().as_deref(), Some("alice"));
    }

    #[test]
    fn test_failed_cleanup_is_reported() {
        let storage = Arc::new(FailingStore::default());
        let store = SessionStore::open(storage.clone()).unwrap();

        storage.fail_set_on(USER_ID_KEY);
        storage
            .fail_remove
            .store(true, std::sync::atomic::Ordering::SeqCst);

        let err = store.set_auth("tok", "user").unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("Failed to persist user id"));
        assert!(message.contains("storage offline"));
        assert!(message.contains("quota exceeded"));
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_debug_redacts_token() {
        let (_, store) = memory_store();
        store.set_auth("super-secret", "user").unwrap();
        let debug = format!("{:?}", store.session());
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("user"));
    }
}
