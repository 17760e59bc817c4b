//! Authentication module for managing the login session.
//!
//! This module provides:
//! - `SessionStore`: Bearer token + user id, persisted and observable
//! - `KeyValueStore`: Durable storage backends (file, OS keychain, memory)
//!
//! The session is persisted under the keys `access_token` and `user_id`.

pub mod session;
pub mod storage;

pub use session::{Session, SessionStore, TOKEN_KEY, USER_ID_KEY};
pub use storage::{FileStore, KeyValueStore, KeyringStore, MemoryStore};
