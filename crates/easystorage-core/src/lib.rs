//! Client core for the easystorage media backend.
//!
//! - `auth`: the persisted login session and its storage backends
//! - `router`: route table and the guard that keeps logged-out users on `/login`
//! - `api`: the REST client
//! - `config`: base URL, storage backend and timeout resolution

pub mod api;
pub mod auth;
pub mod config;
pub mod router;

pub use api::{ApiClient, ApiError};
pub use auth::{Session, SessionStore};
pub use config::Config;
pub use router::{Navigation, RouteGuard, RouteTable, Router};
