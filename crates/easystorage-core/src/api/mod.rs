//! REST API client module for the media-storage backend.
//!
//! This module provides the `ApiClient` for health checks, the Google OAuth
//! start, job submission and status, media search and media content.
//!
//! Requests carry the session's bearer token when one is set. A 401 from any
//! JSON endpoint logs the session out.

pub mod client;
pub mod error;

pub use client::{ApiClient, AuthStart, MediaContent, RequestOptions};
pub use error::{ApiError, ErrorBody, EXPIRED_SESSION_MESSAGE};
