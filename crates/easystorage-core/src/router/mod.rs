//! Client-side route guarding.
//!
//! Routes marked as requiring authentication redirect to `/login` while no
//! session is active. `/login` and `/auth/callback` are always reachable.

pub mod guard;

pub use guard::{
    Navigation, NavigationRequest, Route, RouteGuard, RouteTable, Router, AUTH_CALLBACK_PATH,
    HOME_PATH, LOGIN_PATH,
};
