use tracing::debug;

use crate::auth::SessionStore;

/// Home view, requires a session
pub const HOME_PATH: &str = "/";

/// Login view
pub const LOGIN_PATH: &str = "/login";

/// Where the backend sends the browser back after the OAuth flow
pub const AUTH_CALLBACK_PATH: &str = "/auth/callback";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub path: String,
    pub requires_auth: bool,
}

impl Route {
    pub fn public(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            requires_auth: false,
        }
    }

    pub fn protected(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            requires_auth: true,
        }
    }
}

/// A single navigation attempt, consumed by [`RouteGuard::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationRequest {
    pub target: String,
    pub requires_auth: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Proceed(String),
    Redirect(String),
}

impl Navigation {
    /// The path the host ends up on
    pub fn path(&self) -> &str {
        match self {
            Navigation::Proceed(path) | Navigation::Redirect(path) => path,
        }
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self, Navigation::Redirect(_))
    }
}

/// The application's routes.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self {
            routes: vec![
                Route::protected(HOME_PATH),
                Route::public(LOGIN_PATH),
                Route::public(AUTH_CALLBACK_PATH),
            ],
        }
    }
}

impl RouteTable {
    pub fn empty() -> Self {
        Self { routes: Vec::new() }
    }

    /// Add a route, replacing any existing route with the same path.
    pub fn with_route(mut self, route: Route) -> Self {
        self.routes.retain(|r| r.path != route.path);
        self.routes.push(route);
        self
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn find(&self, path: &str) -> Option<&Route> {
        let path = strip_query(path);
        self.routes.iter().find(|r| r.path == path)
    }

    /// Describe a navigation to `target`. Unknown paths are public.
    pub fn request(&self, target: &str) -> NavigationRequest {
        NavigationRequest {
            target: target.to_string(),
            requires_auth: self.find(target).map(|r| r.requires_auth).unwrap_or(false),
        }
    }
}

/// Query string and fragment don't take part in matching
fn strip_query(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    &path[..end]
}

/// Redirects unauthenticated users away from protected routes.
#[derive(Debug, Clone)]
pub struct RouteGuard {
    session: SessionStore,
}

impl RouteGuard {
    pub fn new(session: SessionStore) -> Self {
        Self { session }
    }

    pub fn check(&self, request: &NavigationRequest) -> Navigation {
        if request.requires_auth && !self.session.is_authenticated() {
            Navigation::Redirect(LOGIN_PATH.to_string())
        } else {
            Navigation::Proceed(request.target.clone())
        }
    }
}

/// Route table plus guard, the entry point hosts navigate through.
#[derive(Debug, Clone)]
pub struct Router {
    table: RouteTable,
    guard: RouteGuard,
}

impl Router {
    pub fn new(table: RouteTable, session: SessionStore) -> Self {
        Self {
            table,
            guard: RouteGuard::new(session),
        }
    }

    pub fn navigate(&self, target: &str) -> Navigation {
        let request = self.table.request(target);
        let outcome = self.guard.check(&request);
        debug!(path = target, outcome = ?outcome, "Navigation");
        outcome
    }
}
