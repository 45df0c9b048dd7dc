//! Route table for the application views.

use std::fmt;

/// Path of the login view
pub const LOGIN_PATH: &str = "/login";

const DASHBOARD_PREFIX: &str = "/dashboard";

/// A view the user can navigate to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    /// `/`, an alias for the default dashboard view
    Root,
    Login,
    /// `/dashboard` itself, forwarded to the default view once signed in
    Dashboard,
    SiteSelection,
    History,
    HistoryDetail(String),
    Profile,
    NotFound(String),
}

impl Route {
    /// Where users land after login when no other destination applies.
    pub fn default_dashboard() -> Self {
        Route::SiteSelection
    }

    /// Parse a path. Query strings, fragments and trailing slashes are ignored.
    pub fn parse(path: &str) -> Self {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let trimmed = path.trim_end_matches('/');

        if trimmed.is_empty() {
            return Route::Root;
        }
        if trimmed == LOGIN_PATH {
            return Route::Login;
        }

        let segments: Vec<&str> = match trimmed.strip_prefix(DASHBOARD_PREFIX) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => {
                rest.split('/').filter(|s| !s.is_empty()).collect()
            }
            _ => return Route::NotFound(path.to_string()),
        };

        match segments.as_slice() {
            [] => Route::Dashboard,
            ["site-selection"] => Route::SiteSelection,
            ["history"] => Route::History,
            ["history", id] => Route::HistoryDetail((*id).to_string()),
            ["profile"] => Route::Profile,
            _ => Route::NotFound(path.to_string()),
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Root => "/".to_string(),
            Route::Login => LOGIN_PATH.to_string(),
            Route::Dashboard => DASHBOARD_PREFIX.to_string(),
            Route::SiteSelection => format!("{}/site-selection", DASHBOARD_PREFIX),
            Route::History => format!("{}/history", DASHBOARD_PREFIX),
            Route::HistoryDetail(id) => format!("{}/history/{}", DASHBOARD_PREFIX, id),
            Route::Profile => format!("{}/profile", DASHBOARD_PREFIX),
            Route::NotFound(path) => path.clone(),
        }
    }

    /// Dashboard views require an authenticated session.
    pub fn is_protected(&self) -> bool {
        matches!(
            self,
            Route::Dashboard
                | Route::SiteSelection
                | Route::History
                | Route::HistoryDetail(_)
                | Route::Profile
        )
    }

    /// Get the display title for this route.
    pub fn title(&self) -> &'static str {
        match self {
            Route::Root => "Home",
            Route::Login => "Sign in",
            Route::Dashboard => "Dashboard",
            Route::SiteSelection => "Site Selection",
            Route::History => "Analysis History",
            Route::HistoryDetail(_) => "Analysis Details",
            Route::Profile => "User Profile",
            Route::NotFound(_) => "Not Found",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}
