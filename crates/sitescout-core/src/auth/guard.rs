//! Route guard for protected views.
//!
//! The guard holds no state. It is a pure function of a `SessionState`
//! snapshot and the requested route.

use serde::{Deserialize, Serialize};

use super::SessionState;
use crate::routes::Route;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Session not resolved yet: show a placeholder, neither redirect nor render.
    Loading,
    /// Navigate elsewhere. `from` is the originally requested route, kept so
    /// the login flow can return to it.
    Redirect { to: Route, from: Option<Route> },
    Render,
}

/// Where to go once login succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnPolicy {
    /// Go back to the route that triggered the redirect.
    #[default]
    RequestedRoute,
    /// Always land on the default dashboard view.
    DefaultRoute,
}

pub fn evaluate(state: &SessionState, requested: &Route) -> GuardDecision {
    if *requested == Route::Root {
        return GuardDecision::Redirect {
            to: Route::default_dashboard(),
            from: None,
        };
    }
    if !requested.is_protected() {
        return GuardDecision::Render;
    }
    if state.is_loading {
        return GuardDecision::Loading;
    }
    if !state.is_authenticated {
        return GuardDecision::Redirect {
            to: Route::Login,
            from: Some(requested.clone()),
        };
    }
    if *requested == Route::Dashboard {
        return GuardDecision::Redirect {
            to: Route::default_dashboard(),
            from: None,
        };
    }
    GuardDecision::Render
}

pub fn post_login_destination(from: Option<&Route>, policy: ReturnPolicy) -> Route {
    match (policy, from) {
        (ReturnPolicy::RequestedRoute, Some(route)) if route.is_protected() => route.clone(),
        _ => Route::default_dashboard(),
    }
}
