use crate::models::Role;
use crate::session::Session;

/// What the shell should do with an attempted navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Session restore has not settled. Hold the navigation, do not redirect.
    Pending,
    Allow,
    /// Not signed in. `return_to` is the location to come back to afterwards.
    RedirectToLogin { return_to: String },
    /// Signed in but lacking the role. Never bounced to login.
    RedirectToHome,
}

/// Decide whether the current session may enter a view restricted to
/// `permitted` roles. An empty list admits any authenticated user.
///
/// Pure function of its inputs; the caller owns what each outcome means in
/// its routing layer.
pub fn evaluate_route(session: &Session, permitted: &[Role], location: &str) -> RouteDecision {
    if session.loading {
        return RouteDecision::Pending;
    }
    let user = match session.user.as_ref() {
        Some(user) if session.authenticated => user,
        _ => {
            return RouteDecision::RedirectToLogin {
                return_to: location.to_string(),
            };
        }
    };
    if permitted.is_empty() || permitted.contains(&user.role) {
        RouteDecision::Allow
    } else {
        RouteDecision::RedirectToHome
    }
}
