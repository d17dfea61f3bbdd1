//! Login-page redirect decisions.
//!
//! When forced redirect is enabled, visitors to the host's login page are
//! sent straight to the IdP instead of seeing the local form. The
//! decision is per-session: a user can opt out for the rest of their
//! session (to reach the local form), and opt back in.
//!
//! The opt-out flag lives in [`SessionRedirectState`], which the host
//! keeps in its session storage; [`should_redirect`] is a pure function
//! over the config, the request, and that flag.

use serde::{Deserialize, Serialize};

use crate::config::LoginFlowConfig;

/// HTTP method of the login-page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    /// A navigation to the login page.
    Get,
    /// A credential submission to the local form.
    Post,
}

/// The redirect-relevant parts of a login-page request.
#[derive(Debug, Clone)]
pub struct RedirectRequest {
    /// The request method.
    pub method: RequestMethod,

    /// The `oidc` query parameter, when present: `Some(false)` opts the
    /// session out of forced redirects, `Some(true)` opts back in.
    pub oidc_param: Option<bool>,

    /// Whether the request carries a no-redirect marker (set by logout
    /// landing pages so the user is not bounced straight back).
    pub no_redirect: bool,
}

impl RedirectRequest {
    /// A plain GET with no parameters.
    #[must_use]
    pub fn get() -> Self {
        Self {
            method: RequestMethod::Get,
            oidc_param: None,
            no_redirect: false,
        }
    }

    /// A POST (local form submission).
    #[must_use]
    pub fn post() -> Self {
        Self {
            method: RequestMethod::Post,
            oidc_param: None,
            no_redirect: false,
        }
    }

    /// Sets the `oidc` parameter.
    #[must_use]
    pub fn with_oidc_param(mut self, value: bool) -> Self {
        self.oidc_param = Some(value);
        self
    }

    /// Sets the no-redirect marker.
    #[must_use]
    pub fn with_no_redirect(mut self) -> Self {
        self.no_redirect = true;
        self
    }
}

/// Per-session redirect state kept by the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRedirectState {
    /// Whether the session has opted out of forced redirects.
    pub opted_out: bool,
}

/// Decides whether this login-page request should redirect to the IdP.
///
/// A no-redirect marker opts the session out for good measure; a POST is
/// always a local form submission and never redirects; the `oidc`
/// parameter toggles the session opt-out. The session state is mutated in
/// place so the host can persist it.
#[must_use]
pub fn should_redirect(
    config: &LoginFlowConfig,
    request: &RedirectRequest,
    session: &mut SessionRedirectState,
) -> bool {
    if request.no_redirect {
        session.opted_out = true;
        return false;
    }

    if !config.force_redirect {
        return false;
    }

    if request.method == RequestMethod::Post {
        return false;
    }

    match request.oidc_param {
        Some(false) => {
            session.opted_out = true;
            false
        }
        Some(true) => {
            session.opted_out = false;
            true
        }
        None => !session.opted_out,
    }
}
