//! Single sign-off coordination.
//!
//! # Overview
//!
//! Two halves:
//!
//! - [`build_logout_url`] turns a host logout into an IdP logout by
//!   producing the URL the browser is sent to after local session
//!   teardown
//! - [`SessionMonitor`] implements the relying-party side of OIDC
//!   session management: the host embeds the IdP's check-session frame
//!   and feeds the frame's `postMessage` responses to
//!   [`SessionMonitor::on_message`], acting on the returned
//!   [`SessionAction`]
//!
//! # Security Considerations
//!
//! Messages are accepted only from the configured IdP origin; anything
//! else is ignored without parsing.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use url::Url;

use crate::config::{DEFAULT_LOGOUT_ENDPOINT, LoginFlowConfig};

/// How often the embedded frame should poll the IdP session.
pub const SESSION_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Recognizes the Microsoft login logout endpoint, which accepts a
/// `post_logout_redirect_uri` parameter.
static MS_LOGOUT_ENDPOINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://login\.microsoftonline\.com/").expect("valid pattern")
});

/// Builds the IdP logout URL for a local logout, or `None` when single
/// sign-off is disabled.
///
/// A configured logout endpoint is used as given. When it is the
/// Microsoft login endpoint (or the packaged default), the
/// `post_logout_redirect_uri` parameter is appended so the browser
/// returns to the host afterwards; other endpoints are returned
/// verbatim since their parameter conventions are unknown.
#[must_use]
pub fn build_logout_url(config: &LoginFlowConfig, post_logout_redirect: Option<&Url>) -> Option<Url> {
    if !config.single_sign_off {
        return None;
    }

    let mut url = match &config.logout_uri {
        Some(uri) => uri.clone(),
        // The default constant is a known-valid URL.
        None => Url::parse(DEFAULT_LOGOUT_ENDPOINT).ok()?,
    };

    let is_ms_logout =
        MS_LOGOUT_ENDPOINT.is_match(url.as_str()) && url.path().ends_with("/oauth2/logout");

    if is_ms_logout {
        if let Some(redirect) = post_logout_redirect {
            url.query_pairs_mut()
                .append_pair("post_logout_redirect_uri", redirect.as_str());
        }
    }

    Some(url)
}

/// A reply from the IdP's check-session frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCheckResponse {
    /// The IdP session still matches; keep polling.
    Unchanged,
    /// The IdP session changed (user signed out elsewhere).
    Changed,
    /// The frame could not interpret the check message.
    Error,
}

impl SessionCheckResponse {
    /// Parses a frame reply. Returns `None` for anything unrecognized.
    #[must_use]
    pub fn parse(data: &str) -> Option<Self> {
        match data.trim() {
            "unchanged" => Some(Self::Unchanged),
            "changed" => Some(Self::Changed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// What the host should do with a frame message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Message was not from the IdP or was unintelligible; drop it.
    Ignore,
    /// Session unchanged; keep polling.
    Continue,
    /// The frame reported an error; stop polling for this page view.
    StopChecking,
    /// The IdP session ended; send the browser to the host's logout URL.
    RedirectToLogout(Url),
}

/// Relying-party state for one page's session monitoring.
#[derive(Debug, Clone)]
pub struct SessionMonitor {
    client_id: String,
    session_state: String,
    idp_origin: String,
    check_endpoint: Url,
    logout_url: Url,
}

impl SessionMonitor {
    /// Creates a monitor for a logged-in page.
    ///
    /// `session_state` is the value the IdP returned with the
    /// authorization response; `logout_url` is where the browser goes
    /// when the IdP session ends.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        session_state: impl Into<String>,
        idp_origin: impl Into<String>,
        check_endpoint: Url,
        logout_url: Url,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            session_state: session_state.into(),
            idp_origin: idp_origin.into(),
            check_endpoint,
            logout_url,
        }
    }

    /// Builds a monitor from configuration, or `None` when the config
    /// lacks a session-check endpoint or origin.
    #[must_use]
    pub fn from_config(
        config: &LoginFlowConfig,
        session_state: impl Into<String>,
        logout_url: Url,
    ) -> Option<Self> {
        Some(Self::new(
            config.client_id.clone(),
            session_state,
            config.oauth_origin.clone()?,
            config.session_check_endpoint.clone()?,
            logout_url,
        ))
    }

    /// The check-session frame URL to embed.
    #[must_use]
    pub fn check_endpoint(&self) -> &Url {
        &self.check_endpoint
    }

    /// The message posted to the frame on every poll.
    #[must_use]
    pub fn message(&self) -> String {
        format!("{} {}", self.client_id, self.session_state)
    }

    /// Handles a `postMessage` reply from the frame.
    ///
    /// Messages from any origin other than the IdP's are ignored before
    /// parsing.
    #[must_use]
    pub fn on_message(&self, origin: &str, data: &str) -> SessionAction {
        if origin != self.idp_origin {
            tracing::debug!(origin = %origin, "Ignoring session-check message from foreign origin");
            return SessionAction::Ignore;
        }

        match SessionCheckResponse::parse(data) {
            Some(SessionCheckResponse::Unchanged) => SessionAction::Continue,
            Some(SessionCheckResponse::Changed) => {
                tracing::info!("IdP session ended; signing the user out");
                SessionAction::RedirectToLogout(self.logout_url.clone())
            }
            Some(SessionCheckResponse::Error) => {
                tracing::warn!("Session-check frame reported an error; stopping checks");
                SessionAction::StopChecking
            }
            None => SessionAction::Ignore,
        }
    }
}
