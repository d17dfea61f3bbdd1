//! Relying-party configuration.
//!
//! This module provides [`LoginFlowConfig`], the single configuration value
//! handed to every component of the crate. No component reads ambient
//! configuration; the host loads settings however it likes and passes the
//! resulting value down explicitly.
//!
//! # Example
//!
//! ```ignore
//! use lychgate_oidc::config::LoginFlowConfig;
//! use url::Url;
//!
//! let config = LoginFlowConfig::new(
//!     "client-123",
//!     Url::parse("https://my-app.example.com/auth/oidc/callback")?,
//! )
//! .with_client_secret("secret-456")
//! .with_role_claim_name("groups")
//! .with_force_redirect(true);
//!
//! config.validate()?;
//! ```

use std::time::Duration;

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use url::Url;

/// Default authorization endpoint when none is configured.
pub const DEFAULT_AUTH_ENDPOINT: &str = "https://login.microsoftonline.com/common/oauth2/authorize";

/// Default token endpoint when none is configured.
pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://login.microsoftonline.com/common/oauth2/token";

/// Default IdP logout endpoint used by single sign-off.
pub const DEFAULT_LOGOUT_ENDPOINT: &str = "https://login.microsoftonline.com/common/oauth2/logout";

/// Default resource parameter sent with the authorization request.
pub const DEFAULT_RESOURCE: &str = "https://graph.microsoft.com";

/// Default claim name carrying the user's group membership.
pub const DEFAULT_ROLE_CLAIM: &str = "group";

fn default_scopes() -> Vec<String> {
    vec![
        "openid".to_string(),
        "profile".to_string(),
        "email".to_string(),
    ]
}

/// Errors that can occur while validating or interpreting configuration.
///
/// These are administrator-facing: they indicate the integration is set up
/// incorrectly, not that a particular login attempt went wrong.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required setting is missing or empty.
    #[error("Missing required setting: {0}")]
    MissingSetting(&'static str),

    /// A setting holds a value that cannot be used.
    #[error("Invalid value for {setting}: {reason}")]
    InvalidSetting {
        /// The setting name.
        setting: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The configured login flow name is not registered.
    #[error("Unknown login flow: {0}")]
    UnknownFlow(String),
}

impl ConfigError {
    /// Creates an `InvalidSetting` error.
    #[must_use]
    pub fn invalid(setting: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            setting,
            reason: reason.into(),
        }
    }
}

/// How to handle authenticated identities with no local account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningPolicy {
    /// Reject logins for identities without an existing local account.
    #[default]
    RequireExisting,

    /// Create a local account on first login via the user directory.
    AutoProvision,
}

/// Username patterns restricting who may authenticate through the IdP.
///
/// Each pattern is a regular expression matched against the resolved
/// username. An empty pattern list allows everyone. Patterns that fail to
/// compile are skipped with a warning rather than blocking all logins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserRestrictions {
    /// Regular expression patterns, one per entry.
    #[serde(default)]
    pub patterns: Vec<String>,

    /// Whether patterns match case-sensitively (default: true).
    #[serde(default = "default_true")]
    pub case_sensitive: bool,
}

fn default_true() -> bool {
    true
}

impl UserRestrictions {
    /// Creates restrictions from a list of patterns.
    #[must_use]
    pub fn new(patterns: Vec<impl Into<String>>) -> Self {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
            case_sensitive: true,
        }
    }

    /// Sets whether patterns match case-sensitively.
    #[must_use]
    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Returns `true` if no patterns are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Returns `true` if the username may authenticate.
    ///
    /// An empty pattern list allows every username; otherwise at least one
    /// pattern must match.
    #[must_use]
    pub fn allows(&self, username: &str) -> bool {
        if self.patterns.is_empty() {
            return true;
        }

        self.patterns.iter().any(|pattern| {
            match RegexBuilder::new(pattern)
                .case_insensitive(!self.case_sensitive)
                .build()
            {
                Ok(re) => re.is_match(username),
                Err(e) => {
                    tracing::warn!("Skipping invalid user restriction pattern {pattern:?}: {e}");
                    false
                }
            }
        })
    }
}

/// Configuration for the relying-party login flow.
///
/// Immutable per login attempt: loaded once and shared read-only across a
/// request. Endpoint defaults follow the common Azure AD v1 layout but any
/// OIDC provider can be configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginFlowConfig {
    /// OAuth client ID registered with the IdP.
    pub client_id: String,

    /// OAuth client secret (None for public clients).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// The IdP authorization endpoint.
    pub auth_endpoint: Url,

    /// The IdP token endpoint.
    pub token_endpoint: Url,

    /// Callback URL registered with the IdP.
    pub redirect_uri: Url,

    /// OAuth scopes to request.
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// Resource parameter sent with the authorization request, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,

    /// Claim name carrying group membership used for role sync.
    pub role_claim_name: String,

    /// Whether login requests are redirected straight to the IdP.
    #[serde(default)]
    pub force_redirect: bool,

    /// Suffix appended to login hints that lack a domain qualifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_append: Option<String>,

    /// Domain hint forwarded to the IdP with the authorization request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_hint: Option<String>,

    /// Username restrictions applied after token validation.
    #[serde(default)]
    pub user_restrictions: UserRestrictions,

    /// How identities without a local account are handled.
    #[serde(default)]
    pub provisioning: ProvisioningPolicy,

    /// Whether logout also signs the user out of the IdP.
    #[serde(default)]
    pub single_sign_off: bool,

    /// IdP logout endpoint; the packaged default is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logout_uri: Option<Url>,

    /// Origin of the IdP, used to filter session-check messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_origin: Option<String>,

    /// IdP session-check endpoint polled by the session monitor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_check_endpoint: Option<Url>,

    /// HTTP request timeout for IdP calls (default: 30 seconds).
    #[serde(skip, default = "default_request_timeout")]
    pub request_timeout: Duration,

    /// Clock skew tolerance for token validation (default: 60 seconds).
    #[serde(skip, default = "default_clock_skew")]
    pub clock_skew_tolerance: Duration,

    /// Lifetime of a pending anti-forgery state record (default: 10 minutes).
    #[serde(skip, default = "default_state_ttl")]
    pub state_ttl: Duration,
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_clock_skew() -> Duration {
    Duration::from_secs(60)
}

fn default_state_ttl() -> Duration {
    Duration::from_secs(600)
}

impl LoginFlowConfig {
    /// Creates a configuration with the required fields and packaged
    /// endpoint defaults.
    ///
    /// # Panics
    ///
    /// Does not panic: the default endpoint constants are known-valid URLs.
    #[must_use]
    pub fn new(client_id: impl Into<String>, redirect_uri: Url) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            auth_endpoint: Url::parse(DEFAULT_AUTH_ENDPOINT).expect("valid default endpoint"),
            token_endpoint: Url::parse(DEFAULT_TOKEN_ENDPOINT).expect("valid default endpoint"),
            redirect_uri,
            scopes: default_scopes(),
            resource: Some(DEFAULT_RESOURCE.to_string()),
            role_claim_name: DEFAULT_ROLE_CLAIM.to_string(),
            force_redirect: false,
            auto_append: None,
            domain_hint: None,
            user_restrictions: UserRestrictions::default(),
            provisioning: ProvisioningPolicy::default(),
            single_sign_off: false,
            logout_uri: None,
            oauth_origin: None,
            session_check_endpoint: None,
            request_timeout: default_request_timeout(),
            clock_skew_tolerance: default_clock_skew(),
            state_ttl: default_state_ttl(),
        }
    }

    /// Sets the client secret.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Sets the authorization endpoint.
    #[must_use]
    pub fn with_auth_endpoint(mut self, endpoint: Url) -> Self {
        self.auth_endpoint = endpoint;
        self
    }

    /// Sets the token endpoint.
    #[must_use]
    pub fn with_token_endpoint(mut self, endpoint: Url) -> Self {
        self.token_endpoint = endpoint;
        self
    }

    /// Sets the OAuth scopes.
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<impl Into<String>>) -> Self {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the resource parameter. Pass `None` to omit it.
    #[must_use]
    pub fn with_resource(mut self, resource: Option<String>) -> Self {
        self.resource = resource;
        self
    }

    /// Sets the role claim name.
    #[must_use]
    pub fn with_role_claim_name(mut self, claim: impl Into<String>) -> Self {
        self.role_claim_name = claim.into();
        self
    }

    /// Sets whether login requests redirect straight to the IdP.
    #[must_use]
    pub fn with_force_redirect(mut self, force: bool) -> Self {
        self.force_redirect = force;
        self
    }

    /// Sets the login-hint suffix.
    #[must_use]
    pub fn with_auto_append(mut self, suffix: impl Into<String>) -> Self {
        self.auto_append = Some(suffix.into());
        self
    }

    /// Sets the domain hint.
    #[must_use]
    pub fn with_domain_hint(mut self, hint: impl Into<String>) -> Self {
        self.domain_hint = Some(hint.into());
        self
    }

    /// Sets the username restrictions.
    #[must_use]
    pub fn with_user_restrictions(mut self, restrictions: UserRestrictions) -> Self {
        self.user_restrictions = restrictions;
        self
    }

    /// Sets the provisioning policy.
    #[must_use]
    pub fn with_provisioning(mut self, policy: ProvisioningPolicy) -> Self {
        self.provisioning = policy;
        self
    }

    /// Enables or disables single sign-off.
    #[must_use]
    pub fn with_single_sign_off(mut self, enabled: bool) -> Self {
        self.single_sign_off = enabled;
        self
    }

    /// Sets the IdP logout endpoint.
    #[must_use]
    pub fn with_logout_uri(mut self, uri: Url) -> Self {
        self.logout_uri = Some(uri);
        self
    }

    /// Sets the IdP origin accepted by the session monitor.
    #[must_use]
    pub fn with_oauth_origin(mut self, origin: impl Into<String>) -> Self {
        self.oauth_origin = Some(origin.into());
        self
    }

    /// Sets the session-check endpoint.
    #[must_use]
    pub fn with_session_check_endpoint(mut self, endpoint: Url) -> Self {
        self.session_check_endpoint = Some(endpoint);
        self
    }

    /// Sets the HTTP request timeout for IdP calls.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the clock skew tolerance for token validation.
    #[must_use]
    pub fn with_clock_skew_tolerance(mut self, tolerance: Duration) -> Self {
        self.clock_skew_tolerance = tolerance;
        self
    }

    /// Sets the anti-forgery state lifetime.
    #[must_use]
    pub fn with_state_ttl(mut self, ttl: Duration) -> Self {
        self.state_ttl = ttl;
        self
    }

    /// Checks that the settings required by the authorization-code flow are
    /// present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSetting`] when the client ID is empty,
    /// or [`ConfigError::InvalidSetting`] when an endpoint cannot carry
    /// query parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::MissingSetting("client_id"));
        }
        if self.auth_endpoint.cannot_be_a_base() {
            return Err(ConfigError::invalid(
                "auth_endpoint",
                "URL cannot carry query parameters",
            ));
        }
        if self.token_endpoint.cannot_be_a_base() {
            return Err(ConfigError::invalid(
                "token_endpoint",
                "URL cannot carry query parameters",
            ));
        }
        Ok(())
    }

    /// Returns the scope string sent to the IdP.
    #[must_use]
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }

    /// Applies the `auto_append` suffix to a login hint.
    ///
    /// Hints that already contain a domain qualifier are left untouched.
    #[must_use]
    pub fn apply_auto_append(&self, login_hint: &str) -> String {
        match &self.auto_append {
            Some(suffix) if !login_hint.contains('@') => format!("{login_hint}{suffix}"),
            _ => login_hint.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> LoginFlowConfig {
        LoginFlowConfig::new(
            "client-123",
            Url::parse("https://app.example.com/auth/callback").unwrap(),
        )
    }

    #[test]
    fn test_defaults() {
        let config = test_config();

        assert_eq!(config.auth_endpoint.as_str(), DEFAULT_AUTH_ENDPOINT);
        assert_eq!(config.token_endpoint.as_str(), DEFAULT_TOKEN_ENDPOINT);
        assert_eq!(config.role_claim_name, "group");
        assert_eq!(config.scope_string(), "openid profile email");
        assert!(!config.force_redirect);
        assert!(!config.single_sign_off);
        assert_eq!(config.provisioning, ProvisioningPolicy::RequireExisting);
    }

    #[test]
    fn test_validate_requires_client_id() {
        let config = LoginFlowConfig::new(
            "  ",
            Url::parse("https://app.example.com/auth/callback").unwrap(),
        );

        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingSetting("client_id"))
        ));

        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = test_config()
            .with_client_secret("secret")
            .with_role_claim_name("groups")
            .with_force_redirect(true)
            .with_domain_hint("example.com")
            .with_single_sign_off(true)
            .with_provisioning(ProvisioningPolicy::AutoProvision);

        assert_eq!(config.client_secret, Some("secret".to_string()));
        assert_eq!(config.role_claim_name, "groups");
        assert!(config.force_redirect);
        assert!(config.single_sign_off);
        assert_eq!(config.provisioning, ProvisioningPolicy::AutoProvision);
    }

    #[test]
    fn test_auto_append() {
        let config = test_config().with_auto_append("@contoso.com");

        assert_eq!(config.apply_auto_append("alice"), "alice@contoso.com");
        assert_eq!(config.apply_auto_append("bob@other.org"), "bob@other.org");

        let plain = test_config();
        assert_eq!(plain.apply_auto_append("alice"), "alice");
    }

    #[test]
    fn test_restrictions_empty_allows_everyone() {
        let restrictions = UserRestrictions::default();
        assert!(restrictions.is_empty());
        assert!(restrictions.allows("anyone"));
    }

    #[test]
    fn test_restrictions_patterns() {
        let restrictions = UserRestrictions::new(vec![r".*@contoso\.com$", r"^admin-"]);

        assert!(restrictions.allows("alice@contoso.com"));
        assert!(restrictions.allows("admin-bob"));
        assert!(!restrictions.allows("mallory@evil.example"));
    }

    #[test]
    fn test_restrictions_case_sensitivity() {
        let sensitive = UserRestrictions::new(vec![r"^Teacher"]);
        assert!(sensitive.allows("Teacher1"));
        assert!(!sensitive.allows("teacher1"));

        let insensitive = UserRestrictions::new(vec![r"^Teacher"]).with_case_sensitive(false);
        assert!(insensitive.allows("teacher1"));
    }

    #[test]
    fn test_restrictions_invalid_pattern_skipped() {
        let restrictions = UserRestrictions::new(vec![r"([unclosed", r"^ok$"]);

        // The broken pattern matches nothing; the valid one still applies.
        assert!(restrictions.allows("ok"));
        assert!(!restrictions.allows("([unclosed"));
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = test_config().with_domain_hint("example.com");
        let json = serde_json::to_string(&config).unwrap();
        let parsed: LoginFlowConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.client_id, config.client_id);
        assert_eq!(parsed.domain_hint, config.domain_hint);
        // Durations are runtime tuning, not persisted settings.
        assert_eq!(parsed.request_timeout, Duration::from_secs(30));
    }
}
