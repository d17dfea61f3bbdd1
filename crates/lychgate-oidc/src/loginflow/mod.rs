//! Login flow orchestration.
//!
//! # Overview
//!
//! A [`LoginFlow`] drives one shape of OIDC login from the relying
//! party's side. The only flow shipped here is the authorization code
//! flow ([`AuthorizationCodeFlow`]); the [`LoginFlowRegistry`] exists so
//! hosts can register alternatives under their own names and select one
//! by configuration.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lychgate_oidc::config::LoginFlowConfig;
//! use lychgate_oidc::loginflow::{FlowServices, InitiateRequest, LoginFlowRegistry};
//!
//! # async fn example(services: FlowServices) -> Result<(), Box<dyn std::error::Error>> {
//! let config = LoginFlowConfig::new(
//!     "client-id",
//!     "https://rp.example.com/callback".parse()?,
//! );
//!
//! let registry = LoginFlowRegistry::with_defaults();
//! let flow = registry.create("authcode", Arc::new(config), services)?;
//!
//! let redirect = flow.initiate(InitiateRequest::default()).await?;
//! println!("send the browser to {}", redirect.url);
//! # Ok(())
//! # }
//! ```
//!
//! # Security Considerations
//!
//! - State values are single-use; a replayed callback fails with
//!   [`LoginFlowError::StateMismatch`]
//! - User-facing error messages never distinguish "no such account" from
//!   other failures; the detail goes to the logs only

pub mod authcode;

pub use authcode::AuthorizationCodeFlow;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{ConfigError, LoginFlowConfig};
use crate::events::EventSink;
use crate::jwt::{SignatureVerifier, TokenError};
use crate::roles::RoleDiff;
use crate::storage::{
    LocalUser, RoleAssignments, StateStorage, StoreError, TokenStorage, UserDirectory,
};

/// Errors raised while driving a login flow.
#[derive(Debug, thiserror::Error)]
pub enum LoginFlowError {
    /// The flow configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The callback presented an unknown, expired, or already-consumed
    /// state value.
    #[error("Authorization state is unknown, expired, or already used")]
    StateMismatch,

    /// The token endpoint returned something other than a token response.
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    /// The IdP reported an OAuth protocol error.
    #[error("Identity provider error: {error}{}", description.as_deref().map(|d| format!(" ({d})")).unwrap_or_default())]
    OAuth {
        /// The OAuth `error` code.
        error: String,
        /// The optional `error_description`.
        description: Option<String>,
    },

    /// The ID token failed parsing or validation.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// The username is blocked by the configured sign-in restrictions.
    #[error("Username {0} does not match the configured sign-in restrictions")]
    RestrictedUser(String),

    /// No local account matched and provisioning is disabled.
    #[error("No local account for username {0}")]
    UnknownUser(String),

    /// A storage backend or host collaborator failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An HTTP request to the IdP failed.
    #[error("Identity provider request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// A URL could not be built.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl LoginFlowError {
    /// Returns `true` when the error stems from the caller's input rather
    /// than a relying-party fault.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::StateMismatch
                | Self::OAuth { .. }
                | Self::Token(_)
                | Self::RestrictedUser(_)
                | Self::UnknownUser(_)
        )
    }

    /// Returns the message safe to show an end user.
    ///
    /// Account-existence and store-integrity details are deliberately
    /// collapsed into a generic message; the full error goes to the logs.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::StateMismatch => "Your sign-in attempt expired or was already used. Please try again.",
            Self::OAuth { .. } => "The identity provider rejected the sign-in. Please try again.",
            Self::Token(_) => "The sign-in response could not be verified. Please try again.",
            Self::RestrictedUser(_) => {
                "Your account is not permitted to sign in to this site."
            }
            Self::UnknownUser(_) | Self::Store(_) => {
                "You could not be signed in with this account."
            }
            Self::Config(_) | Self::TokenExchange(_) | Self::Network(_) | Self::Url(_) => {
                "Sign-in is temporarily unavailable. Please try again later."
            }
        }
    }
}

/// Collaborators a flow needs at runtime.
#[derive(Clone)]
pub struct FlowServices {
    /// Token record storage.
    pub tokens: Arc<dyn TokenStorage>,

    /// Anti-forgery state storage.
    pub states: Arc<dyn StateStorage>,

    /// The host's user directory.
    pub directory: Arc<dyn UserDirectory>,

    /// The host's role-assignment service.
    pub roles: Arc<dyn RoleAssignments>,

    /// Login event sink.
    pub events: Arc<dyn EventSink>,

    /// ID token signature verifier. When absent, tokens are validated for
    /// audience, lifetime, and nonce but signatures are not checked; only
    /// appropriate when the token arrived over a direct TLS channel from
    /// the token endpoint.
    pub verifier: Option<Arc<dyn SignatureVerifier>>,
}

/// How a login should be initiated.
#[derive(Debug, Clone, Default)]
pub struct InitiateRequest {
    /// Where to send the user after a successful login.
    pub wants_url: Option<String>,

    /// A username to pre-fill at the IdP, subject to the configured
    /// auto-append suffix.
    pub login_hint: Option<String>,
}

/// The redirect that starts a login.
#[derive(Debug, Clone)]
pub struct AuthorizationRedirect {
    /// The full authorization URL to send the browser to.
    pub url: url::Url,

    /// The state value bound to this attempt.
    pub state: String,

    /// The nonce bound to this attempt.
    pub nonce: String,
}

/// The result of a completed login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    /// The resolved local user.
    pub user: LocalUser,

    /// Where the user wanted to go before the flow started.
    pub wants_url: Option<String>,

    /// The role changes applied during this login.
    pub role_diff: RoleDiff,
}

/// A login flow implementation.
#[async_trait]
pub trait LoginFlow: Send + Sync {
    /// The registry name this flow runs under.
    fn kind(&self) -> &'static str;

    /// Starts a login, returning the redirect to the IdP.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is unusable or the state
    /// record cannot be stored.
    async fn initiate(&self, request: InitiateRequest)
    -> Result<AuthorizationRedirect, LoginFlowError>;

    /// Completes a login from the IdP callback parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the state is invalid, the code exchange fails,
    /// the ID token does not validate, or no local user can be resolved.
    async fn login(&self, code: &str, state: &str) -> Result<LoginOutcome, LoginFlowError>;
}

/// The login flow shapes this crate knows by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginFlowKind {
    /// The OIDC authorization code flow.
    AuthorizationCode,
}

impl LoginFlowKind {
    /// The registry name for this kind.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::AuthorizationCode => AuthorizationCodeFlow::KIND,
        }
    }
}

impl std::str::FromStr for LoginFlowKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "authcode" => Ok(Self::AuthorizationCode),
            other => Err(ConfigError::UnknownFlow(other.to_string())),
        }
    }
}

type FlowFactory =
    Box<dyn Fn(Arc<LoginFlowConfig>, FlowServices) -> Arc<dyn LoginFlow> + Send + Sync>;

/// Registry of login flow implementations by name.
pub struct LoginFlowRegistry {
    factories: HashMap<&'static str, FlowFactory>,
}

impl LoginFlowRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Creates a registry with the built-in flows registered.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(AuthorizationCodeFlow::KIND, |config, services| {
            Arc::new(AuthorizationCodeFlow::new(config, services))
        });
        registry
    }

    /// Registers a flow factory under a name, replacing any previous
    /// registration.
    pub fn register<F>(&mut self, kind: &'static str, factory: F)
    where
        F: Fn(Arc<LoginFlowConfig>, FlowServices) -> Arc<dyn LoginFlow> + Send + Sync + 'static,
    {
        self.factories.insert(kind, Box::new(factory));
    }

    /// Instantiates the flow registered under `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownFlow`] when no flow is registered
    /// under that name.
    pub fn create(
        &self,
        kind: &str,
        config: Arc<LoginFlowConfig>,
        services: FlowServices,
    ) -> Result<Arc<dyn LoginFlow>, ConfigError> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| ConfigError::UnknownFlow(kind.to_string()))?;
        Ok(factory(config, services))
    }

    /// Returns the registered flow names.
    #[must_use]
    pub fn kinds(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }
}

impl Default for LoginFlowRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
