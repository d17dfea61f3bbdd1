//! # lychgate-oidc
//!
//! OpenID Connect relying-party integration for host applications.
//!
//! This crate provides:
//! - Authorization code login flow against any OIDC provider
//! - ID token parsing, validation, and JWKS-backed signature checks
//! - Claim-driven role synchronization
//! - Single sign-off (IdP logout and session monitoring)
//! - Forced-redirect login page decisions with per-session opt-out
//!
//! ## Overview
//!
//! The host application brings its own user accounts, roles, sessions,
//! and HTTP layer; this crate owns the protocol: redirects, state and
//! nonce handling, the code exchange, token validation, and the
//! bookkeeping that links IdP identities to local accounts. The seams
//! are the traits in [`storage`], plus [`jwt::SignatureVerifier`] for
//! cryptographic verification.
//!
//! ## Modules
//!
//! - [`config`] - Relying-party configuration
//! - [`loginflow`] - Login flow orchestration and the authorization code flow
//! - [`jwt`] - ID token parsing and structural validation
//! - [`jwks`] - JWKS-backed signature verification
//! - [`roles`] - Claim-to-role synchronization
//! - [`session`] - Login-page redirect decisions
//! - [`signoff`] - Single sign-off coordination
//! - [`storage`] - Storage and collaborator traits
//! - [`events`] - Login event notifications

pub mod config;
pub mod events;
pub mod jwks;
pub mod jwt;
pub mod loginflow;
pub mod roles;
pub mod session;
pub mod signoff;
pub mod storage;

pub use config::{ConfigError, LoginFlowConfig, ProvisioningPolicy, UserRestrictions};
pub use events::{EventSink, LoginEvent, TracingEventSink};
pub use jwks::{JwksVerifier, JwksVerifierConfig};
pub use jwt::{IdToken, SignatureVerifier, TokenError};
pub use loginflow::{
    AuthorizationCodeFlow, AuthorizationRedirect, FlowServices, InitiateRequest, LoginFlow,
    LoginFlowError, LoginFlowKind, LoginFlowRegistry, LoginOutcome,
};
pub use roles::{LocalRole, RoleDiff, sync_roles};
pub use session::{RedirectRequest, RequestMethod, SessionRedirectState, should_redirect};
pub use signoff::{
    SESSION_CHECK_INTERVAL, SessionAction, SessionCheckResponse, SessionMonitor, build_logout_url,
};
pub use storage::{
    AuthState, LocalUser, OidcToken, RoleAssignments, StateStorage, StoreError, TokenStorage,
    TokenUpdate, UserDirectory, UserProfile,
};

/// Type alias for login flow results.
pub type FlowResult<T> = Result<T, LoginFlowError>;
