//! # sociallink
//!
//! Social registration: link OAuth1, OAuth2 and OpenID identities to local
//! accounts or other host objects.
//!
//! This crate provides:
//! - Resolution of a verified provider subject to the account bound to it
//! - Account setup for unmatched identities: a new provider-only account, a
//!   password claim of an existing account, or an auto-generated username
//! - Idempotent connect of an identity to the logged-in user or to any
//!   domain object
//! - Two-phase disconnect
//!
//! ## Overview
//!
//! The engine never talks to a provider or a database itself. The host
//! supplies an [`IdentityVerifier`] per provider, an [`AccountStore`], a
//! [`ProfileStore`], an [`ObjectDirectory`] and a [`SessionAuthenticator`],
//! and drives a [`LinkFlow`] with a [`RequestContext`] built from each
//! request. Every operation returns a [`FlowOutcome`] telling the host where
//! to redirect or what to render.
//!
//! ## Modules
//!
//! - [`flow`] - The identity-linking state machine
//! - [`resolver`] - Provider subject to account lookup
//! - [`claimer`] - Account setup for unmatched identities
//! - [`target`] - Link targets and idempotent connect
//! - [`disconnect`] - Profile removal
//! - [`session`] - Session-carried flow state
//! - [`profile`] / [`account`] - Models and storage traits
//! - [`http`] - Axum responses for outcomes and errors

pub mod account;
pub mod auth;
pub mod claimer;
pub mod config;
pub mod context;
pub mod disconnect;
pub mod error;
pub mod flow;
pub mod http;
pub mod observability;
pub mod outcome;
pub mod password;
pub mod profile;
pub mod provider;
pub mod resolver;
pub mod session;
pub mod target;

#[cfg(test)]
mod test_support;

pub use account::{Account, AccountBuilder, AccountStore, UsernameError, validate_username};
pub use auth::{SessionAuthenticator, SessionPrincipal};
pub use claimer::{AccountClaimer, ClaimStep};
pub use config::{ConfigError, LinkConfig};
pub use context::{RequestContext, RequestMethod};
pub use disconnect::{Disconnector, post_disconnect_redirect};
pub use error::{ErrorCategory, LinkError};
pub use flow::LinkFlow;
pub use outcome::{DisconnectPrompt, FlowOutcome, RenderState};
pub use profile::{Credentials, IdentityKey, ProfileStore, Provider, ProviderProfile, TargetRef};
pub use provider::{IdentityVerifier, VerificationError, VerifiedIdentity};
pub use resolver::{IdentityResolver, Resolution};
pub use session::{PendingRegistration, SessionData, SetupState};
pub use target::{
    ConnectOutcome, DomainObject, LinkTarget, LinkTargetResolver, ObjectDirectory, ResolvedTarget,
};

/// Type alias for identity-linking results.
pub type LinkResult<T> = Result<T, LinkError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use sociallink::prelude::*;
/// ```
pub mod prelude {
    pub use crate::LinkResult;
    pub use crate::account::{Account, AccountStore, UsernameError};
    pub use crate::auth::{SessionAuthenticator, SessionPrincipal};
    pub use crate::config::{ConfigError, LinkConfig};
    pub use crate::context::{RequestContext, RequestMethod};
    pub use crate::error::{ErrorCategory, LinkError};
    pub use crate::flow::LinkFlow;
    pub use crate::outcome::{FlowOutcome, RenderState};
    pub use crate::profile::{Credentials, IdentityKey, ProfileStore, Provider, ProviderProfile, TargetRef};
    pub use crate::provider::{IdentityVerifier, VerificationError, VerifiedIdentity};
    pub use crate::session::SessionData;
    pub use crate::target::{DomainObject, LinkTarget, ObjectDirectory};
}
