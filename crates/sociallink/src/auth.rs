//! Session authentication collaborator.
//!
//! Establishing and ending a login session belongs to the host. The engine
//! calls [`SessionAuthenticator::authenticate`] once an identity resolves to
//! an active account and never inspects how the host records the login.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::LinkResult;
use crate::account::Account;
use crate::context::RequestContext;

/// The account a session is logged in as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPrincipal {
    /// Logged-in account id.
    pub account_id: String,
    /// Logged-in username.
    pub username: String,
    /// When the login happened.
    #[serde(with = "time::serde::rfc3339")]
    pub authenticated_at: OffsetDateTime,
}

impl SessionPrincipal {
    /// Creates a principal for `account`, authenticated now.
    #[must_use]
    pub fn for_account(account: &Account) -> Self {
        Self {
            account_id: account.id.clone(),
            username: account.username.clone(),
            authenticated_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Host login session management.
#[async_trait]
pub trait SessionAuthenticator: Send + Sync {
    /// The account the request is logged in as, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the account lookup fails.
    async fn current_user(&self, ctx: &RequestContext) -> LinkResult<Option<Account>>;

    /// Logs the request's session in as `account`.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be established.
    async fn authenticate(
        &self,
        ctx: &mut RequestContext,
        account: &Account,
    ) -> LinkResult<SessionPrincipal>;

    /// Ends the request's login session.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be ended.
    async fn end_session(&self, ctx: &mut RequestContext) -> LinkResult<()>;
}
