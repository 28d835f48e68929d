use std::sync::Arc;

use async_trait::async_trait;
use sociallink::{Account, AccountStore, LinkResult, RequestContext, SessionAuthenticator, SessionPrincipal};

/// Session key holding the logged-in principal.
pub const PRINCIPAL_KEY: &str = "sociallink.principal";

/// Session-backed authenticator.
///
/// The principal lives in the request's session; the account is looked up
/// again on every request so deactivation and deletion take effect
/// immediately.
#[derive(Clone)]
pub struct MemorySessionAuthenticator {
    accounts: Arc<dyn AccountStore>,
}

impl MemorySessionAuthenticator {
    /// Creates an authenticator over `accounts`.
    pub fn new(accounts: Arc<dyn AccountStore>) -> Self {
        Self { accounts }
    }

    /// The principal stored in the session, if any.
    pub fn principal(ctx: &RequestContext) -> Option<SessionPrincipal> {
        ctx.session.get(PRINCIPAL_KEY)
    }
}

#[async_trait]
impl SessionAuthenticator for MemorySessionAuthenticator {
    async fn current_user(&self, ctx: &RequestContext) -> LinkResult<Option<Account>> {
        let Some(principal) = Self::principal(ctx) else {
            return Ok(None);
        };
        Ok(self
            .accounts
            .find_by_id(&principal.account_id)
            .await?
            .filter(Account::is_active))
    }

    async fn authenticate(
        &self,
        ctx: &mut RequestContext,
        account: &Account,
    ) -> LinkResult<SessionPrincipal> {
        let principal = SessionPrincipal::for_account(account);
        ctx.session.insert(PRINCIPAL_KEY, &principal)?;
        tracing::debug!(account_id = %account.id, "Session authenticated");
        Ok(principal)
    }

    async fn end_session(&self, ctx: &mut RequestContext) -> LinkResult<()> {
        ctx.session.clear();
        Ok(())
    }
}
