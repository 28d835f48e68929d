//! The identity-linking flow.
//!
//! [`LinkFlow`] drives one browser through a provider round trip:
//!
//! 1. [`begin_provider_link`](LinkFlow::begin_provider_link) records the link
//!    target and post-login destination in session and redirects to the
//!    provider.
//! 2. [`complete_provider_callback`](LinkFlow::complete_provider_callback)
//!    verifies the assertion, then connects it to the carried object or the
//!    logged-in user, logs in the account it already belongs to, or parks
//!    it as a pending registration and redirects to account setup.
//! 3. [`complete_account_setup`](LinkFlow::complete_account_setup) creates
//!    or claims the account for a pending registration.
//!
//! Every operation takes the request context mutably, because the session
//! it carries is how state survives between these steps. The host persists
//! `ctx.session` after each call.

use std::sync::Arc;

use tracing::Instrument;
use uuid::Uuid;

use crate::LinkResult;
use crate::account::{Account, AccountStore, UsernameError};
use crate::auth::SessionAuthenticator;
use crate::claimer::{AccountClaimer, ClaimStep};
use crate::config::LinkConfig;
use crate::context::RequestContext;
use crate::disconnect::Disconnector;
use crate::error::LinkError;
use crate::outcome::{FlowOutcome, RenderState};
use crate::profile::{ProfileStore, Provider, TargetRef};
use crate::provider::{IdentityVerifier, VerificationError, VerifiedIdentity};
use crate::resolver::{IdentityResolver, Resolution};
use crate::session::{PendingRegistration, SetupState};
use crate::target::{ConnectOutcome, LinkTarget, LinkTargetResolver, ObjectDirectory, ResolvedTarget};

/// Parameter carrying the post-login destination.
pub const NEXT_PARAM: &str = "next";
/// Parameter carrying the OpenID provider the user picked.
pub const OPENID_PROVIDER_PARAM: &str = "openid_provider";
/// Setup form field holding the chosen username.
pub const USERNAME_FIELD: &str = "username";
/// Setup form field holding the claim password.
pub const PASSWORD_FIELD: &str = "password";

/// Identity-linking state machine over the host's stores.
#[derive(Clone)]
pub struct LinkFlow {
    config: Arc<LinkConfig>,
    accounts: Arc<dyn AccountStore>,
    authenticator: Arc<dyn SessionAuthenticator>,
    identities: IdentityResolver,
    targets: LinkTargetResolver,
    claimer: AccountClaimer,
    disconnector: Disconnector,
}

impl LinkFlow {
    /// Creates a flow after validating `config`.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the configuration is invalid.
    pub fn new(
        config: LinkConfig,
        accounts: Arc<dyn AccountStore>,
        profiles: Arc<dyn ProfileStore>,
        directory: Arc<dyn ObjectDirectory>,
        authenticator: Arc<dyn SessionAuthenticator>,
    ) -> LinkResult<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let identities = IdentityResolver::new(&config.site_id, profiles.clone());
        let targets = LinkTargetResolver::new(&config.site_id, profiles.clone(), directory.clone());
        let claimer = AccountClaimer::new(
            config.clone(),
            accounts.clone(),
            profiles.clone(),
            targets.clone(),
        );
        let disconnector = Disconnector::new(config.clone(), profiles, directory);

        Ok(Self {
            config,
            accounts,
            authenticator,
            identities,
            targets,
            claimer,
            disconnector,
        })
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    // =========================================================================
    // Outbound leg
    // =========================================================================

    /// Starts a provider round trip.
    ///
    /// A domain object named by `object_type`/`object_id` must exist; it is
    /// carried in session so the callback binds the identity to it. A `next`
    /// parameter is remembered as the post-login destination.
    ///
    /// # Errors
    ///
    /// Returns `TargetNotFound` for a missing domain object,
    /// `InvalidRequest` for half a target, or a storage error.
    pub async fn begin_provider_link(
        &self,
        ctx: &mut RequestContext,
        verifier: &dyn IdentityVerifier,
    ) -> LinkResult<FlowOutcome> {
        let provider = verifier.provider();
        let span = tracing::info_span!(
            "begin_provider_link",
            logger = %self.config.logger_name,
            provider = %provider
        );

        async move {
            let carried = LinkTarget::from_query(&ctx.query)?;
            if let Some(target) = carried.as_ref().and_then(LinkTarget::as_target_ref) {
                self.targets.lookup(&target).await?;
            }
            ctx.session.set_link_target(carried.as_ref())?;

            if let Some(next) = requested_next(ctx) {
                ctx.session.set_next(&next)?;
            }
            if provider == Provider::OpenId {
                if let Some(hint) = ctx.query_value(OPENID_PROVIDER_PARAM).map(str::to_string) {
                    ctx.session.set_openid_provider(&hint)?;
                }
            }

            match verifier.authorization_url(ctx).await {
                Ok(url) => {
                    tracing::debug!("Redirecting to provider");
                    Ok(FlowOutcome::redirect(url))
                }
                Err(e) => self.verification_failed(ctx, provider, e),
            }
        }
        .instrument(span)
        .await
    }

    // =========================================================================
    // Inbound leg
    // =========================================================================

    /// Handles the provider callback.
    ///
    /// In order: a missing subject renders [`RenderState::NoCredentialsOffered`];
    /// a carried domain object, then the logged-in user, gets the identity
    /// connected; an identity already bound to an account logs that account
    /// in; anything else becomes a pending registration and redirects to
    /// account setup.
    ///
    /// # Errors
    ///
    /// Returns `TargetNotFound` if the carried object disappeared, or a
    /// storage error.
    pub async fn complete_provider_callback(
        &self,
        ctx: &mut RequestContext,
        verifier: &dyn IdentityVerifier,
    ) -> LinkResult<FlowOutcome> {
        let provider = verifier.provider();
        let span = tracing::info_span!(
            "complete_provider_callback",
            logger = %self.config.logger_name,
            provider = %provider
        );

        async move {
            let identity = match verifier.verify(ctx).await {
                Ok(identity) => identity,
                Err(e) => return self.verification_failed(ctx, provider, e),
            };

            let matched = match self
                .identities
                .resolve(identity.provider, &identity.remote_id)
                .await?
            {
                Resolution::NoCredentials => {
                    tracing::info!("Provider offered no subject");
                    return Ok(RenderState::NoCredentialsOffered { provider }.into());
                }
                Resolution::Unmatched => None,
                Resolution::Matched { target, .. } => Some(target),
            };

            let carried = ctx.session.take_link_target();
            let current_user = self.authenticator.current_user(ctx).await?;

            match self.targets.resolve_target(&carried, current_user).await? {
                ResolvedTarget::Object(object) => self.connect(ctx, &identity, &object.target).await,
                ResolvedTarget::User(account) => {
                    self.connect(ctx, &identity, &account.target_ref()).await
                }
                ResolvedTarget::Unbound => match matched {
                    Some(target) => self.log_in_matched(ctx, &identity, &target).await,
                    None => self.start_setup(ctx, identity),
                },
            }
        }
        .instrument(span)
        .await
    }

    // =========================================================================
    // Account setup
    // =========================================================================

    /// Handles the account setup page for a pending registration.
    ///
    /// Renders [`RenderState::SessionExpired`] when there is nothing pending,
    /// and logs in directly when the identity has been linked since the
    /// callback. Otherwise a sibling account or an auto-generated username completes
    /// setup immediately when enabled; a safe request renders the current
    /// setup step; a submission chooses a username or claims an account.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn complete_account_setup(&self, ctx: &mut RequestContext) -> LinkResult<FlowOutcome> {
        let span = tracing::info_span!("complete_account_setup", logger = %self.config.logger_name);

        async move {
            let Some(mut pending) = ctx.session.pending_registration() else {
                tracing::warn!(error = %LinkError::MissingPendingRegistration, "Account setup reached without an identity");
                return Ok(RenderState::SessionExpired.into());
            };

            // A concurrent submit may already have linked this identity.
            if let Resolution::Matched { target, .. } = self
                .identities
                .resolve(pending.identity.provider, &pending.identity.remote_id)
                .await?
            {
                if let Some(account) = self.accounts.find_by_id(&target.object_id).await? {
                    tracing::info!(account_id = %account.id, "Pending identity already linked");
                    return self.log_in_bound(ctx, &pending.identity, &target, account).await;
                }
            }

            if let Some(step) = self.claimer.try_sibling(&pending).await? {
                return self.finish_setup(ctx, pending, step).await;
            }
            if self.config.generate_username {
                let step = self.claimer.auto_provision(&pending).await?;
                return self.finish_setup(ctx, pending, step).await;
            }
            if !ctx.is_post() {
                return Ok(setup_form(&pending, false).into());
            }

            let username = ctx.form_value(USERNAME_FIELD).map(str::to_string);
            let password = ctx.form.get(PASSWORD_FIELD).filter(|p| !p.is_empty()).cloned();

            let step = match (username, password) {
                (Some(username), password) => {
                    self.claimer
                        .submit_username(&mut pending, &username, password.as_deref())
                        .await?
                }
                (None, Some(password)) => self.claimer.claim_password(&mut pending, &password).await?,
                (None, None) => match &pending.state {
                    SetupState::AwaitingUsernameChoice => ClaimStep::Rejected(UsernameError::Empty),
                    SetupState::AwaitingPasswordClaim { username } => ClaimStep::NeedsPassword {
                        username: username.clone(),
                    },
                },
            };
            self.finish_setup(ctx, pending, step).await
        }
        .instrument(span)
        .await
    }

    // =========================================================================
    // Disconnect and logout
    // =========================================================================

    /// Confirms, then removes, a provider profile.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn disconnect(&self, ctx: &mut RequestContext, profile_id: Uuid) -> LinkResult<FlowOutcome> {
        let span = tracing::info_span!(
            "disconnect",
            logger = %self.config.logger_name,
            profile_id = %profile_id
        );
        self.disconnector.disconnect(ctx, profile_id).instrument(span).await
    }

    /// Ends the login session and redirects to `redirect_url`, or the
    /// configured logout destination.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be ended.
    pub async fn logout(&self, ctx: &mut RequestContext, redirect_url: Option<&str>) -> LinkResult<FlowOutcome> {
        let span = tracing::info_span!("logout", logger = %self.config.logger_name);

        async move {
            self.authenticator.end_session(ctx).await?;
            let location = redirect_url
                .filter(|url| !url.is_empty())
                .unwrap_or(self.config.logout_redirect_url.as_str());
            tracing::info!(location = %location, "Logged out");
            Ok(FlowOutcome::redirect(location))
        }
        .instrument(span)
        .await
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn connect(
        &self,
        ctx: &mut RequestContext,
        identity: &VerifiedIdentity,
        target: &TargetRef,
    ) -> LinkResult<FlowOutcome> {
        match self.targets.connect(identity, target).await? {
            ConnectOutcome::LinkedElsewhere(_) => Ok(RenderState::AlreadyLinked {
                provider: identity.provider,
            }
            .into()),
            _ => Ok(FlowOutcome::redirect(self.take_next(ctx))),
        }
    }

    async fn log_in_matched(
        &self,
        ctx: &mut RequestContext,
        identity: &VerifiedIdentity,
        target: &TargetRef,
    ) -> LinkResult<FlowOutcome> {
        let Some(account) = self.accounts.find_by_id(&target.object_id).await? else {
            tracing::warn!(target = %target, "Profile bound to a missing account");
            return self.start_setup(ctx, identity.clone());
        };
        self.log_in_bound(ctx, identity, target, account).await
    }

    /// Refreshes the bound profile's credentials and logs its account in.
    async fn log_in_bound(
        &self,
        ctx: &mut RequestContext,
        identity: &VerifiedIdentity,
        target: &TargetRef,
        account: Account,
    ) -> LinkResult<FlowOutcome> {
        if account.is_active() {
            self.targets.connect(identity, target).await?;
        }
        self.log_in(ctx, account).await
    }

    fn start_setup(&self, ctx: &mut RequestContext, identity: VerifiedIdentity) -> LinkResult<FlowOutcome> {
        let pending = PendingRegistration::new(identity);
        ctx.session.set_pending_registration(&pending)?;
        tracing::info!(provider = %pending.identity.provider, "Identity unmatched, starting account setup");
        Ok(FlowOutcome::redirect(&self.config.setup_url))
    }

    async fn finish_setup(
        &self,
        ctx: &mut RequestContext,
        pending: PendingRegistration,
        step: ClaimStep,
    ) -> LinkResult<FlowOutcome> {
        let state = match step {
            ClaimStep::Provisioned(account)
            | ClaimStep::Claimed(account)
            | ClaimStep::Existing(account) => return self.log_in(ctx, account).await,
            ClaimStep::Inactive => RenderState::AccountInactive,
            ClaimStep::NeedsPassword { username } => RenderState::PasswordClaim {
                username,
                failed: false,
            },
            ClaimStep::WrongPassword { username } => RenderState::PasswordClaim {
                username,
                failed: true,
            },
            ClaimStep::Rejected(error) => RenderState::UsernameChoice {
                suggested_username: pending.suggested_username().map(str::to_string),
                error: Some(error),
            },
        };
        ctx.session.set_pending_registration(&pending)?;
        Ok(state.into())
    }

    async fn log_in(&self, ctx: &mut RequestContext, account: Account) -> LinkResult<FlowOutcome> {
        if !account.is_active() {
            tracing::info!(account_id = %account.id, "Refusing login to inactive account");
            return Ok(RenderState::AccountInactive.into());
        }
        let principal = self.authenticator.authenticate(ctx, &account).await?;
        ctx.session.clear_pending_registration();
        tracing::info!(account_id = %principal.account_id, "Logged in with provider identity");
        Ok(FlowOutcome::redirect(self.take_next(ctx)))
    }

    fn verification_failed(
        &self,
        ctx: &mut RequestContext,
        provider: Provider,
        error: VerificationError,
    ) -> LinkResult<FlowOutcome> {
        let notice = match &error {
            VerificationError::DiscoveryFailure(_) => {
                tracing::warn!(error = %error.clone().into_link_error(provider), "OpenID discovery failed");
                ctx.session.set_openid_error()?;
                return Ok(FlowOutcome::redirect(&self.config.login_url));
            }
            VerificationError::Declined => "Authorization was cancelled.",
            VerificationError::Rejected(_) => "The provider could not verify your identity.",
        };
        tracing::info!(error = %error.into_link_error(provider), "Provider verification failed");

        let location = match ctx.referer.clone().filter(|r| !r.is_empty()) {
            Some(referer) => referer,
            None => self.take_next(ctx),
        };
        Ok(FlowOutcome::redirect_with_notice(location, notice))
    }

    /// Post-login destination: remembered in session (consumed), then the
    /// request's `next`, then the configured default.
    fn take_next(&self, ctx: &mut RequestContext) -> String {
        ctx.session
            .take_next()
            .or_else(|| requested_next(ctx))
            .unwrap_or_else(|| self.config.login_redirect_url.clone())
    }
}

fn requested_next(ctx: &RequestContext) -> Option<String> {
    ctx.query_value(NEXT_PARAM)
        .or_else(|| ctx.form_value(NEXT_PARAM))
        .map(str::to_string)
}

fn setup_form(pending: &PendingRegistration, failed: bool) -> RenderState {
    match &pending.state {
        SetupState::AwaitingUsernameChoice => RenderState::UsernameChoice {
            suggested_username: pending.suggested_username().map(str::to_string),
            error: None,
        },
        SetupState::AwaitingPasswordClaim { username } => RenderState::PasswordClaim {
            username: username.clone(),
            failed,
        },
    }
}
