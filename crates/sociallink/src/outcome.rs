//! What a flow operation asks the host to do next.

use serde::Serialize;
use uuid::Uuid;

use crate::account::UsernameError;
use crate::profile::{Provider, ProviderProfile, TargetRef};

/// The response a flow operation produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FlowOutcome {
    /// Send the browser elsewhere.
    Redirect {
        /// Destination URL.
        location: String,
        /// Message to flash on the destination page.
        #[serde(skip_serializing_if = "Option::is_none")]
        notice: Option<String>,
    },
    /// Render a page for the current state.
    Render(RenderState),
}

impl FlowOutcome {
    /// Redirect without a notice.
    #[must_use]
    pub fn redirect(location: impl Into<String>) -> Self {
        Self::Redirect {
            location: location.into(),
            notice: None,
        }
    }

    /// Redirect with a notice.
    #[must_use]
    pub fn redirect_with_notice(location: impl Into<String>, notice: impl Into<String>) -> Self {
        Self::Redirect {
            location: location.into(),
            notice: Some(notice.into()),
        }
    }

    /// The redirect destination, if this is a redirect.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        match self {
            Self::Redirect { location, .. } => Some(location),
            Self::Render(_) => None,
        }
    }

    /// The rendered state, if this is a render.
    #[must_use]
    pub fn render_state(&self) -> Option<&RenderState> {
        match self {
            Self::Render(state) => Some(state),
            Self::Redirect { .. } => None,
        }
    }
}

impl From<RenderState> for FlowOutcome {
    fn from(state: RenderState) -> Self {
        Self::Render(state)
    }
}

/// Pages the host renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RenderState {
    /// The provider completed the handshake without offering a subject.
    NoCredentialsOffered {
        /// Provider that was asked.
        provider: Provider,
    },
    /// The identity resolved to an inactive account.
    AccountInactive,
    /// Pick a username for the new account.
    UsernameChoice {
        /// Pre-filled username.
        #[serde(skip_serializing_if = "Option::is_none")]
        suggested_username: Option<String>,
        /// Why the previous choice was rejected.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<UsernameError>,
    },
    /// Enter the password of the account being claimed.
    PasswordClaim {
        /// Username of the account being claimed.
        username: String,
        /// The previous attempt used the wrong password.
        failed: bool,
    },
    /// Setup was reached without a pending registration.
    SessionExpired,
    /// Confirm removal of a profile.
    ConfirmDisconnect(DisconnectPrompt),
    /// The identity is already bound to a different target.
    AlreadyLinked {
        /// Provider of the identity.
        provider: Provider,
    },
}

/// Public view of a profile awaiting disconnect confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisconnectPrompt {
    /// Profile row id.
    pub profile_id: Uuid,
    /// Provider family.
    pub provider: Provider,
    /// What the profile is bound to.
    pub target: TargetRef,
    /// Display handle, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl From<&ProviderProfile> for DisconnectPrompt {
    fn from(profile: &ProviderProfile) -> Self {
        Self {
            profile_id: profile.id,
            provider: profile.provider,
            target: profile.target.clone(),
            display_name: profile.display_name.clone(),
        }
    }
}
