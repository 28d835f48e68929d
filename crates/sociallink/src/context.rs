//! Request context handed to every flow operation.
//!
//! The host builds a [`RequestContext`] from its framework's request, loads
//! the browser session into [`SessionData`], calls a flow operation, and then
//! persists `ctx.session` again. Nothing else carries state between the two
//! legs of a provider round trip.

use std::collections::HashMap;

use crate::session::SessionData;

/// HTTP method of the inbound request, as far as the flow cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    /// Safe request: renders, never mutates links.
    Get,
    /// Form submission.
    Post,
}

/// Inbound request data plus the session it belongs to.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Request method.
    pub method: RequestMethod,
    /// Query string parameters.
    pub query: HashMap<String, String>,
    /// Form body parameters.
    pub form: HashMap<String, String>,
    /// `Referer` header, if sent.
    pub referer: Option<String>,
    /// Session state loaded by the host.
    pub session: SessionData,
}

impl RequestContext {
    /// Creates a GET request with an empty session.
    #[must_use]
    pub fn get() -> Self {
        Self {
            method: RequestMethod::Get,
            query: HashMap::new(),
            form: HashMap::new(),
            referer: None,
            session: SessionData::new(),
        }
    }

    /// Creates a POST request with an empty session.
    #[must_use]
    pub fn post() -> Self {
        Self {
            method: RequestMethod::Post,
            ..Self::get()
        }
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Adds a form parameter.
    #[must_use]
    pub fn with_form(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.insert(key.into(), value.into());
        self
    }

    /// Sets the referer.
    #[must_use]
    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    /// Attaches a previously persisted session.
    #[must_use]
    pub fn with_session(mut self, session: SessionData) -> Self {
        self.session = session;
        self
    }

    /// Returns `true` for form submissions.
    #[must_use]
    pub fn is_post(&self) -> bool {
        self.method == RequestMethod::Post
    }

    /// Non-empty, trimmed form value.
    #[must_use]
    pub fn form_value(&self, key: &str) -> Option<&str> {
        self.form.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    /// Non-empty query value.
    #[must_use]
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    /// Consumes the context, returning the session for the host to persist.
    #[must_use]
    pub fn into_session(self) -> SessionData {
        self.session
    }
}
