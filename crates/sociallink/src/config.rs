//! Identity-linking configuration.
//!
//! All settings that change engine behavior live in [`LinkConfig`], which is
//! passed explicitly to [`LinkFlow`](crate::flow::LinkFlow).
//!
//! # Example (TOML)
//!
//! ```toml
//! site_id = "blog"
//! generate_username = false
//! reuse_sibling_profiles = true
//! login_redirect_url = "/dashboard/"
//! disconnect_redirect_url = "/settings/connections/"
//! ```

use serde::{Deserialize, Serialize};

use crate::account::MAX_USERNAME_LENGTH;

/// Shortest generated username accepted.
pub const MIN_GENERATED_USERNAME_LENGTH: usize = 8;

/// Default logger target name.
pub const DEFAULT_LOGGER_NAME: &str = "sociallink";

/// Root identity-linking configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Deployment the engine runs as.
    /// Profiles are stored per site; the sibling shortcut looks across sites.
    pub site_id: String,

    /// Skip the username form and provision accounts with a random username.
    pub generate_username: bool,

    /// Length of generated usernames.
    pub generated_username_length: usize,

    /// Reuse the account bound to the same provider identity on a sibling
    /// deployment instead of prompting for setup.
    pub reuse_sibling_profiles: bool,

    /// Where unmatched identities are sent to choose a username.
    pub setup_url: String,

    /// Generic login page, used after an OpenID discovery failure.
    pub login_url: String,

    /// Default destination after a successful login or connect.
    pub login_redirect_url: String,

    /// Default destination after logout.
    pub logout_redirect_url: String,

    /// Fallback destination after a disconnect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disconnect_redirect_url: Option<String>,

    /// Logger name attached to every flow span.
    pub logger_name: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            site_id: "default".to_string(),
            generate_username: false,
            generated_username_length: 30,
            reuse_sibling_profiles: false,
            setup_url: "/social/setup/".to_string(),
            login_url: "/accounts/login/".to_string(),
            login_redirect_url: "/".to_string(),
            logout_redirect_url: "/".to_string(),
            disconnect_redirect_url: None,
            logger_name: DEFAULT_LOGGER_NAME.to_string(),
        }
    }
}

impl LinkConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the site identifier.
    #[must_use]
    pub fn with_site_id(mut self, site_id: impl Into<String>) -> Self {
        self.site_id = site_id.into();
        self
    }

    /// Enables or disables username auto-generation.
    #[must_use]
    pub fn with_generate_username(mut self, enabled: bool) -> Self {
        self.generate_username = enabled;
        self
    }

    /// Enables or disables the sibling-deployment shortcut.
    #[must_use]
    pub fn with_reuse_sibling_profiles(mut self, enabled: bool) -> Self {
        self.reuse_sibling_profiles = enabled;
        self
    }

    /// Sets the default post-login destination.
    #[must_use]
    pub fn with_login_redirect_url(mut self, url: impl Into<String>) -> Self {
        self.login_redirect_url = url.into();
        self
    }

    /// Sets the fallback post-disconnect destination.
    #[must_use]
    pub fn with_disconnect_redirect_url(mut self, url: impl Into<String>) -> Self {
        self.disconnect_redirect_url = Some(url.into());
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the site id is empty and
    /// `ConfigError::InvalidValue` if a URL is neither path-absolute nor
    /// http(s), or the generated username length is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.site_id.trim().is_empty() {
            return Err(ConfigError::Missing("site_id".to_string()));
        }

        if !(MIN_GENERATED_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&self.generated_username_length) {
            return Err(ConfigError::InvalidValue(format!(
                "generated_username_length must be between {MIN_GENERATED_USERNAME_LENGTH} and {MAX_USERNAME_LENGTH}, got {}",
                self.generated_username_length
            )));
        }

        let mut urls = vec![
            ("setup_url", self.setup_url.as_str()),
            ("login_url", self.login_url.as_str()),
            ("login_redirect_url", self.login_redirect_url.as_str()),
            ("logout_redirect_url", self.logout_redirect_url.as_str()),
        ];
        if let Some(url) = &self.disconnect_redirect_url {
            urls.push(("disconnect_redirect_url", url.as_str()));
        }

        for (name, value) in urls {
            if !is_redirect_url(value) {
                return Err(ConfigError::InvalidValue(format!(
                    "{name} must be a path starting with '/' or an absolute http(s) URL, got '{value}'"
                )));
            }
        }

        Ok(())
    }
}

fn is_redirect_url(value: &str) -> bool {
    if value.starts_with('/') {
        return true;
    }
    url::Url::parse(value)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// The configuration sources could not be read or merged.
    #[error("Configuration load error: {0}")]
    Load(String),
}

pub mod loader {
    use super::{ConfigError, LinkConfig};
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Default configuration file, looked up in the working directory.
    pub const DEFAULT_CONFIG_FILE: &str = "sociallink.toml";

    /// Loads configuration from an optional TOML file and `SOCIALLINK__*`
    /// environment variables, then validates it.
    pub fn load_config(path: Option<&str>) -> Result<LinkConfig, ConfigError> {
        let mut builder = Config::builder();
        let file = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if file.exists() {
            builder = builder.add_source(File::from(file));
        }
        // e.g. SOCIALLINK__GENERATE_USERNAME=true
        builder = builder.add_source(
            Environment::with_prefix("SOCIALLINK")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| ConfigError::Load(format!("config build error: {e}")))?;
        let merged: LinkConfig = cfg
            .try_deserialize()
            .map_err(|e| ConfigError::Load(format!("config deserialize error: {e}")))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LinkConfig::default();
        assert_eq!(config.site_id, "default");
        assert!(!config.generate_username);
        assert!(!config.reuse_sibling_profiles);
        assert_eq!(config.generated_username_length, 30);
        assert_eq!(config.login_redirect_url, "/");
        assert!(config.disconnect_redirect_url.is_none());
        assert_eq!(config.logger_name, DEFAULT_LOGGER_NAME);
    }

    #[test]
    fn test_default_config_validates() {
        assert!(LinkConfig::default().validate().is_ok());
    }

    #[test]
    fn test_empty_site_fails_validation() {
        let config = LinkConfig::default().with_site_id("  ");
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn test_relative_url_fails_validation() {
        let config = LinkConfig::default().with_login_redirect_url("dashboard");
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));

        let config = LinkConfig::default().with_disconnect_redirect_url("ftp://example.com/");
        assert!(config.validate().is_err());

        let config = LinkConfig::default().with_disconnect_redirect_url("https://example.com/x");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_username_length_bounds() {
        let mut config = LinkConfig::default();
        config.generated_username_length = 4;
        assert!(config.validate().is_err());
        config.generated_username_length = 31;
        assert!(config.validate().is_err());
        config.generated_username_length = 8;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: LinkConfig = serde_json::from_value(serde_json::json!({
            "site_id": "blog",
            "generate_username": true
        }))
        .unwrap();
        assert_eq!(config.site_id, "blog");
        assert!(config.generate_username);
        assert_eq!(config.setup_url, "/social/setup/");
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sociallink.toml");
        std::fs::write(
            &path,
            "site_id = \"shop\"\nreuse_sibling_profiles = true\nlogin_redirect_url = \"/home/\"\n",
        )
        .unwrap();

        let config = loader::load_config(path.to_str()).unwrap();
        assert_eq!(config.site_id, "shop");
        assert!(config.reuse_sibling_profiles);
        assert_eq!(config.login_redirect_url, "/home/");
    }

    #[test]
    fn test_load_config_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "setup_url = \"setup\"\n").unwrap();

        let err = loader::load_config(path.to_str()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue("test error".to_string());
        assert_eq!(err.to_string(), "Invalid configuration value: test error");
        let err = ConfigError::Missing("site_id".to_string());
        assert_eq!(err.to_string(), "Missing required configuration: site_id");
    }
}
