use crate::adapters::config::{Settings, TOKEN_ENV};
use crate::core::ports::credentials::CredentialProvider;

/// A fixed token, or none for anonymous requests.
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        let token = token.trim();
        Self((!token.is_empty()).then(|| token.to_string()))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl CredentialProvider for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Token from `KBCHAT_TOKEN`, falling back to the configured access token.
pub struct SettingsCredentials {
    configured: Option<String>,
}

impl SettingsCredentials {
    pub fn new(settings: &Settings) -> Self {
        Self {
            configured: settings.access_token(),
        }
    }

    fn resolve(&self, env_value: Option<String>) -> Option<String> {
        env_value
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .or_else(|| self.configured.clone())
    }
}

impl CredentialProvider for SettingsCredentials {
    fn bearer_token(&self) -> Option<String> {
        self.resolve(std::env::var(TOKEN_ENV).ok())
    }
}
