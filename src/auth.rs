//! Credential access for the update channel
//!
//! The channel only reads a token; acquiring, renewing or storing
//! credentials is the embedding application's concern.

/// Synchronous, read-only view of the current auth token.
/// An empty token is treated as absent.
pub trait CredentialProvider: Send + Sync {
    fn token(&self) -> Option<String>;
}

/// Reads the token from an environment variable on every call, so a
/// token cleared mid-session is observed by the next cycle.
pub struct EnvCredentials {
    var_name: String,
}

impl EnvCredentials {
    pub fn new(var_name: impl Into<String>) -> Self {
        Self {
            var_name: var_name.into(),
        }
    }
}

impl CredentialProvider for EnvCredentials {
    fn token(&self) -> Option<String> {
        std::env::var(&self.var_name)
            .ok()
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
    }
}

/// Fixed token for embedding and tests.
pub struct StaticCredentials {
    token: Option<String>,
}

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        Self {
            token: (!token.is_empty()).then_some(token),
        }
    }

    pub fn absent() -> Self {
        Self { token: None }
    }
}

impl CredentialProvider for StaticCredentials {
    fn token(&self) -> Option<String> {
        self.token.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_credentials() {
        std::env::set_var("BOTFEED_TEST_TOKEN_A", "tok-123");
        let creds = EnvCredentials::new("BOTFEED_TEST_TOKEN_A");
        assert_eq!(creds.token().as_deref(), Some("tok-123"));
        std::env::remove_var("BOTFEED_TEST_TOKEN_A");
        assert_eq!(creds.token(), None);
    }

    #[test]
    fn test_env_credentials_empty_is_absent() {
        std::env::set_var("BOTFEED_TEST_TOKEN_B", "   ");
        let creds = EnvCredentials::new("BOTFEED_TEST_TOKEN_B");
        assert_eq!(creds.token(), None);
        std::env::remove_var("BOTFEED_TEST_TOKEN_B");
    }

    #[test]
    fn test_static_credentials() {
        assert_eq!(
            StaticCredentials::new("abc").token().as_deref(),
            Some("abc")
        );
        assert_eq!(StaticCredentials::new("").token(), None);
        assert_eq!(StaticCredentials::absent().token(), None);
    }
}
