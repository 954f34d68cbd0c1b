//! Login inputs.
//!
//! Credentials never live in the settings file. They come from the caller or
//! from `SNK_UID` / `SNK_PASSWD`.

use secrecy::{ExposeSecret, SecretString};

use crate::loader::read_env_string;

/// User name and password used for `POST /api/login`.
#[derive(Clone)]
pub struct LoginCredentials {
    /// Account name.
    pub user: String,
    password: SecretString,
}

impl LoginCredentials {
    /// Build credentials from explicit values.
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// Read `SNK_UID` and `SNK_PASSWD`. Returns `None` unless both are set
    /// and non-empty.
    pub fn from_env() -> Option<Self> {
        let user = read_env_string("SNK_UID")?;
        let password = read_env_string("SNK_PASSWD")?;
        Some(Self::new(user, password))
    }

    /// The password in clear text.
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

impl std::fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .finish()
    }
}
