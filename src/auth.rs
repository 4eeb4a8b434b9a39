//! Login, registration and credential checks against `/auth/*`.
//!
//! Credentials are validated locally first; nothing is sent for an address
//! that is obviously malformed or a password that is too short.

use std::sync::OnceLock;

use regex::Regex;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{RemoteError, Result, ValidationError};
use crate::gateway::HttpGateway;
use crate::session::{AuthSession, Session, User};

/// Minimum password length accepted by the forms.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Maximum display name length accepted by the registration form.
pub const MAX_DISPLAY_NAME_LEN: usize = 50;

fn email_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok())
        .as_ref()
}

/// Trim and check an email address.
pub fn validate_email(email: &str) -> std::result::Result<String, ValidationError> {
    let email = email.trim();
    if email_pattern().is_some_and(|pattern| pattern.is_match(email)) {
        Ok(email.to_string())
    } else {
        Err(ValidationError::InvalidEmail(email.to_string()))
    }
}

/// Passwords are taken verbatim; only the length is checked.
pub fn validate_password(password: &str) -> std::result::Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort {
            min: MIN_PASSWORD_LEN,
        });
    }
    Ok(())
}

/// Trim a display name and check its length.
pub fn validate_display_name(name: &str) -> std::result::Result<String, ValidationError> {
    let name = name.trim();
    let len = name.chars().count();
    if len == 0 || len > MAX_DISPLAY_NAME_LEN {
        return Err(ValidationError::InvalidDisplayName {
            max: MAX_DISPLAY_NAME_LEN,
        });
    }
    Ok(name.to_string())
}

#[derive(Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RegisterBody<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct AuthResponse {
    token: String,
    #[serde(default)]
    user: Option<User>,
}

/// Client for the authentication endpoints.
///
/// Populates and clears the [`AuthSession`] shared with the habits gateway.
#[derive(Debug, Clone)]
pub struct AuthClient {
    http: HttpGateway,
}

impl AuthClient {
    #[must_use]
    pub const fn new(http: HttpGateway) -> Self {
        Self { http }
    }

    #[must_use]
    pub const fn session(&self) -> &AuthSession {
        self.http.session()
    }

    /// `POST /auth/login`; stores the returned token on success.
    pub async fn login(&self, email: &str, password: &str) -> Result<Option<User>> {
        let email = validate_email(email)?;
        validate_password(password)?;

        let request = self.http.request(Method::POST, "/auth/login").json(&LoginBody {
            email: &email,
            password,
        });
        let response: AuthResponse = self.http.send(request).await?;
        info!("Logged in as {email}");
        Ok(self.establish(response))
    }

    /// `POST /auth/register`; a successful registration also logs in.
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<Option<User>> {
        let name = validate_display_name(name)?;
        let email = validate_email(email)?;
        validate_password(password)?;

        let request = self
            .http
            .request(Method::POST, "/auth/register")
            .json(&RegisterBody {
                name: &name,
                email: &email,
                password,
            });
        let response: AuthResponse = self.http.send(request).await?;
        info!("Registered {email}");
        Ok(self.establish(response))
    }

    /// `GET /auth/me`. An expired token is dropped from the session.
    pub async fn me(&self) -> Result<User> {
        match self
            .http
            .send::<User>(self.http.request(Method::GET, "/auth/me"))
            .await
        {
            Ok(user) => {
                self.session().set_user(user.clone());
                Ok(user)
            }
            Err(RemoteError::Unauthorized) => {
                warn!("Session rejected by server, clearing it");
                self.session().clear();
                Err(RemoteError::Unauthorized.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Forget the session locally. The backend keeps no logout state.
    pub fn logout(&self) {
        self.session().clear();
    }

    fn establish(&self, response: AuthResponse) -> Option<User> {
        self.session().set(Session {
            token: response.token,
            user: response.user.clone(),
        });
        response.user
    }
}
