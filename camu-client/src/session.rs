//! Login exchange and session lifetime.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::client::CamuClient;
use crate::error::AuthError;

const LOGIN_URL: &str = "https://student.bennetterp.camu.in/login/validate";

/// Cookie the ERP issues on a successful login and expects back on every
/// subsequent call.
const SESSION_COOKIE: &str = "connect.sid";

/// Login identity for the ERP.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// An authenticated ERP session.
///
/// The token is opaque; the acquisition instant drives the refresh
/// policy. Sessions are replaced wholesale on refresh, never mutated.
#[derive(Debug, Clone)]
pub struct Session {
    token: String,
    acquired_at: Instant,
}

impl Session {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            acquired_at: Instant::now(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Value for the `Cookie` request header.
    pub fn cookie_header(&self) -> String {
        format!("{}={}", SESSION_COOKIE, self.token)
    }

    pub fn age(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.age() >= max_age
    }

    /// Token rendered safe for log lines.
    pub fn redacted(&self) -> String {
        let chars: Vec<char> = self.token.chars().collect();
        if chars.len() <= 15 {
            return "***".to_string();
        }
        let head: String = chars[..10].iter().collect();
        let tail: String = chars[chars.len() - 5..].iter().collect();
        format!("{}...{}", head, tail)
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    dtype: &'a str,
    #[serde(rename = "Email")]
    email: &'a str,
    pwd: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    output: Option<LoginOutput>,
}

#[derive(Debug, Default, Deserialize)]
struct LoginOutput {
    #[serde(default)]
    data: Option<LoginData>,
}

#[derive(Debug, Default, Deserialize)]
struct LoginData {
    /// Present only when the ERP actually authenticated the caller.
    #[serde(rename = "logindetails")]
    login_details: Option<serde_json::Value>,
}

/// Whether the decoded login body proves an authenticated identity.
fn authenticated(body: &LoginResponse) -> bool {
    body.output
        .as_ref()
        .and_then(|output| output.data.as_ref())
        .is_some_and(|data| data.login_details.is_some())
}

impl CamuClient {
    /// Perform the login exchange and return a fresh session.
    ///
    /// Success requires both the `connect.sid` cookie and login details in
    /// the payload; either one missing is an [`AuthError`].
    pub async fn login(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        tracing::info!("Attempting login for {}", credentials.email);

        let response = self
            .http()
            .post(LOGIN_URL)
            .json(&LoginRequest {
                dtype: "M",
                email: &credentials.email,
                pwd: &credentials.password,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::Status(response.status()));
        }

        // Grab the cookie before the body consumes the response.
        let token = response
            .cookies()
            .find(|cookie| cookie.name() == SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string());

        let body: LoginResponse = response.json().await.map_err(AuthError::Decode)?;
        if !authenticated(&body) {
            return Err(AuthError::NotAuthenticated {
                email: credentials.email.clone(),
            });
        }

        let session = Session::new(token.ok_or(AuthError::MissingSessionCookie)?);
        tracing::info!("Login successful, session {}", session.redacted());
        Ok(session)
    }
}
