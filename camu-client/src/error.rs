//! Error types for the three ERP calls.
//!
//! The watcher treats `AuthError` as fatal only for the initial login;
//! everything else is transient and absorbed at the loop.

use thiserror::Error;

/// Login exchange failures.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("login request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("login rejected with status {0}")]
    Status(reqwest::StatusCode),

    #[error("login response could not be decoded: {0}")]
    Decode(#[source] reqwest::Error),

    /// The response decoded fine but carried no proof of an
    /// authenticated identity.
    #[error("login for {email} returned no login details")]
    NotAuthenticated { email: String },

    #[error("login response carried no session cookie")]
    MissingSessionCookie,
}

/// Timetable fetch failures.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("timetable request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("timetable returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("timetable payload could not be decoded: {0}")]
    Decode(#[source] reqwest::Error),
}

/// Attendance submission failures.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("attendance request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("attendance returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("attendance response could not be decoded: {0}")]
    Decode(#[source] reqwest::Error),

    /// The upstream acknowledged the request but sent no result payload,
    /// which is indistinguishable from an undecodable response.
    #[error("attendance response carried no result payload")]
    MissingData,
}
