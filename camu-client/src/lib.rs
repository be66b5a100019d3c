//! Typed client for the Camu student ERP.
//!
//! Wraps the three endpoints the attendance watcher needs: the login
//! exchange, the timetable query, and the online-attendance submission.
//! Each call takes the session explicitly so the caller stays in charge
//! of the token lifetime.

mod attendance;
mod client;
pub mod error;
mod session;
mod timetable;

pub use attendance::Outcome;
pub use client::CamuClient;
pub use error::{AuthError, FetchError, SubmitError};
pub use session::{Credentials, Session};
pub use timetable::AttendanceWindow;
