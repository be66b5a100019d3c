//! Online-attendance submission and outcome classification.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::client::CamuClient;
use crate::error::SubmitError;
use crate::session::Session;

const ATTENDANCE_URL: &str =
    "https://student.bennetterp.camu.in/api/Attendance/record-online-attendance";

// Approximate campus coordinates; the endpoint wants them as strings.
const CAMPUS_LATITUDE: &str = "28.4518";
const CAMPUS_LONGITUDE: &str = "77.5737";
const GPS_ACCURACY: &str = "10";

const CODE_SUCCESS: &str = "SUCCESS";
const CODE_ALREADY_RECORDED: &str = "ATTENDANCE_ALREADY_RECORDED";
const CODE_NOT_VALID: &str = "ATTENDANCE_NOT_VALID";

/// Classified result of a submission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The upstream recorded the attendance, or had it recorded already.
    Confirmed,
    /// The window is not currently open; retry while it might still open.
    NotYetValid,
    /// A code this client does not know. Not success.
    Unknown(String),
}

impl Outcome {
    fn from_code(code: &str) -> Self {
        match code {
            CODE_SUCCESS | CODE_ALREADY_RECORDED => Outcome::Confirmed,
            CODE_NOT_VALID => Outcome::NotYetValid,
            other => Outcome::Unknown(other.to_string()),
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, Outcome::Confirmed)
    }
}

#[derive(Serialize)]
struct SubmitRequest<'a> {
    #[serde(rename = "attendanceId")]
    attendance_id: &'a str,
    #[serde(rename = "isMeetingStarted")]
    is_meeting_started: bool,
    #[serde(rename = "StuID")]
    student_id: &'a str,
    #[serde(rename = "offQrCdEnbld")]
    off_qr_code_enabled: bool,
    latitude: &'a str,
    longitude: &'a str,
    accuracy: &'a str,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    output: Option<SubmitOutput>,
}

#[derive(Debug, Deserialize)]
struct SubmitOutput {
    #[serde(default)]
    data: Option<SubmitData>,
}

#[derive(Debug, Deserialize)]
struct SubmitData {
    code: Option<String>,
}

fn classify(body: SubmitResponse) -> Result<Outcome, SubmitError> {
    let code = body
        .output
        .and_then(|output| output.data)
        .and_then(|data| data.code)
        .ok_or(SubmitError::MissingData)?;
    Ok(Outcome::from_code(&code))
}

impl CamuClient {
    /// Submit an attendance confirmation for one window.
    pub async fn submit_attendance(
        &self,
        session: &Session,
        window_id: &str,
    ) -> Result<Outcome, SubmitError> {
        tracing::info!("Submitting attendance for window {}", window_id);

        let started = Instant::now();
        let response = self
            .http()
            .post(ATTENDANCE_URL)
            .header(reqwest::header::COOKIE, session.cookie_header())
            .json(&SubmitRequest {
                attendance_id: window_id,
                is_meeting_started: true,
                student_id: self.student_id(),
                off_qr_code_enabled: true,
                latitude: CAMPUS_LATITUDE,
                longitude: CAMPUS_LONGITUDE,
                accuracy: GPS_ACCURACY,
            })
            .send()
            .await?;

        let status = response.status();
        tracing::info!("Attendance response {} after {:.2?}", status, started.elapsed());

        if !status.is_success() {
            return Err(SubmitError::Status(status));
        }

        let body: SubmitResponse = response.json().await.map_err(SubmitError::Decode)?;
        let outcome = classify(body)?;
        if let Outcome::Unknown(code) = &outcome {
            tracing::warn!("Unexpected attendance response code: {}", code);
        }
        Ok(outcome)
    }
}
