use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ORIGIN, REFERER};

/// Origin the ERP expects on every call.
pub(crate) const BASE_URL: &str = "https://student.bennetterp.camu.in";

const TIMETABLE_REFERER: &str = "https://student.bennetterp.camu.in/v2/timetable";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36";

/// A hung connection must not stall the watcher's 1 s polling cadence
/// indefinitely.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the Camu student ERP endpoints.
///
/// Holds one shared `reqwest::Client` plus the student identifier the
/// timetable and attendance calls both require. Endpoint methods live in
/// `session`, `timetable`, and `attendance`.
pub struct CamuClient {
    http: reqwest::Client,
    student_id: String,
}

impl CamuClient {
    pub fn new(student_id: impl Into<String>) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
        headers.insert(ORIGIN, HeaderValue::from_static(BASE_URL));
        headers.insert(REFERER, HeaderValue::from_static(TIMETABLE_REFERER));

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            student_id: student_id.into(),
        })
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn student_id(&self) -> &str {
        &self.student_id
    }
}
