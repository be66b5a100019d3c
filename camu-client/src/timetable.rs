//! Timetable query and attendance-window extraction.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::client::CamuClient;
use crate::error::FetchError;
use crate::session::Session;

const TIMETABLE_URL: &str = "https://student.bennetterp.camu.in/api/Timetable/get";

/// Enrollment context the timetable endpoint insists on receiving back.
/// These mirror the profile the ERP hands the browser at login; the
/// endpoint rejects queries without them.
mod enrollment {
    pub const PROGRAM_NAME: &str = "Undergraduate";
    pub const SEMESTER_ID: &str = "6674080baa6e1fcb4aedb235";
    pub const SEMESTER_NAME: &str = "Semester - 5";
    pub const ACADEMIC_YEAR_NAME: &str = "2025-2026";
    pub const ACADEMIC_YEAR_TO: &str = "2026-06-30";
    pub const ACADEMIC_YEAR_FROM: &str = "2025-07-01";
    pub const DEPARTMENT_CODE: &str = "SCSET";
    pub const DEPARTMENT_NAME: &str = "School of Computer Science Engineering & Technology";
    pub const COURSE_CODE: &str = "B.Tech.(CSE)";
    pub const COURSE_NAME: &str = "Bachelor of Technology (Computer Science and Engineering)";
    pub const INSTITUTION_NAME: &str = "Bennett University";
    pub const PROGRAM_RECORD_ID: &str = "68862ad42fda3dbda69264ed";
    pub const PROGRESSION_DATE: &str = "2025-07-27T13:34:12.793Z";
    pub const RECORD_TOUCHED_AT: &str = "2025-07-27T13:34:12.795Z";
    pub const ACADEMIC_YEAR_ID: &str = "669291a9e22fa158b82ea968";
    pub const DEPARTMENT_ID: &str = "666471d086b084b1cb33e4dc";
    pub const COURSE_ID: &str = "666473aae88943d812522d92";
    pub const PROGRAM_ID: &str = "6664712a86b084b1cb33e4b2";
    pub const INSTITUTION_ID: &str = "663474b11dd0e9412a1f793f";
    pub const FIRST_NAME: &str = "KUNTI SRUJAN";
    pub const LAST_NAME: &str = "TEJA";
    pub const APPLICATION_NUMBER: &str = "E23CSEU1838";
    pub const CONTACT_EMAIL: &str = "E23CSEU1838@bennett.edu.in";
}

/// Request body for `/api/Timetable/get`. Field names are dictated by the
/// ERP; `start` and `end` are both the query date.
#[derive(Debug, Serialize)]
struct TimetableQuery<'a> {
    #[serde(rename = "PrName")]
    program_name: &'a str,
    #[serde(rename = "SemID")]
    semester_id: &'a str,
    #[serde(rename = "SemName")]
    semester_name: &'a str,
    #[serde(rename = "AcYrNm")]
    academic_year_name: &'a str,
    #[serde(rename = "AcyrToDt")]
    academic_year_to: &'a str,
    #[serde(rename = "AcyrFrDt")]
    academic_year_from: &'a str,
    #[serde(rename = "DeptCode")]
    department_code: &'a str,
    #[serde(rename = "DepName")]
    department_name: &'a str,
    #[serde(rename = "CrCode")]
    course_code: &'a str,
    #[serde(rename = "CrName")]
    course_name: &'a str,
    #[serde(rename = "InName")]
    institution_name: &'a str,
    #[serde(rename = "CmProgID")]
    program_record_id: &'a str,
    #[serde(rename = "_id")]
    record_id: &'a str,
    #[serde(rename = "stustatus")]
    student_status: &'a str,
    #[serde(rename = "progstdt")]
    progression_date: &'a str,
    #[serde(rename = "StuID")]
    student_id: &'a str,
    #[serde(rename = "semRstd")]
    semester_registered: &'a str,
    #[serde(rename = "AcYr")]
    academic_year_id: &'a str,
    #[serde(rename = "DeptID")]
    department_id: &'a str,
    #[serde(rename = "CrID")]
    course_id: &'a str,
    #[serde(rename = "PrID")]
    program_id: &'a str,
    #[serde(rename = "InId")]
    institution_id: &'a str,
    #[serde(rename = "OID")]
    organization_id: &'a str,
    #[serde(rename = "__v")]
    version: u32,
    #[serde(rename = "StFl")]
    status_flag: &'a str,
    #[serde(rename = "MoAt")]
    modified_at: &'a str,
    #[serde(rename = "CrAt")]
    created_at: &'a str,
    #[serde(rename = "isFE")]
    is_frontend: bool,
    #[serde(rename = "BP")]
    bp: &'a str,
    lang_code: &'a str,
    #[serde(rename = "studStsNm")]
    student_status_name: &'a str,
    #[serde(rename = "studSts")]
    student_status_code: &'a str,
    #[serde(rename = "FNa")]
    first_name: &'a str,
    #[serde(rename = "LNa")]
    last_name: &'a str,
    #[serde(rename = "AplnNum")]
    application_number: &'a str,
    #[serde(rename = "CnEmail")]
    contact_email: &'a str,
    #[serde(rename = "enableV2")]
    enable_v2: bool,
    start: String,
    end: String,
    #[serde(rename = "schdlTyp")]
    schedule_type: &'a str,
    #[serde(rename = "isShowCancelledPeriod")]
    show_cancelled_periods: bool,
    #[serde(rename = "isFromTt")]
    from_timetable: bool,
}

impl<'a> TimetableQuery<'a> {
    fn for_date(student_id: &'a str, date: NaiveDate) -> Self {
        let day = date.format("%Y-%m-%d").to_string();
        Self {
            program_name: enrollment::PROGRAM_NAME,
            semester_id: enrollment::SEMESTER_ID,
            semester_name: enrollment::SEMESTER_NAME,
            academic_year_name: enrollment::ACADEMIC_YEAR_NAME,
            academic_year_to: enrollment::ACADEMIC_YEAR_TO,
            academic_year_from: enrollment::ACADEMIC_YEAR_FROM,
            department_code: enrollment::DEPARTMENT_CODE,
            department_name: enrollment::DEPARTMENT_NAME,
            course_code: enrollment::COURSE_CODE,
            course_name: enrollment::COURSE_NAME,
            institution_name: enrollment::INSTITUTION_NAME,
            program_record_id: enrollment::PROGRAM_RECORD_ID,
            record_id: enrollment::PROGRAM_RECORD_ID,
            student_status: "Progressed",
            progression_date: enrollment::PROGRESSION_DATE,
            student_id,
            semester_registered: enrollment::SEMESTER_ID,
            academic_year_id: enrollment::ACADEMIC_YEAR_ID,
            department_id: enrollment::DEPARTMENT_ID,
            course_id: enrollment::COURSE_ID,
            program_id: enrollment::PROGRAM_ID,
            institution_id: enrollment::INSTITUTION_ID,
            organization_id: enrollment::INSTITUTION_ID,
            version: 0,
            status_flag: "A",
            modified_at: enrollment::RECORD_TOUCHED_AT,
            created_at: enrollment::RECORD_TOUCHED_AT,
            is_frontend: true,
            bp: "N",
            lang_code: enrollment::INSTITUTION_ID,
            student_status_name: "Active",
            student_status_code: "A",
            first_name: enrollment::FIRST_NAME,
            last_name: enrollment::LAST_NAME,
            application_number: enrollment::APPLICATION_NUMBER,
            contact_email: enrollment::CONTACT_EMAIL,
            enable_v2: true,
            start: day.clone(),
            end: day,
            schedule_type: "slctdSchdl",
            show_cancelled_periods: true,
            from_timetable: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TimetableResponse {
    #[serde(default)]
    output: Option<TimetableOutput>,
}

#[derive(Debug, Deserialize)]
struct TimetableOutput {
    /// `null` when the ERP has nothing scheduled; that is "no data", not
    /// an error.
    #[serde(default)]
    data: Option<Vec<Day>>,
}

#[derive(Debug, Deserialize)]
struct Day {
    #[serde(rename = "Periods", default)]
    periods: Vec<Period>,
}

#[derive(Debug, Deserialize)]
struct Period {
    #[serde(rename = "attendanceId")]
    attendance_id: Option<String>,
    #[serde(rename = "isAttendanceSaved", default)]
    attendance_saved: bool,
    #[serde(rename = "SubNa")]
    subject: Option<String>,
    #[serde(rename = "StaffNm")]
    faculty: Option<String>,
    #[serde(rename = "FrTime")]
    from_time: Option<String>,
    end: Option<String>,
}

/// A time-bounded opportunity to confirm attendance, keyed by the
/// upstream identifier.
#[derive(Debug, Clone)]
pub struct AttendanceWindow {
    pub id: String,
    pub subject: String,
    pub faculty: String,
    pub starts_at: String,
    pub ends_at: Option<String>,
    /// The institution has already recorded this one; confirming it again
    /// is unnecessary.
    pub already_recorded: bool,
}

/// Flatten days into the periods that actually carry an attendance
/// identifier, preserving document order.
fn collect_windows(body: TimetableResponse) -> Vec<AttendanceWindow> {
    let days = body
        .output
        .and_then(|output| output.data)
        .unwrap_or_default();

    days.into_iter()
        .flat_map(|day| day.periods)
        .filter_map(|period| {
            let id = period.attendance_id?;
            Some(AttendanceWindow {
                id,
                subject: period.subject.unwrap_or_else(|| "Unknown Subject".to_string()),
                faculty: period.faculty.unwrap_or_else(|| "Unknown Faculty".to_string()),
                starts_at: period.from_time.unwrap_or_else(|| "Unknown".to_string()),
                ends_at: period.end,
                already_recorded: period.attendance_saved,
            })
        })
        .collect()
}

impl CamuClient {
    /// Fetch the timetable for `date` and return its attendance windows.
    ///
    /// An empty result means nothing is open right now. Transport and
    /// decode failures are transient from the caller's point of view.
    pub async fn fetch_timetable(
        &self,
        session: &Session,
        date: NaiveDate,
    ) -> Result<Vec<AttendanceWindow>, FetchError> {
        let response = self
            .http()
            .post(TIMETABLE_URL)
            .header(reqwest::header::COOKIE, session.cookie_header())
            .header("appversion", "v2")
            .header("clienttzofst", "330")
            .json(&TimetableQuery::for_date(self.student_id(), date))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }

        let body: TimetableResponse = response.json().await.map_err(FetchError::Decode)?;
        let windows = collect_windows(body);

        if windows.is_empty() {
            tracing::debug!("No active attendance sessions found");
        }
        for window in &windows {
            tracing::info!(
                "Found attendance window {} for {} with {} at {} ({})",
                window.id,
                window.subject,
                window.faculty,
                window.starts_at,
                if window.already_recorded { "already submitted" } else { "not submitted" },
            );
        }

        Ok(windows)
    }
}
