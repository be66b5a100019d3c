use std::env;
use std::time::Duration;

use chrono::NaiveDate;
use clap::Parser;

// Account the watcher was built for; override with CAMU_EMAIL / CAMU_PASSWORD.
const DEFAULT_EMAIL: &str = "E23CSEU1838@bennett.edu.in";
const DEFAULT_PASSWORD: &str = "JeGjnF2f";

/// The ERP keys attendance to this internal student record, not to the
/// login email.
const STUDENT_ID: &str = "668c1a15b26adcc7e79eb354";

#[derive(Debug, Parser)]
#[command(
    name = "attendance-poller",
    about = "Watches the Camu timetable and confirms attendance windows as they open"
)]
pub struct Cli {
    /// Seconds between timetable polls
    #[arg(long, default_value_t = 1)]
    pub interval_secs: u64,

    /// Minimum seconds between submit attempts for the same window
    #[arg(long, default_value_t = 30)]
    pub cooldown_secs: u64,

    /// Session age in seconds after which it is proactively refreshed
    #[arg(long, default_value_t = 30 * 60)]
    pub session_max_age_secs: u64,

    /// Query this date (YYYY-MM-DD) instead of today in Asia/Kolkata
    #[arg(long)]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub email: String,
    pub password: String,
    pub student_id: String,
    pub poll_interval: Duration,
    pub retry_cooldown: Duration,
    pub session_max_age: Duration,
    pub date_override: Option<NaiveDate>,
}

impl Config {
    pub fn from_env(cli: Cli) -> Self {
        Self {
            email: env::var("CAMU_EMAIL").unwrap_or_else(|_| DEFAULT_EMAIL.to_string()),
            password: env::var("CAMU_PASSWORD").unwrap_or_else(|_| DEFAULT_PASSWORD.to_string()),
            student_id: STUDENT_ID.to_string(),
            poll_interval: Duration::from_secs(cli.interval_secs),
            retry_cooldown: Duration::from_secs(cli.cooldown_secs),
            session_max_age: Duration::from_secs(cli.session_max_age_secs),
            date_override: cli.date,
        }
    }
}
