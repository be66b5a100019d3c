//! The polling loop: session refresh, window dedup, and submit cooldown.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{NaiveDate, Utc};

use camu_client::{
    AttendanceWindow, AuthError, CamuClient, Credentials, FetchError, Outcome, Session,
    SubmitError,
};

use crate::config::Config;

/// What the watcher needs from the ERP. `CamuClient` is the production
/// implementation; tests drive the loop with a scripted stub.
pub trait ErpApi {
    async fn login(&self, credentials: &Credentials) -> Result<Session, AuthError>;

    async fn fetch_windows(
        &self,
        session: &Session,
        date: NaiveDate,
    ) -> Result<Vec<AttendanceWindow>, FetchError>;

    async fn submit(&self, session: &Session, window_id: &str) -> Result<Outcome, SubmitError>;
}

impl ErpApi for CamuClient {
    async fn login(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        CamuClient::login(self, credentials).await
    }

    async fn fetch_windows(
        &self,
        session: &Session,
        date: NaiveDate,
    ) -> Result<Vec<AttendanceWindow>, FetchError> {
        self.fetch_timetable(session, date).await
    }

    async fn submit(&self, session: &Session, window_id: &str) -> Result<Outcome, SubmitError> {
        self.submit_attendance(session, window_id).await
    }
}

/// Tracks the last submit attempt per window to enforce the retry
/// cooldown.
pub struct AttemptTracker {
    last_attempt: HashMap<String, Instant>,
}

impl AttemptTracker {
    pub fn new() -> Self {
        Self {
            last_attempt: HashMap::new(),
        }
    }

    /// Check if enough time has passed since the last attempt.
    pub fn can_attempt(&self, window_id: &str, cooldown: Duration) -> bool {
        match self.last_attempt.get(window_id) {
            Some(last) => last.elapsed() >= cooldown,
            None => true,
        }
    }

    /// Record that we just attempted this window.
    pub fn record_attempt(&mut self, window_id: &str) {
        self.last_attempt
            .insert(window_id.to_string(), Instant::now());
    }

    /// Seconds until the next allowed attempt.
    pub fn seconds_until_allowed(&self, window_id: &str, cooldown: Duration) -> u64 {
        match self.last_attempt.get(window_id) {
            Some(last) => cooldown.as_secs().saturating_sub(last.elapsed().as_secs()),
            None => 0,
        }
    }
}

impl Default for AttemptTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Windows confirmed by us or already recorded upstream. Grows for the
/// process lifetime; a day has a bounded number of windows.
pub struct ConfirmedWindows {
    ids: HashSet<String>,
}

impl ConfirmedWindows {
    pub fn new() -> Self {
        Self {
            ids: HashSet::new(),
        }
    }

    pub fn contains(&self, window_id: &str) -> bool {
        self.ids.contains(window_id)
    }

    pub fn insert(&mut self, window_id: &str) {
        self.ids.insert(window_id.to_string());
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

impl Default for ConfirmedWindows {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the session and the dedup state, and runs one poll cycle at a
/// time. The caller drives the cadence and shutdown.
pub struct Watcher<A> {
    api: A,
    credentials: Credentials,
    session: Session,
    confirmed: ConfirmedWindows,
    attempts: AttemptTracker,
    retry_cooldown: Duration,
    session_max_age: Duration,
    date_override: Option<NaiveDate>,
    cycles: u64,
}

impl<A: ErpApi> Watcher<A> {
    pub fn new(api: A, session: Session, config: &Config) -> Self {
        Self {
            api,
            credentials: Credentials {
                email: config.email.clone(),
                password: config.password.clone(),
            },
            session,
            confirmed: ConfirmedWindows::new(),
            attempts: AttemptTracker::new(),
            retry_cooldown: config.retry_cooldown,
            session_max_age: config.session_max_age,
            date_override: config.date_override,
            cycles: 0,
        }
    }

    #[cfg(test)]
    fn session_token(&self) -> &str {
        self.session.token()
    }

    #[cfg(test)]
    fn is_confirmed(&self, window_id: &str) -> bool {
        self.confirmed.contains(window_id)
    }

    /// One poll cycle: refresh the session if stale, fetch today's
    /// windows, and handle each one. A fetch failure is returned so the
    /// caller can log it and back off; nothing else escapes.
    pub async fn run_cycle(&mut self) -> Result<()> {
        self.cycles += 1;
        self.refresh_session_if_stale().await;

        let date = self.query_date();
        tracing::debug!(
            "Cycle #{}: checking timetable for {} ({} windows confirmed so far)",
            self.cycles,
            date,
            self.confirmed.len()
        );

        let windows = self.api.fetch_windows(&self.session, date).await?;
        for window in &windows {
            self.handle_window(window).await;
        }

        Ok(())
    }

    /// Best-effort refresh: a failure keeps the existing session, on the
    /// chance it still works, rather than killing the watcher.
    async fn refresh_session_if_stale(&mut self) {
        if !self.session.is_stale(self.session_max_age) {
            return;
        }

        tracing::info!(
            "Session is {}s old, refreshing",
            self.session.age().as_secs()
        );
        match self.api.login(&self.credentials).await {
            Ok(fresh) => {
                tracing::info!("Session refreshed, now {}", fresh.redacted());
                self.session = fresh;
            }
            Err(e) => {
                tracing::warn!("Session refresh failed, keeping existing session: {}", e);
            }
        }
    }

    async fn handle_window(&mut self, window: &AttendanceWindow) {
        if self.confirmed.contains(&window.id) {
            return;
        }

        if window.already_recorded {
            tracing::info!(
                "Attendance for {} with {} was already submitted",
                window.subject,
                window.faculty
            );
            self.confirmed.insert(&window.id);
            return;
        }

        if !self.attempts.can_attempt(&window.id, self.retry_cooldown) {
            tracing::debug!(
                "Window {} in cooldown for another {}s",
                window.id,
                self.attempts
                    .seconds_until_allowed(&window.id, self.retry_cooldown)
            );
            return;
        }

        tracing::info!(
            "Active attendance window for {} with {} at {}",
            window.subject,
            window.faculty,
            window.starts_at
        );

        let outcome = self.api.submit(&self.session, &window.id).await;
        self.attempts.record_attempt(&window.id);

        match outcome {
            Ok(Outcome::Confirmed) => {
                tracing::info!("Attendance marked for {}", window.subject);
                self.confirmed.insert(&window.id);
            }
            Ok(Outcome::NotYetValid) => {
                tracing::info!(
                    "Window for {} not open yet, retrying after cooldown",
                    window.subject
                );
            }
            Ok(Outcome::Unknown(code)) => {
                tracing::warn!(
                    "Unexpected response code {} for {}, will retry",
                    code,
                    window.subject
                );
            }
            Err(e) => {
                tracing::error!("Failed to mark attendance for {}: {}", window.subject, e);
            }
        }
    }

    fn query_date(&self) -> NaiveDate {
        self.date_override.unwrap_or_else(|| {
            Utc::now().with_timezone(&chrono_tz::Asia::Kolkata).date_naive()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted ERP double: queued fetch/submit/login results, plus call
    /// logs for the spy assertions.
    #[derive(Default)]
    struct StubApi {
        fetch_results: Mutex<VecDeque<Result<Vec<AttendanceWindow>, FetchError>>>,
        submit_results: Mutex<VecDeque<Result<Outcome, SubmitError>>>,
        login_results: Mutex<VecDeque<Result<Session, AuthError>>>,
        submit_calls: Mutex<Vec<String>>,
        login_calls: Mutex<usize>,
    }

    impl StubApi {
        fn queue_fetch(&self, result: Result<Vec<AttendanceWindow>, FetchError>) {
            self.fetch_results.lock().unwrap().push_back(result);
        }

        fn queue_submit(&self, result: Result<Outcome, SubmitError>) {
            self.submit_results.lock().unwrap().push_back(result);
        }

        fn queue_login(&self, result: Result<Session, AuthError>) {
            self.login_results.lock().unwrap().push_back(result);
        }

        fn submit_calls(&self) -> Vec<String> {
            self.submit_calls.lock().unwrap().clone()
        }

        fn login_calls(&self) -> usize {
            *self.login_calls.lock().unwrap()
        }
    }

    impl ErpApi for &StubApi {
        async fn login(&self, _credentials: &Credentials) -> Result<Session, AuthError> {
            *self.login_calls.lock().unwrap() += 1;
            self.login_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Session::new("stub-session")))
        }

        async fn fetch_windows(
            &self,
            _session: &Session,
            _date: NaiveDate,
        ) -> Result<Vec<AttendanceWindow>, FetchError> {
            self.fetch_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(vec![]))
        }

        async fn submit(
            &self,
            _session: &Session,
            window_id: &str,
        ) -> Result<Outcome, SubmitError> {
            self.submit_calls.lock().unwrap().push(window_id.to_string());
            self.submit_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(Outcome::Confirmed))
        }
    }

    fn window(id: &str, already_recorded: bool) -> AttendanceWindow {
        AttendanceWindow {
            id: id.to_string(),
            subject: "Operating Systems".to_string(),
            faculty: "Dr. Rao".to_string(),
            starts_at: "09:00 AM".to_string(),
            ends_at: None,
            already_recorded,
        }
    }

    fn config(cooldown_secs: u64) -> Config {
        Config {
            email: "student@example.edu".to_string(),
            password: "hunter2".to_string(),
            student_id: "stu-1".to_string(),
            poll_interval: Duration::from_secs(1),
            retry_cooldown: Duration::from_secs(cooldown_secs),
            session_max_age: Duration::from_secs(30 * 60),
            date_override: NaiveDate::from_ymd_opt(2025, 8, 7),
        }
    }

    fn watcher<'a>(api: &'a StubApi, config: &Config) -> Watcher<&'a StubApi> {
        Watcher::new(api, Session::new("initial-token"), config)
    }

    #[tokio::test]
    async fn already_recorded_windows_confirm_without_submitting() {
        let api = StubApi::default();
        api.queue_fetch(Ok(vec![window("att-1", true)]));

        let mut watcher = watcher(&api, &config(30));
        watcher.run_cycle().await.unwrap();

        assert!(watcher.is_confirmed("att-1"));
        assert!(api.submit_calls().is_empty());
    }

    #[tokio::test]
    async fn confirmed_window_is_not_submitted_again() {
        let api = StubApi::default();
        api.queue_fetch(Ok(vec![window("att-1", false)]));
        api.queue_fetch(Ok(vec![window("att-1", false)]));
        api.queue_submit(Ok(Outcome::Confirmed));

        let mut watcher = watcher(&api, &config(30));
        watcher.run_cycle().await.unwrap();
        assert!(watcher.is_confirmed("att-1"));

        watcher.run_cycle().await.unwrap();
        assert_eq!(api.submit_calls(), ["att-1"]);
    }

    #[tokio::test]
    async fn cooldown_blocks_immediate_resubmission() {
        let api = StubApi::default();
        api.queue_fetch(Ok(vec![window("att-1", false)]));
        api.queue_fetch(Ok(vec![window("att-1", false)]));
        api.queue_submit(Ok(Outcome::NotYetValid));
        api.queue_submit(Ok(Outcome::Confirmed));

        let mut watcher = watcher(&api, &config(30));
        watcher.run_cycle().await.unwrap();
        watcher.run_cycle().await.unwrap();

        // Second cycle lands inside the 30s cooldown.
        assert_eq!(api.submit_calls(), ["att-1"]);
        assert!(!watcher.is_confirmed("att-1"));
    }

    #[tokio::test]
    async fn expired_cooldown_allows_retry() {
        let api = StubApi::default();
        api.queue_fetch(Ok(vec![window("att-1", false)]));
        api.queue_fetch(Ok(vec![window("att-1", false)]));
        api.queue_submit(Ok(Outcome::NotYetValid));
        api.queue_submit(Ok(Outcome::Confirmed));

        let mut watcher = watcher(&api, &config(0));
        watcher.run_cycle().await.unwrap();
        watcher.run_cycle().await.unwrap();

        assert_eq!(api.submit_calls(), ["att-1", "att-1"]);
        assert!(watcher.is_confirmed("att-1"));
    }

    #[tokio::test]
    async fn submit_transport_failure_still_starts_the_cooldown() {
        let api = StubApi::default();
        api.queue_fetch(Ok(vec![window("att-1", false)]));
        api.queue_fetch(Ok(vec![window("att-1", false)]));
        api.queue_submit(Err(SubmitError::MissingData));

        let mut watcher = watcher(&api, &config(30));
        watcher.run_cycle().await.unwrap();
        watcher.run_cycle().await.unwrap();

        assert_eq!(api.submit_calls(), ["att-1"]);
        assert!(!watcher.is_confirmed("att-1"));
    }

    #[tokio::test]
    async fn unknown_outcome_is_not_treated_as_success() {
        let api = StubApi::default();
        api.queue_fetch(Ok(vec![window("att-1", false)]));
        api.queue_fetch(Ok(vec![window("att-1", false)]));
        api.queue_submit(Ok(Outcome::Unknown("MEETING_ENDED".to_string())));
        api.queue_submit(Ok(Outcome::Confirmed));

        let mut watcher = watcher(&api, &config(0));
        watcher.run_cycle().await.unwrap();
        assert!(!watcher.is_confirmed("att-1"));

        watcher.run_cycle().await.unwrap();
        assert_eq!(api.submit_calls().len(), 2);
        assert!(watcher.is_confirmed("att-1"));
    }

    #[tokio::test]
    async fn empty_timetable_submits_nothing() {
        let api = StubApi::default();
        api.queue_fetch(Ok(vec![]));

        let mut watcher = watcher(&api, &config(30));
        watcher.run_cycle().await.unwrap();

        assert!(api.submit_calls().is_empty());
    }

    #[tokio::test]
    async fn fetch_error_is_transient_and_leaves_state_untouched() {
        let api = StubApi::default();
        api.queue_fetch(Err(FetchError::Status(
            reqwest::StatusCode::BAD_GATEWAY,
        )));
        api.queue_fetch(Ok(vec![window("att-1", false)]));

        let mut watcher = watcher(&api, &config(30));
        assert!(watcher.run_cycle().await.is_err());
        assert!(api.submit_calls().is_empty());

        // The next cycle proceeds normally.
        watcher.run_cycle().await.unwrap();
        assert_eq!(api.submit_calls(), ["att-1"]);
    }

    #[tokio::test]
    async fn stale_session_is_refreshed_before_fetching() {
        let api = StubApi::default();
        api.queue_login(Ok(Session::new("fresh-token")));

        let mut config = config(30);
        config.session_max_age = Duration::ZERO;

        let mut watcher = watcher(&api, &config);
        watcher.run_cycle().await.unwrap();

        assert_eq!(api.login_calls(), 1);
        assert_eq!(watcher.session_token(), "fresh-token");
    }

    #[tokio::test]
    async fn failed_refresh_keeps_the_existing_session() {
        let api = StubApi::default();
        api.queue_login(Err(AuthError::MissingSessionCookie));
        api.queue_fetch(Ok(vec![window("att-1", false)]));

        let mut config = config(30);
        config.session_max_age = Duration::ZERO;

        let mut watcher = watcher(&api, &config);
        watcher.run_cycle().await.unwrap();

        assert_eq!(api.login_calls(), 1);
        assert_eq!(watcher.session_token(), "initial-token");
        // The cycle still ran with the old session.
        assert_eq!(api.submit_calls(), ["att-1"]);
    }

    #[tokio::test]
    async fn fresh_session_is_not_refreshed() {
        let api = StubApi::default();
        api.queue_fetch(Ok(vec![]));

        let mut watcher = watcher(&api, &config(30));
        watcher.run_cycle().await.unwrap();

        assert_eq!(api.login_calls(), 0);
    }

    #[test]
    fn attempt_tracker_gates_by_cooldown() {
        let mut tracker = AttemptTracker::new();
        assert!(tracker.can_attempt("att-1", Duration::from_secs(30)));
        assert_eq!(
            tracker.seconds_until_allowed("att-1", Duration::from_secs(30)),
            0
        );

        tracker.record_attempt("att-1");
        assert!(!tracker.can_attempt("att-1", Duration::from_secs(30)));
        assert!(tracker.seconds_until_allowed("att-1", Duration::from_secs(30)) > 0);

        // Zero cooldown means an immediate retry is allowed.
        assert!(tracker.can_attempt("att-1", Duration::ZERO));
        // Other windows are unaffected.
        assert!(tracker.can_attempt("att-2", Duration::from_secs(30)));
    }

    #[test]
    fn confirmed_windows_dedup_by_id() {
        let mut confirmed = ConfirmedWindows::new();
        assert_eq!(confirmed.len(), 0);

        confirmed.insert("att-1");
        confirmed.insert("att-1");
        assert!(confirmed.contains("att-1"));
        assert!(!confirmed.contains("att-2"));
        assert_eq!(confirmed.len(), 1);
    }
}
