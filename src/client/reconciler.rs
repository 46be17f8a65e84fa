// src/client/reconciler.rs

use std::time::Duration;

use tokio::{
    sync::mpsc,
    time::{Instant, MissedTickBehavior, interval, interval_at},
};

use crate::{
    catalog::Catalog,
    models::{
        response::ResponseSubmission,
        session::{AdvanceRequest, StartResponse, StatusResponse},
    },
};

use super::{
    api::{ClientError, SessionApi},
    timer::{AdvanceReason, TimerView},
};

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const COUNTDOWN_INTERVAL: Duration = Duration::from_secs(1);

/// Input from the test-taker while a session runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// Replaces the typed answer of the current question.
    Answer(String),
    /// Submit the current question now.
    ForceNext,
}

/// What a finished run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub user_id: String,
    /// Advance calls that reached the server.
    pub advances: usize,
    /// Of those, how many were triggered by a deadline.
    pub auto_submitted: usize,
}

/// Drives one session from start to completion on a single task.
///
/// A poll tick reconciles the countdowns with the server, a countdown tick
/// runs the question timer locally, and manual commands arrive on a channel.
/// All three end up in `advance`, gated by the view's one-shot trigger. It
/// saves the answer once per question, then moves on; the advance request
/// carries the position being left so the server can absorb a duplicate that
/// still gets through.
pub struct Reconciler<A> {
    api: A,
    catalog: Catalog,
    user_id: String,
    section_key: String,
    question_index: usize,
    question_started: Instant,
    draft: String,
    answer_saved: bool,
    view: TimerView,
    poll_interval: Duration,
    countdown_interval: Duration,
    summary: RunSummary,
}

impl<A: SessionApi> Reconciler<A> {
    /// Fetches the catalog and starts a new session.
    pub async fn begin(api: A) -> Result<Self, ClientError> {
        let catalog = Catalog::try_from(api.config().await?)
            .map_err(|e| ClientError::UnexpectedResponse(e.to_string()))?;
        let started = api.start().await?;
        tracing::info!("Started session {}", started.user_id);
        Self::resume(api, catalog, started)
    }

    /// Builds a reconciler for an already started session.
    pub fn resume(api: A, catalog: Catalog, started: StartResponse) -> Result<Self, ClientError> {
        let mut reconciler = Self {
            api,
            catalog,
            user_id: started.user_id.clone(),
            section_key: String::new(),
            question_index: 0,
            question_started: Instant::now(),
            draft: String::new(),
            answer_saved: false,
            view: TimerView::new(),
            poll_interval: POLL_INTERVAL,
            countdown_interval: COUNTDOWN_INTERVAL,
            summary: RunSummary {
                user_id: started.user_id,
                ..RunSummary::default()
            },
        };
        reconciler.render(started.section_key, started.question_index)?;
        Ok(reconciler)
    }

    pub fn with_intervals(mut self, poll: Duration, countdown: Duration) -> Self {
        self.poll_interval = poll;
        self.countdown_interval = countdown;
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn view(&self) -> &TimerView {
        &self.view
    }

    /// Runs until the session completes.
    ///
    /// Transient failures are logged and retried on the next tick; `NotFound`
    /// and `InvalidState` end the run, meaning the assessment must restart.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<ClientCommand>,
    ) -> Result<RunSummary, ClientError> {
        let mut poll = interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut countdown = interval_at(
            Instant::now() + self.countdown_interval,
            self.countdown_interval,
        );
        countdown.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut commands_open = true;

        loop {
            let trigger = tokio::select! {
                _ = poll.tick() => match self.api.status(&self.user_id).await {
                    Ok(status) => {
                        if self.apply_status(&status)? {
                            return Ok(self.finish());
                        }
                        self.view.reconcile(status.total_remaining, status.section_remaining)
                    }
                    Err(e) if e.is_transient() => {
                        tracing::warn!("Status poll failed, retrying: {}", e);
                        None
                    }
                    Err(e) => return Err(e),
                },
                _ = countdown.tick() => {
                    let fired = self.view.tick();
                    tracing::debug!("{}", self.view.display());
                    fired
                },
                command = commands.recv(), if commands_open => match command {
                    Some(ClientCommand::Answer(text)) => {
                        self.draft = text;
                        None
                    }
                    Some(ClientCommand::ForceNext) => self.view.request_manual(),
                    None => {
                        commands_open = false;
                        None
                    }
                },
            };

            if let Some(reason) = trigger {
                if self.advance(reason).await? {
                    return Ok(self.finish());
                }
            }
        }
    }

    /// Saves the answer (once per question) and sends one advance. Returns
    /// true once the session is completed.
    async fn advance(&mut self, reason: AdvanceReason) -> Result<bool, ClientError> {
        if !self.answer_saved {
            match self.api.submit_response(&self.final_answer(reason)).await {
                Ok(_) => self.answer_saved = true,
                Err(e) if e.is_transient() => {
                    tracing::warn!("Saving answer failed, retrying on next tick: {}", e);
                    self.view.rearm();
                    return Ok(false);
                }
                Err(e) => {
                    // Rejected answers are not retried.
                    tracing::error!("Answer for {} was rejected: {}", self.question_id(), e);
                    self.answer_saved = true;
                }
            }
        }

        let request = AdvanceRequest {
            user_id: self.user_id.clone(),
            section_key: Some(self.section_key.clone()),
            question_index: Some(self.question_index),
        };

        match self.api.advance(&request).await {
            Ok(response) => {
                self.summary.advances += 1;
                if reason.is_auto() {
                    self.summary.auto_submitted += 1;
                }
                tracing::info!(
                    "Advanced from {}/{} ({:?})",
                    self.section_key,
                    self.question_index,
                    reason
                );
                if response.completed {
                    return Ok(true);
                }
                self.render(response.section_key, response.question_index)?;
                Ok(false)
            }
            Err(e) if e.is_transient() => {
                tracing::warn!("Advance failed, retrying on next tick: {}", e);
                self.view.rearm();
                Ok(false)
            }
            // A lost response may have hidden the completing advance.
            Err(ClientError::InvalidState(msg)) => match self.api.status(&self.user_id).await {
                Ok(status) if status.completed => Ok(true),
                Ok(_) => Err(ClientError::InvalidState(msg)),
                Err(e) if e.is_transient() => {
                    tracing::warn!("Status check after conflict failed, retrying: {}", e);
                    self.view.rearm();
                    Ok(false)
                }
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    /// `{section}-{n}`, numbered from 1.
    fn question_id(&self) -> String {
        format!("{}-{}", self.section_key, self.question_index + 1)
    }

    fn final_answer(&self, reason: AdvanceReason) -> ResponseSubmission {
        let elapsed = Instant::now().duration_since(self.question_started);
        ResponseSubmission {
            user_id: self.user_id.clone(),
            section: self.section_key.clone(),
            question_id: self.question_id(),
            response_type: "text".to_string(),
            response_data: (!self.draft.is_empty()).then(|| self.draft.clone()),
            time_taken_ms: i64::try_from(elapsed.as_millis()).ok(),
            auto_submitted: reason.is_auto(),
        }
    }

    /// Adopts the server's position when it differs from ours. Returns true
    /// if the session is completed.
    fn apply_status(&mut self, status: &StatusResponse) -> Result<bool, ClientError> {
        if status.completed {
            return Ok(true);
        }
        if status.section_key != self.section_key || status.question_index != self.question_index {
            tracing::info!(
                "Resynchronized to {}/{} from {}/{}",
                status.section_key,
                status.question_index,
                self.section_key,
                self.question_index
            );
            self.render(status.section_key.clone(), status.question_index)?;
        }
        Ok(false)
    }

    /// Shows a question: records the position, clears the answer and
    /// restarts its countdown.
    fn render(&mut self, section_key: String, question_index: usize) -> Result<(), ClientError> {
        let section = self.catalog.section_by_key(&section_key).ok_or_else(|| {
            ClientError::UnexpectedResponse(format!("unknown section '{}'", section_key))
        })?;
        self.view.begin_question(section.config.question_budget_seconds());
        self.section_key = section_key;
        self.question_index = question_index;
        self.question_started = Instant::now();
        self.draft.clear();
        self.answer_saved = false;
        Ok(())
    }

    fn finish(mut self) -> RunSummary {
        self.view.stop();
        tracing::info!("Session {} completed", self.user_id);
        self.summary
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::{
        catalog::{CatalogDocument, SectionConfig, SectionDescriptor},
        error::AppError,
        models::{
            response::ResponseAck,
            session::{AdvanceResponse, StatusResponse},
        },
        services::SessionService,
        store::SessionStore,
        utils::clock::Clock,
    };

    /// In-process server: the real session service on a clock that follows
    /// tokio's (paused) time.
    struct FakeApi {
        service: SessionService,
        clock: Clock,
        base: DateTime<Utc>,
        origin: Instant,
        advance_calls: AtomicUsize,
        fail_advances: AtomicUsize,
        lose_advance_responses: AtomicUsize,
        /// Status calls that fail, armed by a conflicting advance.
        status_blips_after_conflict: AtomicUsize,
        failing_statuses: AtomicUsize,
        fail_submissions: AtomicUsize,
        positions: Mutex<Vec<(String, usize)>>,
        answers: Mutex<Vec<ResponseSubmission>>,
    }

    impl FakeApi {
        fn new(catalog: Catalog) -> Arc<Self> {
            let base = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
            let clock = Clock::manual(base);
            Arc::new(Self {
                service: SessionService::new(
                    Arc::new(SessionStore::new()),
                    Arc::new(catalog),
                    clock.clone(),
                ),
                clock,
                base,
                origin: Instant::now(),
                advance_calls: AtomicUsize::new(0),
                fail_advances: AtomicUsize::new(0),
                lose_advance_responses: AtomicUsize::new(0),
                status_blips_after_conflict: AtomicUsize::new(0),
                failing_statuses: AtomicUsize::new(0),
                fail_submissions: AtomicUsize::new(0),
                positions: Mutex::new(Vec::new()),
                answers: Mutex::new(Vec::new()),
            })
        }

        fn sync_clock(&self) {
            let elapsed = chrono::Duration::from_std(Instant::now() - self.origin).unwrap();
            self.clock.set(self.base + elapsed);
        }
    }

    fn to_client(err: AppError) -> ClientError {
        match err {
            AppError::NotFound(msg) => ClientError::NotFound(msg),
            AppError::InvalidState(msg) => ClientError::InvalidState(msg),
            other => ClientError::UnexpectedResponse(other.to_string()),
        }
    }

    fn take_one(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    #[async_trait]
    impl SessionApi for Arc<FakeApi> {
        async fn config(&self) -> Result<CatalogDocument, ClientError> {
            Ok(CatalogDocument::from(self.service.catalog()))
        }

        async fn start(&self) -> Result<StartResponse, ClientError> {
            self.sync_clock();
            let record = self.service.create_session().map_err(to_client)?;
            Ok(StartResponse::from_record(&record, self.service.catalog()))
        }

        async fn status(&self, user_id: &str) -> Result<StatusResponse, ClientError> {
            self.sync_clock();
            if take_one(&self.failing_statuses) {
                return Err(ClientError::Transient("blip".to_string()));
            }
            let status = self.service.status(user_id).map_err(to_client)?;
            Ok(StatusResponse {
                now: status.now,
                section_key: status.record.section_key(self.service.catalog()).to_string(),
                section_remaining: status.remaining.section,
                total_remaining: status.remaining.total,
                section_started_at: status.record.section_started_at,
                question_index: status.record.question_index,
                completed: status.record.completed,
            })
        }

        async fn advance(&self, request: &AdvanceRequest) -> Result<AdvanceResponse, ClientError> {
            self.sync_clock();
            self.advance_calls.fetch_add(1, Ordering::SeqCst);
            if take_one(&self.fail_advances) {
                return Err(ClientError::Transient("connection reset".to_string()));
            }
            let outcome = match self
                .service
                .advance_session(&request.user_id, &request.expected_position())
            {
                Ok(outcome) => outcome,
                Err(AppError::InvalidState(msg)) => {
                    if take_one(&self.status_blips_after_conflict) {
                        self.failing_statuses.fetch_add(1, Ordering::SeqCst);
                    }
                    return Err(ClientError::InvalidState(msg));
                }
                Err(e) => return Err(to_client(e)),
            };
            if outcome.transition.is_some() {
                self.positions.lock().unwrap().push((
                    outcome.record.section_key(self.service.catalog()).to_string(),
                    outcome.record.question_index,
                ));
            }
            if take_one(&self.lose_advance_responses) {
                return Err(ClientError::Transient("response lost".to_string()));
            }
            Ok(AdvanceResponse::from_record(
                &outcome.record,
                self.service.catalog(),
            ))
        }

        async fn submit_response(
            &self,
            submission: &ResponseSubmission,
        ) -> Result<ResponseAck, ClientError> {
            if take_one(&self.fail_submissions) {
                return Err(ClientError::Transient("upload interrupted".to_string()));
            }
            let mut answers = self.answers.lock().unwrap();
            answers.push(submission.clone());
            Ok(ResponseAck {
                ok: true,
                id: answers.len() as i64,
                stored: submission.response_data.clone(),
            })
        }
    }

    fn section(key: &str, questions: u32, total: u64, per_question: Option<u64>) -> SectionDescriptor {
        SectionDescriptor {
            key: key.to_string(),
            config: SectionConfig {
                name: key.to_string(),
                question_count: questions,
                section_seconds: Some(total),
                per_question_seconds: per_question,
                view_seconds: None,
                type_seconds: None,
            },
        }
    }

    /// X: two 3 s questions in a 10 s section; Y: one question using the
    /// whole 4 s section.
    fn small_catalog() -> Catalog {
        Catalog::new(
            vec![section("X", 2, 10, Some(3)), section("Y", 1, 4, None)],
            60,
        )
        .unwrap()
    }

    fn transitions(api: &FakeApi) -> Vec<(String, usize)> {
        api.positions.lock().unwrap().clone()
    }

    fn saved_answers(api: &FakeApi) -> Vec<(String, bool)> {
        api.answers
            .lock()
            .unwrap()
            .iter()
            .map(|answer| (answer.question_id.clone(), answer.auto_submitted))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn unattended_run_advances_once_per_question() {
        let api = FakeApi::new(small_catalog());
        let (_tx, rx) = mpsc::channel(4);

        let reconciler = Reconciler::begin(api.clone()).await.unwrap();
        let summary = reconciler.run(rx).await.unwrap();

        assert_eq!(summary.advances, 3);
        assert_eq!(summary.auto_submitted, 3);
        assert_eq!(api.advance_calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            transitions(&api),
            vec![
                ("X".to_string(), 1),
                ("Y".to_string(), 0),
                ("Y".to_string(), 0)
            ]
        );
        assert_eq!(
            saved_answers(&api),
            vec![
                ("X-1".to_string(), true),
                ("X-2".to_string(), true),
                ("Y-1".to_string(), true)
            ]
        );
        let first = api.answers.lock().unwrap()[0].clone();
        assert_eq!(first.time_taken_ms, Some(3_000));
        assert_eq!(first.response_type, "text");
        assert_eq!(first.response_data, None);
        assert!(api.service.status(&summary.user_id).unwrap().record.completed);
    }

    #[tokio::test(start_paused = true)]
    async fn section_deadline_drains_remaining_questions() {
        // Questions allow 5 s each but the section only 2 s.
        let catalog = Catalog::new(
            vec![section("X", 3, 2, Some(5)), section("Y", 1, 30, None)],
            60,
        )
        .unwrap();
        let api = FakeApi::new(catalog);
        let (_tx, rx) = mpsc::channel(4);

        let reconciler = Reconciler::begin(api.clone()).await.unwrap();
        let user_id = reconciler.user_id().to_string();
        let run = tokio::spawn(reconciler.run(rx));

        tokio::time::sleep(Duration::from_millis(4_500)).await;
        let status = api.service.status(&user_id).unwrap();
        assert_eq!(status.record.section_index, 1);
        assert_eq!(transitions(&api).len(), 3);

        run.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_without_double_advancing() {
        let api = FakeApi::new(small_catalog());
        api.fail_advances.store(1, Ordering::SeqCst);
        api.lose_advance_responses.store(1, Ordering::SeqCst);
        api.fail_submissions.store(1, Ordering::SeqCst);
        let (_tx, rx) = mpsc::channel(4);

        let reconciler = Reconciler::begin(api.clone()).await.unwrap();
        let summary = reconciler.run(rx).await.unwrap();

        // One call failed before the server, one applied but its response was
        // lost; neither produced an extra transition or a second answer.
        assert_eq!(transitions(&api).len(), 3);
        assert_eq!(saved_answers(&api).len(), 3);
        assert!(api.advance_calls.load(Ordering::SeqCst) >= 4);
        assert!(api.service.status(&summary.user_id).unwrap().record.completed);
    }

    #[tokio::test(start_paused = true)]
    async fn force_next_advances_immediately() {
        let catalog = Catalog::new(vec![section("X", 2, 600, Some(300))], 600).unwrap();
        let api = FakeApi::new(catalog);
        let (tx, rx) = mpsc::channel(4);

        let reconciler = Reconciler::begin(api.clone()).await.unwrap();
        tx.send(ClientCommand::Answer("first answer".to_string()))
            .await
            .unwrap();
        tx.send(ClientCommand::ForceNext).await.unwrap();
        tx.send(ClientCommand::ForceNext).await.unwrap();

        let started = Instant::now();
        let summary = reconciler.run(rx).await.unwrap();

        assert!(Instant::now() - started < Duration::from_secs(5));
        assert_eq!(summary.advances, 2);
        assert_eq!(summary.auto_submitted, 0);

        let answers = api.answers.lock().unwrap().clone();
        assert_eq!(answers.len(), 2);
        assert_eq!(answers[0].response_data.as_deref(), Some("first answer"));
        assert_eq!(answers[1].response_data, None);
        assert!(answers.iter().all(|answer| !answer.auto_submitted));
    }

    #[tokio::test(start_paused = true)]
    async fn status_failure_after_conflict_is_retried() {
        // A single 3 s question; polls rarely so the countdown drives retries.
        let catalog = Catalog::new(vec![section("X", 1, 10, Some(3))], 60).unwrap();
        let api = FakeApi::new(catalog);
        api.lose_advance_responses.store(1, Ordering::SeqCst);
        api.status_blips_after_conflict.store(1, Ordering::SeqCst);
        let (_tx, rx) = mpsc::channel(4);

        let reconciler = Reconciler::begin(api.clone())
            .await
            .unwrap()
            .with_intervals(Duration::from_secs(30), Duration::from_secs(1));
        let result = reconciler.run(rx).await;

        // Completing advance applied, its response lost, the retry hit 409
        // and the status check behind it failed once.
        assert!(result.is_ok());
        assert_eq!(api.status_blips_after_conflict.load(Ordering::SeqCst), 0);
        assert_eq!(api.failing_statuses.load(Ordering::SeqCst), 0);
        assert_eq!(transitions(&api), vec![("X".to_string(), 0)]);
        assert_eq!(saved_answers(&api), vec![("X-1".to_string(), true)]);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_session_ends_the_run() {
        let api = FakeApi::new(small_catalog());
        let started = StartResponse {
            user_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            section_key: "X".to_string(),
            section_started_at: Utc::now(),
            question_index: 0,
        };
        let (_tx, rx) = mpsc::channel(4);

        let reconciler = Reconciler::resume(api.clone(), small_catalog(), started).unwrap();
        let result = reconciler.run(rx).await;

        assert!(matches!(result, Err(ClientError::NotFound(_))));
    }
}
