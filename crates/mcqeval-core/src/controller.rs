//! Evaluation run controller.
//!
//! Owns the run lifecycle (`Idle → Running → {Completed, Stopped}`), drives
//! the sequential per-question loop, and exposes the pause/resume/stop/reset
//! triggers. At most one run is `Running` at any time.
//!
//! Pause and stop are cooperative: the loop only looks at them between
//! questions, so an answer-service call that is already in flight always
//! finishes.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::answer::{answer_token, build_prompt, error_raw_text, normalize_answer};
use crate::events::{AnswerEvent, EventPublisher, LifecycleEvent, ProgressEvent};
use crate::model::{Domain, Evaluation, Question};
use crate::traits::{AnswerService, QuestionStore, RecordOutcome};

/// Configuration for the run controller.
#[derive(Debug, Clone)]
pub struct RunControllerConfig {
    /// Questions drawn per domain by a quick run.
    pub quick_sample_size: usize,
    /// Upper bound on how long a paused loop sleeps before re-checking.
    pub pause_poll_interval: Duration,
}

impl Default for RunControllerConfig {
    fn default() -> Self {
        Self {
            quick_sample_size: 50,
            pause_poll_interval: Duration::from_millis(250),
        }
    }
}

/// Full sweep or bounded random sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    Full,
    Quick,
}

/// Controller lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Stopped,
}

/// How a run loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Completed,
    Stopped,
}

/// Response to `start` / `quick_start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum StartStatus {
    Started { run_id: Uuid },
    AlreadyRunning,
}

/// Response to `pause` / `resume` / `stop` / `reset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum ControlStatus {
    Paused,
    Resumed,
    Stopped,
    ResetComplete,
}

/// Description of a run, active or finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub id: Uuid,
    pub kind: RunKind,
    /// Domains in processing order.
    pub domains: Vec<Domain>,
    /// Questions resolved per domain so far.
    pub domain_counts: BTreeMap<Domain, usize>,
    pub started_at: DateTime<Utc>,
}

/// Point-in-time view of the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub state: RunState,
    pub paused: bool,
    /// The active run, or the most recent one.
    pub run: Option<RunInfo>,
}

/// What a finished run loop did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub kind: RunKind,
    pub outcome: RunOutcome,
    /// Questions sent to the answer service.
    pub processed: usize,
    /// Questions whose answer-service call failed.
    pub failed: usize,
    /// Malformed questions that were skipped.
    pub skipped: usize,
    pub duration_ms: u64,
}

/// Result of a start trigger.
#[derive(Debug)]
pub enum StartOutcome {
    Started(RunHandle),
    AlreadyRunning,
}

impl StartOutcome {
    pub fn status(&self) -> StartStatus {
        match self {
            StartOutcome::Started(handle) => StartStatus::Started { run_id: handle.id },
            StartOutcome::AlreadyRunning => StartStatus::AlreadyRunning,
        }
    }

    /// The run handle, if the run was accepted.
    pub fn into_handle(self) -> Option<RunHandle> {
        match self {
            StartOutcome::Started(handle) => Some(handle),
            StartOutcome::AlreadyRunning => None,
        }
    }
}

/// Handle to a spawned run loop.
#[derive(Debug)]
pub struct RunHandle {
    pub id: Uuid,
    pub kind: RunKind,
    join: JoinHandle<RunSummary>,
}

impl RunHandle {
    /// Wait for the run loop to exit.
    pub async fn join(self) -> anyhow::Result<RunSummary> {
        use anyhow::Context;
        self.join.await.context("run task failed")
    }
}

/// Cooperative signals for one run.
#[derive(Debug, Clone, Copy, Default)]
struct Control {
    paused: bool,
    stop: bool,
}

struct ActiveRun {
    info: RunInfo,
    control: watch::Sender<Control>,
}

struct Lifecycle {
    state: RunState,
    active: Option<ActiveRun>,
    last_run: Option<RunInfo>,
}

struct Shared {
    store: Arc<dyn QuestionStore>,
    service: Arc<dyn AnswerService>,
    publisher: EventPublisher,
    config: RunControllerConfig,
    lifecycle: Mutex<Lifecycle>,
}

/// The evaluation run controller.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct RunController {
    shared: Arc<Shared>,
}

impl RunController {
    pub fn new(
        store: Arc<dyn QuestionStore>,
        service: Arc<dyn AnswerService>,
        publisher: EventPublisher,
        config: RunControllerConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                service,
                publisher,
                config,
                lifecycle: Mutex::new(Lifecycle {
                    state: RunState::Idle,
                    active: None,
                    last_run: None,
                }),
            }),
        }
    }

    /// Publisher the controller emits progress events on.
    pub fn publisher(&self) -> &EventPublisher {
        &self.shared.publisher
    }

    /// Start a full sweep over every domain.
    pub fn start(&self) -> StartOutcome {
        self.begin(RunKind::Full)
    }

    /// Start a run over a random sample of each domain.
    pub fn quick_start(&self) -> StartOutcome {
        self.begin(RunKind::Quick)
    }

    /// Suspend the active run at its next checkpoint.
    pub fn pause(&self) -> ControlStatus {
        self.signal("pause", |c| c.paused = true);
        ControlStatus::Paused
    }

    pub fn resume(&self) -> ControlStatus {
        self.signal("resume", |c| c.paused = false);
        ControlStatus::Resumed
    }

    /// Ask the active run to stop at its next checkpoint.
    pub fn stop(&self) -> ControlStatus {
        self.signal("stop", |c| c.stop = true);
        ControlStatus::Stopped
    }

    /// Stop any active run and return to `Idle` immediately.
    ///
    /// Results already written stay in the store.
    pub fn reset(&self) -> ControlStatus {
        let shared = &self.shared;
        let mut lifecycle = shared.lock();
        if let Some(active) = lifecycle.active.take() {
            active.control.send_modify(|c| c.stop = true);
            tracing::info!(run_id = %active.info.id, "run reset");
            shared.publisher.publish(LifecycleEvent::Stopped);
            lifecycle.last_run = Some(active.info);
        }
        lifecycle.state = RunState::Idle;
        shared.publisher.publish(LifecycleEvent::Reset);
        ControlStatus::ResetComplete
    }

    pub fn state(&self) -> RunState {
        self.shared.lock().state
    }

    pub fn snapshot(&self) -> RunSnapshot {
        let lifecycle = self.shared.lock();
        let (paused, run) = match &lifecycle.active {
            Some(active) => (active.control.borrow().paused, Some(active.info.clone())),
            None => (false, lifecycle.last_run.clone()),
        };
        RunSnapshot {
            state: lifecycle.state,
            paused,
            run,
        }
    }

    fn begin(&self, kind: RunKind) -> StartOutcome {
        let mut lifecycle = self.shared.lock();
        if lifecycle.state == RunState::Running {
            tracing::info!("start rejected, a run is already active");
            return StartOutcome::AlreadyRunning;
        }

        let (control_tx, control_rx) = watch::channel(Control::default());
        let info = RunInfo {
            id: Uuid::new_v4(),
            kind,
            domains: Domain::ALL.to_vec(),
            domain_counts: BTreeMap::new(),
            started_at: Utc::now(),
        };
        let run_id = info.id;
        lifecycle.state = RunState::Running;
        lifecycle.active = Some(ActiveRun {
            info,
            control: control_tx,
        });
        drop(lifecycle);

        let shared = Arc::clone(&self.shared);
        let join = tokio::spawn(async move { shared.run_loop(run_id, kind, control_rx).await });
        StartOutcome::Started(RunHandle {
            id: run_id,
            kind,
            join,
        })
    }

    fn signal(&self, what: &str, apply: impl FnOnce(&mut Control)) {
        let lifecycle = self.shared.lock();
        match &lifecycle.active {
            Some(active) => {
                active.control.send_modify(apply);
                tracing::info!(run_id = %active.info.id, "{what} requested");
            }
            None => tracing::debug!("{what} ignored, no active run"),
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(lifecycle: &Lifecycle, run_id: Uuid) -> bool {
        lifecycle
            .active
            .as_ref()
            .is_some_and(|active| active.info.id == run_id)
    }

    /// Publish on behalf of a run. Returns `false` once the run was superseded.
    fn publish_for(&self, run_id: Uuid, event: impl Into<ProgressEvent>) -> bool {
        let lifecycle = self.lock();
        if !Self::is_current(&lifecycle, run_id) {
            return false;
        }
        self.publisher.publish(event);
        true
    }

    fn record_domain_count(&self, run_id: Uuid, domain: Domain, count: usize) {
        let mut lifecycle = self.lock();
        if let Some(active) = lifecycle.active.as_mut() {
            if active.info.id == run_id {
                active.info.domain_counts.insert(domain, count);
            }
        }
    }

    async fn run_loop(
        self: Arc<Self>,
        run_id: Uuid,
        kind: RunKind,
        mut control: watch::Receiver<Control>,
    ) -> RunSummary {
        let start = Instant::now();
        let mut summary = RunSummary {
            run_id,
            kind,
            outcome: RunOutcome::Completed,
            processed: 0,
            failed: 0,
            skipped: 0,
            duration_ms: 0,
        };
        tracing::info!(%run_id, ?kind, "run started");

        let outcome = 'run: {
            for domain in Domain::ALL {
                if !self.checkpoint(&mut control).await {
                    break 'run RunOutcome::Stopped;
                }

                let loaded = match kind {
                    RunKind::Full => self.store.list_all(domain).await,
                    RunKind::Quick => {
                        self.store
                            .sample_random(domain, self.config.quick_sample_size)
                            .await
                    }
                };
                let questions = match loaded {
                    Ok(questions) => questions,
                    Err(e) => {
                        tracing::error!("failed to load questions for {domain}: {e:#}");
                        continue;
                    }
                };

                self.record_domain_count(run_id, domain, questions.len());
                tracing::info!("evaluating domain {domain} ({} questions)", questions.len());
                if kind == RunKind::Quick {
                    let event = LifecycleEvent::DomainStart {
                        domain,
                        count: questions.len(),
                    };
                    if !self.publish_for(run_id, event) {
                        break 'run RunOutcome::Stopped;
                    }
                }

                for question in &questions {
                    if !self.checkpoint(&mut control).await {
                        break 'run RunOutcome::Stopped;
                    }
                    if !self.evaluate(run_id, domain, question, &mut summary).await {
                        break 'run RunOutcome::Stopped;
                    }
                }
            }
            RunOutcome::Completed
        };

        summary.outcome = outcome;
        summary.duration_ms = start.elapsed().as_millis() as u64;
        self.finish(&summary);
        summary
    }

    /// Between-question checkpoint. Returns `false` when the run must stop.
    async fn checkpoint(&self, control: &mut watch::Receiver<Control>) -> bool {
        let mut announced = false;
        loop {
            let current = *control.borrow_and_update();
            if current.stop {
                return false;
            }
            if !current.paused {
                if announced {
                    tracing::info!("run resumed");
                }
                return true;
            }
            if !announced {
                tracing::info!("run paused");
                announced = true;
            }
            match tokio::time::timeout(self.config.pause_poll_interval, control.changed()).await {
                Ok(Ok(())) | Err(_) => {}
                // Sender dropped: the run was reset.
                Ok(Err(_)) => return false,
            }
        }
    }

    /// Evaluate one question. Returns `false` once the run was superseded.
    async fn evaluate(
        &self,
        run_id: Uuid,
        domain: Domain,
        question: &Question,
        summary: &mut RunSummary,
    ) -> bool {
        if let Some(field) = question.missing_field() {
            tracing::warn!("skipping question {:?} in {domain}: missing {field}", question.id);
            summary.skipped += 1;
            return true;
        }

        let prompt = build_prompt(question);
        let call_start = Instant::now();
        let reply = self.service.generate_answer(&prompt).await;
        let latency_ms = call_start.elapsed().as_millis() as u64;

        let (raw_text, answer, error) = match reply {
            Ok(text) => {
                let answer = normalize_answer(&text);
                (text, answer, None)
            }
            Err(e) => {
                tracing::warn!("answer service failed for question {}: {e:#}", question.id);
                summary.failed += 1;
                (error_raw_text(&e), None, Some(format!("{e:#}")))
            }
        };
        summary.processed += 1;

        let evaluation = Evaluation {
            normalized_answer: answer,
            raw_text,
            latency_ms,
            evaluated_at: Utc::now(),
        };
        match self.store.record_result(&question.id, evaluation).await {
            Ok(RecordOutcome::Updated) => {}
            Ok(RecordOutcome::Missing) => {
                tracing::warn!("question {} no longer exists, result dropped", question.id);
            }
            Err(e) => {
                tracing::error!("failed to record result for question {}: {e:#}", question.id);
            }
        }

        self.publish_for(
            run_id,
            AnswerEvent {
                domain,
                question: question.question.clone(),
                answer: answer_token(answer),
                response_time: latency_ms,
                error,
            },
        )
    }

    fn finish(&self, summary: &RunSummary) {
        let mut lifecycle = self.lock();
        if !Self::is_current(&lifecycle, summary.run_id) {
            tracing::info!(run_id = %summary.run_id, "superseded run exited");
            return;
        }

        let (state, event) = match (summary.outcome, summary.kind) {
            (RunOutcome::Stopped, _) => (RunState::Stopped, LifecycleEvent::Stopped),
            (RunOutcome::Completed, RunKind::Full) => (RunState::Completed, LifecycleEvent::Done),
            (RunOutcome::Completed, RunKind::Quick) => {
                (RunState::Completed, LifecycleEvent::QuickDone)
            }
        };
        lifecycle.state = state;
        lifecycle.last_run = lifecycle.active.take().map(|active| active.info);
        self.publisher.publish(event);
        tracing::info!(
            run_id = %summary.run_id,
            "run {:?}: {} processed, {} failed, {} skipped in {}ms",
            summary.outcome,
            summary.processed,
            summary.failed,
            summary.skipped,
            summary.duration_ms
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::{mpsc, Semaphore};

    use super::*;
    use crate::error::ProviderError;
    use crate::model::{ExpectedAnswer, Label};
    use crate::statistics::analyze;
    use crate::store::MemoryStore;

    /// Answer service whose calls can be held back by a semaphore.
    struct ScriptedService {
        reply: String,
        fail_when: Option<String>,
        gate: Option<Arc<Semaphore>>,
        calls: AtomicUsize,
        entered: mpsc::UnboundedSender<usize>,
    }

    impl ScriptedService {
        fn new(reply: &str) -> (Self, mpsc::UnboundedReceiver<usize>) {
            let (entered, rx) = mpsc::unbounded_channel();
            (
                Self {
                    reply: reply.into(),
                    fail_when: None,
                    gate: None,
                    calls: AtomicUsize::new(0),
                    entered,
                },
                rx,
            )
        }

        fn gated(reply: &str) -> (Self, Arc<Semaphore>, mpsc::UnboundedReceiver<usize>) {
            let (mut service, rx) = Self::new(reply);
            let gate = Arc::new(Semaphore::new(0));
            service.gate = Some(Arc::clone(&gate));
            (service, gate, rx)
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AnswerService for ScriptedService {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate_answer(&self, prompt: &str) -> anyhow::Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let _ = self.entered.send(n);
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            if let Some(marker) = &self.fail_when {
                if prompt.contains(marker.as_str()) {
                    return Err(ProviderError::Timeout(1).into());
                }
            }
            Ok(self.reply.clone())
        }
    }

    /// Store whose writes always fail.
    struct BrokenWrites(MemoryStore);

    #[async_trait]
    impl QuestionStore for BrokenWrites {
        async fn list_all(&self, domain: Domain) -> anyhow::Result<Vec<Question>> {
            self.0.list_all(domain).await
        }

        async fn sample_random(&self, domain: Domain, n: usize) -> anyhow::Result<Vec<Question>> {
            self.0.sample_random(domain, n).await
        }

        async fn record_result(&self, _: &str, _: Evaluation) -> anyhow::Result<RecordOutcome> {
            anyhow::bail!("disk full")
        }
    }

    fn question(id: &str, domain: Domain, expected: Label) -> Question {
        Question {
            id: id.into(),
            domain,
            question: format!("question {id}?"),
            choices: Label::ALL
                .iter()
                .map(|l| (*l, format!("option {l}")))
                .collect(),
            expected_answer: ExpectedAnswer::Label(expected),
            evaluation: None,
        }
    }

    fn history(n: usize) -> Vec<Question> {
        (1..=n)
            .map(|i| question(&format!("h{i}"), Domain::History, Label::A))
            .collect()
    }

    fn test_config() -> RunControllerConfig {
        RunControllerConfig {
            quick_sample_size: 50,
            pause_poll_interval: Duration::from_millis(10),
        }
    }

    fn controller(store: Arc<dyn QuestionStore>, service: Arc<dyn AnswerService>) -> RunController {
        RunController::new(store, service, EventPublisher::default(), test_config())
    }

    async fn collect_until(
        sub: &mut crate::events::Subscription,
        last: LifecycleEvent,
    ) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), sub.recv())
                .await
                .expect("timed out waiting for events")
                .expect("publisher closed");
            let done = event == ProgressEvent::Lifecycle(last.clone());
            events.push(event);
            if done {
                return events;
            }
        }
    }

    fn answers(events: &[ProgressEvent]) -> Vec<&AnswerEvent> {
        events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Answer(a) => Some(a),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn full_run_processes_domains_in_order() {
        let mut questions = history(2);
        questions.push(question("c1", Domain::ComputerSecurity, Label::B));
        let store = Arc::new(MemoryStore::with_questions(questions));
        let (service, _entered) = ScriptedService::new("The answer is B.");
        let ctrl = controller(store.clone(), Arc::new(service));
        let mut sub = ctrl.publisher().register();

        assert_eq!(ctrl.state(), RunState::Idle);
        let handle = ctrl.start().into_handle().unwrap();
        let events = collect_until(&mut sub, LifecycleEvent::Done).await;
        let summary = handle.join().await.unwrap();

        let answered = answers(&events);
        assert_eq!(answered.len(), 3);
        assert_eq!(answered[0].domain, Domain::ComputerSecurity);
        assert_eq!(answered[1].question, "question h1?");
        assert_eq!(answered[2].question, "question h2?");
        assert!(answered.iter().all(|a| a.answer == "B" && a.error.is_none()));

        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert_eq!(summary.processed, 3);
        assert_eq!(ctrl.state(), RunState::Completed);

        let snapshot = ctrl.snapshot();
        let run = snapshot.run.unwrap();
        assert_eq!(run.domain_counts.get(&Domain::History), Some(&2));
        assert_eq!(run.domain_counts.get(&Domain::SocialScience), Some(&0));

        let stored = store.get("c1").await.unwrap().evaluation.unwrap();
        assert_eq!(stored.normalized_answer, Some(Label::B));
        assert_eq!(stored.raw_text, "The answer is B.");
    }

    #[tokio::test]
    async fn single_history_question_scores_full_accuracy() {
        let store = Arc::new(MemoryStore::with_questions(vec![question(
            "h1",
            Domain::History,
            Label::C,
        )]));
        let (service, _entered) = ScriptedService::new("C");
        let ctrl = controller(store.clone(), Arc::new(service));

        ctrl.start().into_handle().unwrap().join().await.unwrap();

        let report = analyze(store.as_ref()).await.unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].domain, Domain::History);
        assert_eq!(report[0].accuracy, 1.0);
    }

    #[tokio::test]
    async fn quick_run_reports_actual_sample_size() {
        let store = Arc::new(MemoryStore::with_questions(history(10)));
        let (service, _entered) = ScriptedService::new("A");
        let ctrl = controller(store, Arc::new(service));
        let mut sub = ctrl.publisher().register();

        let handle = ctrl.quick_start().into_handle().unwrap();
        assert_eq!(handle.kind, RunKind::Quick);
        let events = collect_until(&mut sub, LifecycleEvent::QuickDone).await;

        let history_start = events.iter().position(|e| {
            *e == ProgressEvent::Lifecycle(LifecycleEvent::DomainStart {
                domain: Domain::History,
                count: 10,
            })
        });
        let history_start = history_start.expect("domain-start for History");
        assert!(answers(&events[..history_start]).is_empty());
        assert_eq!(answers(&events).len(), 10);
        assert!(!events.contains(&ProgressEvent::Lifecycle(LifecycleEvent::Done)));
        assert_eq!(handle.join().await.unwrap().processed, 10);
    }

    #[tokio::test]
    async fn second_start_is_rejected_without_extra_work() {
        let store = Arc::new(MemoryStore::with_questions(history(2)));
        let (service, gate, mut entered) = ScriptedService::gated("A");
        let service = Arc::new(service);
        let ctrl = controller(store, service.clone());

        let handle = ctrl.start().into_handle().unwrap();
        entered.recv().await.unwrap();

        assert_eq!(ctrl.start().status(), StartStatus::AlreadyRunning);
        assert_eq!(ctrl.quick_start().status(), StartStatus::AlreadyRunning);
        assert_eq!(service.calls(), 1);

        gate.add_permits(2);
        let summary = handle.join().await.unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(service.calls(), 2);
        assert_eq!(ctrl.state(), RunState::Completed);

        gate.add_permits(2);
        let again = ctrl.start();
        assert!(matches!(again.status(), StartStatus::Started { .. }));
        again.into_handle().unwrap().join().await.unwrap();
    }

    #[tokio::test]
    async fn pause_holds_progress_until_resume() {
        let store = Arc::new(MemoryStore::with_questions(history(3)));
        let (service, gate, mut entered) = ScriptedService::gated("A");
        let service = Arc::new(service);
        let ctrl = controller(store, service.clone());
        let mut sub = ctrl.publisher().register();

        let handle = ctrl.start().into_handle().unwrap();
        entered.recv().await.unwrap();
        assert_eq!(ctrl.pause(), ControlStatus::Paused);
        assert!(ctrl.snapshot().paused);
        gate.add_permits(3);

        // The in-flight question still completes.
        let first = sub.recv().await.unwrap();
        assert!(matches!(first, ProgressEvent::Answer(_)));

        let idle = tokio::time::timeout(Duration::from_millis(150), sub.recv()).await;
        assert!(idle.is_err(), "no events expected while paused");
        assert_eq!(service.calls(), 1);
        assert_eq!(ctrl.state(), RunState::Running);

        assert_eq!(ctrl.resume(), ControlStatus::Resumed);
        let rest = collect_until(&mut sub, LifecycleEvent::Done).await;
        assert_eq!(answers(&rest).len(), 2);
        assert_eq!(handle.join().await.unwrap().outcome, RunOutcome::Completed);
    }

    #[tokio::test]
    async fn stop_halts_before_next_question() {
        let store = Arc::new(MemoryStore::with_questions(history(3)));
        let (service, gate, mut entered) = ScriptedService::gated("A");
        let service = Arc::new(service);
        let ctrl = controller(store.clone(), service.clone());
        let mut sub = ctrl.publisher().register();

        let handle = ctrl.start().into_handle().unwrap();
        entered.recv().await.unwrap();
        assert_eq!(ctrl.stop(), ControlStatus::Stopped);
        gate.add_permits(3);

        let events = collect_until(&mut sub, LifecycleEvent::Stopped).await;
        assert_eq!(answers(&events).len(), 1);

        let summary = handle.join().await.unwrap();
        assert_eq!(summary.outcome, RunOutcome::Stopped);
        assert_eq!(summary.processed, 1);
        assert_eq!(service.calls(), 1);
        assert_eq!(ctrl.state(), RunState::Stopped);

        assert!(store.get("h1").await.unwrap().evaluation.is_some());
        assert!(store.get("h2").await.unwrap().evaluation.is_none());
        assert!(store.get("h3").await.unwrap().evaluation.is_none());
    }

    #[tokio::test]
    async fn stop_while_paused_exits() {
        let store = Arc::new(MemoryStore::with_questions(history(2)));
        let (service, gate, mut entered) = ScriptedService::gated("A");
        let ctrl = controller(store, Arc::new(service));

        let handle = ctrl.start().into_handle().unwrap();
        entered.recv().await.unwrap();
        ctrl.pause();
        gate.add_permits(2);
        ctrl.stop();

        let summary = handle.join().await.unwrap();
        assert_eq!(summary.outcome, RunOutcome::Stopped);
        assert_eq!(summary.processed, 1);
    }

    #[tokio::test]
    async fn reset_returns_to_idle_immediately() {
        let store = Arc::new(MemoryStore::with_questions(history(3)));
        let (service, gate, mut entered) = ScriptedService::gated("A");
        let ctrl = controller(store.clone(), Arc::new(service));
        let mut sub = ctrl.publisher().register();

        let old = ctrl.start().into_handle().unwrap();
        entered.recv().await.unwrap();

        assert_eq!(ctrl.reset(), ControlStatus::ResetComplete);
        assert_eq!(ctrl.state(), RunState::Idle);
        assert_eq!(
            sub.recv().await,
            Some(ProgressEvent::Lifecycle(LifecycleEvent::Stopped))
        );
        assert_eq!(
            sub.recv().await,
            Some(ProgressEvent::Lifecycle(LifecycleEvent::Reset))
        );

        // The in-flight call finishes; its result is kept but not broadcast.
        gate.add_permits(1);
        let summary = old.join().await.unwrap();
        assert_eq!(summary.outcome, RunOutcome::Stopped);
        assert_eq!(ctrl.state(), RunState::Idle);
        assert!(store.get("h1").await.unwrap().evaluation.is_some());
        assert_eq!(sub.try_recv(), None);

        gate.add_permits(3);
        let fresh = ctrl.start().into_handle().unwrap();
        assert_eq!(fresh.join().await.unwrap().processed, 3);
        assert_eq!(ctrl.state(), RunState::Completed);
    }

    #[tokio::test]
    async fn reset_when_idle_only_emits_reset() {
        let ctrl = controller(
            Arc::new(MemoryStore::new()),
            Arc::new(ScriptedService::new("A").0),
        );
        let mut sub = ctrl.publisher().register();
        assert_eq!(ctrl.reset(), ControlStatus::ResetComplete);
        assert_eq!(
            sub.try_recv(),
            Some(ProgressEvent::Lifecycle(LifecycleEvent::Reset))
        );
        assert_eq!(sub.try_recv(), None);
        assert_eq!(ctrl.pause(), ControlStatus::Paused);
        assert!(!ctrl.snapshot().paused);
    }

    #[tokio::test]
    async fn service_failure_records_sentinel_and_continues() {
        let store = Arc::new(MemoryStore::with_questions(history(2)));
        let (mut service, _entered) = ScriptedService::new("A");
        service.fail_when = Some("question h1?".into());
        let ctrl = controller(store.clone(), Arc::new(service));
        let mut sub = ctrl.publisher().register();

        let handle = ctrl.start().into_handle().unwrap();
        let events = collect_until(&mut sub, LifecycleEvent::Done).await;
        let summary = handle.join().await.unwrap();

        let answered = answers(&events);
        assert_eq!(answered[0].answer, "");
        assert!(answered[0].error.as_deref().unwrap().contains("timed out"));
        assert_eq!(answered[1].answer, "A");
        assert_eq!(summary.failed, 1);

        let failed = store.get("h1").await.unwrap().evaluation.unwrap();
        assert!(failed.raw_text.starts_with(crate::answer::ERROR_SENTINEL));
        assert_eq!(failed.normalized_answer, None);
    }

    #[tokio::test]
    async fn persistence_failure_does_not_abort() {
        let store = Arc::new(BrokenWrites(MemoryStore::with_questions(history(2))));
        let (service, _entered) = ScriptedService::new("A");
        let ctrl = controller(store, Arc::new(service));
        let mut sub = ctrl.publisher().register();

        ctrl.start();
        let events = collect_until(&mut sub, LifecycleEvent::Done).await;
        assert_eq!(answers(&events).len(), 2);
    }

    #[tokio::test]
    async fn malformed_question_is_skipped() {
        let mut broken = question("h0", Domain::History, Label::A);
        broken.choices.clear();
        let mut questions = vec![broken];
        questions.extend(history(1));
        let store = Arc::new(MemoryStore::with_questions(questions));
        let (service, _entered) = ScriptedService::new("A");
        let service = Arc::new(service);
        let ctrl = controller(store, service.clone());

        let summary = ctrl.start().into_handle().unwrap().join().await.unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.processed, 1);
        assert_eq!(service.calls(), 1);
    }

    #[test]
    fn status_wire_shapes() {
        let json = serde_json::to_value(StartStatus::AlreadyRunning).unwrap();
        assert_eq!(json, serde_json::json!({"status": "already-running"}));
        let json = serde_json::to_value(ControlStatus::ResetComplete).unwrap();
        assert_eq!(json, serde_json::json!({"status": "reset-complete"}));
        let json = serde_json::to_value(StartStatus::Started {
            run_id: Uuid::nil(),
        })
        .unwrap();
        assert_eq!(json["status"], "started");
    }
}
