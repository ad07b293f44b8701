//! Execution Controller
//!
//! Drives one run through an explicit phase loop:
//!
//! ```text
//! Rewriting -> Planning -> Executing(0) -> ... -> Executing(N) -> Summarizing -> Done
//!                  \______________ any fatal error ______________/ -> Aborted
//! ```
//!
//! Every transition is reported through the run's [`EventSink`], and the run
//! always ends with exactly one `run_ended` event. The run state is saved to
//! the session store after the rewrite, after planning, after each committed
//! step, and once more when the run terminates.

use crate::conductor::context::dependency_context;
use crate::conductor::error::{PlanGenerationError, RunError};
use crate::conductor::events::{EventSink, Transition};
use crate::conductor::executor::StepExecutor;
use crate::conductor::planner::Planner;
use crate::conductor::rewriter::QueryRewriter;
use crate::conductor::summarizer::Summarizer;
use crate::conductor::types::{ChatMessage, RunState};
use crate::config::Config;
use crate::db::SessionStore;
use crate::llm::router::LLMRouter;
use crate::llm::{LLMError, LLMProvider};
use crate::search::SearchProvider;
use sdk::{ProgressEvent, RunStatus};
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, Instrument};

/// A request to answer one query within a session
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub session_id: String,
    pub query: String,
    /// Model-selection token, resolved by the LLM router
    pub model: Option<String>,
}

impl RunRequest {
    pub fn new(session_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            query: query.into(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }
}

/// Timeouts and buffering for runs
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub llm_timeout: Duration,
    pub search_timeout: Duration,
    pub event_buffer: usize,
}

impl RunSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            llm_timeout: config.llm.timeout(),
            search_timeout: config.search.timeout(),
            event_buffer: config.run.event_buffer,
        }
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            llm_timeout: Duration::from_secs(120),
            search_timeout: Duration::from_secs(30),
            event_buffer: 64,
        }
    }
}

#[derive(Debug)]
enum Phase {
    Rewriting,
    Planning,
    Executing(usize),
    Summarizing,
    Done,
    Aborted(RunError),
}

/// Sessions with a run in progress
#[derive(Clone, Default)]
struct SessionLocks {
    active: Arc<Mutex<HashSet<String>>>,
}

impl SessionLocks {
    fn try_acquire(&self, session_id: &str) -> Option<SessionGuard> {
        let mut active = self.active.lock().ok()?;
        if !active.insert(session_id.to_string()) {
            return None;
        }
        Some(SessionGuard {
            locks: self.clone(),
            session_id: session_id.to_string(),
        })
    }
}

/// Releases the session when the run is over
struct SessionGuard {
    locks: SessionLocks,
    session_id: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Ok(mut active) = self.locks.active.lock() {
            active.remove(&self.session_id);
        }
    }
}

/// Runs queries end to end
#[derive(Clone)]
pub struct Conductor {
    router: Arc<LLMRouter>,
    search: Arc<dyn SearchProvider>,
    store: Arc<dyn SessionStore>,
    settings: RunSettings,
    locks: SessionLocks,
}

impl Conductor {
    pub fn new(
        router: Arc<LLMRouter>,
        search: Arc<dyn SearchProvider>,
        store: Arc<dyn SessionStore>,
        settings: RunSettings,
    ) -> Self {
        Self {
            router,
            search,
            store,
            settings,
            locks: SessionLocks::default(),
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Start a run in the background and return its event stream.
    ///
    /// Dropping the receiver cancels the run at its next suspension point.
    pub fn start_run(&self, request: RunRequest) -> mpsc::Receiver<ProgressEvent> {
        let (tx, rx) = mpsc::channel(self.settings.event_buffer.max(1));
        let conductor = self.clone();
        tokio::spawn(async move {
            conductor.run(request, tx).await;
        });
        rx
    }

    /// Run to completion, delivering events to `tx`
    pub async fn run(&self, request: RunRequest, tx: mpsc::Sender<ProgressEvent>) -> RunStatus {
        let sink = EventSink::new(request.session_id.clone(), tx);
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("run", session_id = %request.session_id, run_id = %run_id);

        async move {
            let Some(_guard) = self.locks.try_acquire(&request.session_id) else {
                let err = RunError::SessionBusy(request.session_id.clone());
                error!(error = %err, "Run rejected");
                sink.emit(Transition::Aborted(&err)).await;
                return RunStatus::Aborted;
            };

            info!(query = %request.query, "Run started");
            self.drive(&request, &sink).await
        }
        .instrument(span)
        .await
    }

    async fn drive(&self, request: &RunRequest, sink: &EventSink) -> RunStatus {
        let session_id = request.session_id.as_str();

        let transcript = match self.store.load(session_id).await {
            Ok(previous) => previous.map(|s| s.transcript).unwrap_or_default(),
            Err(e) => {
                let err = RunError::SessionStore(e.to_string());
                error!(error = %err, "Failed to load session");
                sink.emit(Transition::Aborted(&err)).await;
                return RunStatus::Aborted;
            }
        };

        let mut state = RunState::new(request.query.clone(), transcript);

        let outcome = match self.router.select(request.model.as_deref()) {
            Some(llm) => self.execute(&mut state, llm, sink).await,
            None => Err(RunError::Plan(PlanGenerationError::Llm(
                LLMError::ProviderUnavailable("No LLM providers configured".to_string()),
            ))),
        };

        let status = match &outcome {
            Ok(()) => RunStatus::Ok,
            Err(_) => RunStatus::Aborted,
        };
        state.outcome = Some(status);

        if let Err(e) = self.store.save(session_id, &state).await {
            error!(error = %e, "Failed to save final run state");
        }

        match outcome {
            Ok(()) => {
                info!(steps = state.tracker.len(), "Run finished");
                sink.emit(Transition::Finished).await;
            }
            Err(err) => {
                error!(reason = %err.reason(), error = %err, "Run aborted");
                sink.emit(Transition::Aborted(&err)).await;
            }
        }

        status
    }

    /// The phase loop. Returns once the run is done or aborted.
    async fn execute(
        &self,
        state: &mut RunState,
        llm: Arc<dyn LLMProvider>,
        sink: &EventSink,
    ) -> Result<(), RunError> {
        let session_id = sink.session_id().to_string();
        let rewriter = QueryRewriter::new(Arc::clone(&llm), self.settings.llm_timeout);
        let planner = Planner::new(Arc::clone(&llm), self.settings.llm_timeout);
        let executor = StepExecutor::new(
            Arc::clone(&llm),
            Arc::clone(&self.search),
            self.settings.llm_timeout,
            self.settings.search_timeout,
        );
        let summarizer = Summarizer::new(llm, self.settings.llm_timeout);

        let mut phase = Phase::Rewriting;

        loop {
            if sink.is_closed() && !matches!(phase, Phase::Done | Phase::Aborted(_)) {
                phase = Phase::Aborted(RunError::Cancelled);
            }

            phase = match phase {
                Phase::Rewriting => {
                    let rewrite = rewriter.resolve(&state.transcript, &state.original_query);
                    match until_closed(sink, rewrite).await {
                        None => Phase::Aborted(RunError::Cancelled),
                        Some(query) => {
                            state.transcript.push(ChatMessage::user(query.clone()));
                            state.rewritten_query = Some(query);
                            self.persist(&session_id, state).await?;
                            sink.emit(Transition::Rewritten(state.query())).await;
                            Phase::Planning
                        }
                    }
                }

                Phase::Planning => {
                    sink.emit(Transition::PlanningStarted).await;
                    match until_closed(sink, planner.generate_plan(state.query())).await {
                        None => Phase::Aborted(RunError::Cancelled),
                        Some(Err(e)) => Phase::Aborted(e.into()),
                        Some(Ok(plan)) => {
                            state.plan = Some(plan);
                            self.persist(&session_id, state).await?;
                            if let Some(plan) = &state.plan {
                                sink.emit(Transition::Planned(plan)).await;
                            }
                            Phase::Executing(0)
                        }
                    }
                }

                Phase::Executing(k) => {
                    let Some(plan) = state.plan.clone() else {
                        return Err(RunError::Plan(PlanGenerationError::Malformed(
                            "execution started without a plan".to_string(),
                        )));
                    };

                    match plan.step(k) {
                        None => Phase::Summarizing,
                        Some(step) => {
                            sink.emit(Transition::StepStarted(step)).await;
                            let context = dependency_context(&state.tracker, &step.dependencies);

                            match until_closed(
                                sink,
                                executor.execute_step(step, state.query(), &context),
                            )
                            .await
                            {
                                None => Phase::Aborted(RunError::Cancelled),
                                Some(Err(e)) => Phase::Aborted(e),
                                Some(Ok(result)) => {
                                    state.tracker.append(result);
                                    state.cursor = k + 1;
                                    self.persist(&session_id, state).await?;
                                    if let Some(result) = state.tracker.get(k) {
                                        sink.emit(Transition::StepCommitted(result)).await;
                                    }
                                    Phase::Executing(k + 1)
                                }
                            }
                        }
                    }
                }

                Phase::Summarizing => {
                    debug_assert_eq!(
                        Some(state.cursor),
                        state.plan.as_ref().map(|p| p.len())
                    );
                    self.summarize(state, &summarizer, sink).await
                }

                Phase::Done => return Ok(()),
                Phase::Aborted(e) => return Err(e),
            };
        }
    }

    async fn summarize(
        &self,
        state: &mut RunState,
        summarizer: &Summarizer,
        sink: &EventSink,
    ) -> Phase {
        let mut stream =
            match until_closed(sink, summarizer.start(state.query(), &state.tracker)).await {
                None => return Phase::Aborted(RunError::Cancelled),
                Some(Err(e)) => return Phase::Aborted(e),
                Some(Ok(stream)) => stream,
            };

        loop {
            match until_closed(sink, stream.next_chunk()).await {
                None => return Phase::Aborted(RunError::Cancelled),
                Some(None) => break,
                Some(Some(Err(e))) => return Phase::Aborted(e),
                Some(Some(Ok(chunk))) => {
                    if !sink.emit(Transition::AnswerChunk(&chunk)).await {
                        return Phase::Aborted(RunError::Cancelled);
                    }
                }
            }
        }

        let answer = stream.finish();
        info!(
            chars = answer.text.len(),
            cited = answer.cited.len(),
            sources = answer.sources.len(),
            "Answer generated"
        );
        state
            .transcript
            .push(ChatMessage::assistant(answer.text.clone()));
        sink.emit(Transition::Answered(&answer)).await;
        Phase::Done
    }

    async fn persist(&self, session_id: &str, state: &RunState) -> Result<(), RunError> {
        self.store
            .save(session_id, state)
            .await
            .map_err(|e| RunError::SessionStore(e.to_string()))
    }
}

/// Await `fut` unless the observer disconnects first
async fn until_closed<F: Future>(sink: &EventSink, fut: F) -> Option<F::Output> {
    tokio::select! {
        out = fut => Some(out),
        _ = sink.closed() => None,
    }
}
