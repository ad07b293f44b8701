//! Progress Event Translator
//!
//! [`translate`] maps controller transitions to client-facing events.
//! [`EventSink`] delivers them to the observer of a run and notices when the
//! observer has gone away.

use crate::conductor::error::RunError;
use crate::conductor::summarizer::Answer;
use crate::conductor::types::{Plan, Step, StepResult};
use crate::secrets::scrub;
use sdk::{EventKind, ProgressEvent, RunStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// A controller state change worth reporting
#[derive(Debug)]
pub enum Transition<'a> {
    Rewritten(&'a str),
    PlanningStarted,
    Planned(&'a Plan),
    StepStarted(&'a Step),
    StepCommitted(&'a StepResult),
    AnswerChunk(&'a str),
    Answered(&'a Answer),
    Finished,
    Aborted(&'a RunError),
}

pub fn translate(transition: Transition<'_>) -> EventKind {
    match transition {
        Transition::Rewritten(query) => EventKind::QueryRewritten {
            query: query.to_string(),
        },
        Transition::PlanningStarted => EventKind::PlanGenerationStarted,
        Transition::Planned(plan) => EventKind::PlanGenerated {
            plan: plan.summary(),
        },
        Transition::StepStarted(step) => EventKind::StepStarted {
            step_id: step.id,
            description: step.description.clone(),
        },
        Transition::StepCommitted(result) => EventKind::StepCompleted {
            step_id: result.step.id,
            results: result.results.len(),
            skipped_queries: result.skipped_queries.len(),
        },
        Transition::AnswerChunk(text) => EventKind::AnswerChunk {
            text: text.to_string(),
        },
        Transition::Answered(answer) => EventKind::AnswerCompleted {
            answer: answer.text.clone(),
            sources: answer.sources.clone(),
        },
        Transition::Finished => EventKind::RunEnded {
            status: RunStatus::Ok,
            reason: None,
            message: None,
        },
        Transition::Aborted(error) => EventKind::RunEnded {
            status: RunStatus::Aborted,
            reason: Some(error.reason()),
            message: Some(scrub(&error.to_string())),
        },
    }
}

/// Delivers the events of one run.
///
/// Once a send fails the sink is closed for good and drops every later event.
#[derive(Clone)]
pub struct EventSink {
    session_id: String,
    tx: mpsc::Sender<ProgressEvent>,
    closed: Arc<AtomicBool>,
}

impl EventSink {
    pub fn new(session_id: impl Into<String>, tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self {
            session_id: session_id.into(),
            tx,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Whether the observer has disconnected
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.tx.is_closed()
    }

    /// Resolves once the observer has disconnected
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    /// Translate and deliver a transition. Returns false if the observer is gone.
    pub async fn emit(&self, transition: Transition<'_>) -> bool {
        if self.is_closed() {
            return false;
        }

        let event = ProgressEvent::new(self.session_id.clone(), translate(transition));
        tracing::debug!(event = event.kind.name(), "Emitting progress event");

        if self.tx.send(event).await.is_err() {
            self.closed.store(true, Ordering::SeqCst);
            tracing::info!(session_id = %self.session_id, "Observer disconnected");
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conductor::types::SearchResult;
    use crate::llm::LLMError;
    use sdk::AbortReason;

    #[test]
    fn test_translate_step_committed() {
        let result = StepResult {
            step: Step::new(1, "b", vec![0]),
            results: vec![SearchResult::new("u", "c")],
            skipped_queries: vec!["q".into()],
        };
        assert_eq!(
            translate(Transition::StepCommitted(&result)),
            EventKind::StepCompleted {
                step_id: 1,
                results: 1,
                skipped_queries: 1
            }
        );
    }

    #[test]
    fn test_translate_abort_carries_reason() {
        let err = RunError::Summarization(LLMError::AuthenticationFailed(
            "bad key sk-abcdefghijklmnopqrstuvwxyz".into(),
        ));
        match translate(Transition::Aborted(&err)) {
            EventKind::RunEnded {
                status,
                reason,
                message,
            } => {
                assert_eq!(status, RunStatus::Aborted);
                assert_eq!(reason, Some(AbortReason::Summarization));
                let message = message.unwrap();
                assert!(message.contains("[REDACTED]"));
                assert!(!message.contains("sk-abcdefghij"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sink_delivers_with_session_id() {
        let (tx, mut rx) = mpsc::channel(4);
        let sink = EventSink::new("s1", tx);

        assert!(sink.emit(Transition::PlanningStarted).await);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.session_id, "s1");
        assert_eq!(event.kind, EventKind::PlanGenerationStarted);
    }

    #[tokio::test]
    async fn test_sink_closes_after_disconnect() {
        let (tx, rx) = mpsc::channel(4);
        let sink = EventSink::new("s1", tx);
        drop(rx);

        assert!(!sink.emit(Transition::Finished).await);
        assert!(sink.is_closed());
        assert!(!sink.emit(Transition::PlanningStarted).await);
    }
}
