//! Scripted collaborators shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use ross_engine::conductor::{Conductor, RunSettings, SearchResult};
use ross_engine::db::{MemorySessionStore, SessionStore};
use ross_engine::llm::router::LLMRouter;
use ross_engine::llm::{self, LLMError, LLMProvider, Message, ResponseSchema, TextStream};
use ross_engine::search::{self, SearchError, SearchProvider};
use sdk::{EventKind, ProgressEvent};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// LLM that answers each call shape from a script
pub struct ScriptedLlm {
    pub rewrite: String,
    pub plan: Value,
    /// Search queries keyed by step description
    pub queries: Vec<(String, Vec<String>)>,
    pub answer: Vec<String>,
    /// Fail the answer stream after the scripted chunks
    pub answer_fails: bool,
    pub rewrite_calls: AtomicUsize,
    pub plan_calls: AtomicUsize,
    pub query_calls: AtomicUsize,
    pub stream_calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new(plan: Value) -> Self {
        Self {
            rewrite: String::new(),
            plan,
            queries: Vec::new(),
            answer: Vec::new(),
            answer_fails: false,
            rewrite_calls: AtomicUsize::new(0),
            plan_calls: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_rewrite(mut self, rewrite: &str) -> Self {
        self.rewrite = rewrite.to_string();
        self
    }

    pub fn with_queries(mut self, step: &str, queries: &[&str]) -> Self {
        self.queries.push((
            step.to_string(),
            queries.iter().map(|q| q.to_string()).collect(),
        ));
        self
    }

    pub fn with_answer(mut self, chunks: &[&str]) -> Self {
        self.answer = chunks.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_failing_answer(mut self, chunks: &[&str]) -> Self {
        self.answer = chunks.iter().map(|c| c.to_string()).collect();
        self.answer_fails = true;
        self
    }

    fn queries_for(&self, messages: &[Message]) -> Vec<String> {
        let prompt = messages
            .last()
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        // Dependency context also names earlier steps, so match the current one only
        let current = prompt.rsplit("Current step: ").next().unwrap_or_default();
        self.queries
            .iter()
            .find(|(step, _)| current == step.as_str())
            .map(|(_, q)| q.clone())
            .unwrap_or_else(|| vec!["fallback query".to_string()])
    }
}

#[async_trait]
impl LLMProvider for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-1"
    }

    fn is_local(&self) -> bool {
        true
    }

    async fn generate(&self, _messages: &[Message]) -> llm::Result<String> {
        self.rewrite_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.rewrite.clone())
    }

    async fn generate_structured(
        &self,
        messages: &[Message],
        schema: &ResponseSchema,
    ) -> llm::Result<Value> {
        match schema.name.as_str() {
            "query_plan" => {
                self.plan_calls.fetch_add(1, Ordering::SeqCst);
                Ok(self.plan.clone())
            }
            "search_queries" => {
                self.query_calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!({ "search_queries": self.queries_for(messages) }))
            }
            other => Err(LLMError::InvalidRequest(format!("unexpected schema {}", other))),
        }
    }

    async fn stream(&self, _messages: &[Message]) -> llm::Result<TextStream> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        let mut chunks: Vec<llm::Result<String>> = self.answer.iter().cloned().map(Ok).collect();
        if self.answer_fails {
            chunks.push(Err(LLMError::NetworkError("stream reset".to_string())));
        }
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

/// Search provider serving canned hits
#[derive(Default)]
pub struct ScriptedSearch {
    pub hits: HashMap<String, Vec<SearchResult>>,
    pub failing: HashSet<String>,
    /// Queries that never return
    pub hanging: HashSet<String>,
    pub calls: AtomicUsize,
}

impl ScriptedSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hits(mut self, query: &str, urls: &[&str]) -> Self {
        self.hits.insert(
            query.to_string(),
            urls.iter()
                .map(|u| SearchResult::new(*u, format!("content of {}", u)))
                .collect(),
        );
        self
    }

    pub fn failing(mut self, query: &str) -> Self {
        self.failing.insert(query.to_string());
        self
    }

    pub fn hanging(mut self, query: &str) -> Self {
        self.hanging.insert(query.to_string());
        self
    }
}

#[async_trait]
impl SearchProvider for ScriptedSearch {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn search(&self, query: &str) -> search::Result<Vec<SearchResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hanging.contains(query) {
            std::future::pending::<()>().await;
        }
        if self.failing.contains(query) {
            return Err(SearchError::ProviderUnavailable("scripted outage".to_string()));
        }
        Ok(self.hits.get(query).cloned().unwrap_or_default())
    }
}

pub fn settings() -> RunSettings {
    RunSettings {
        llm_timeout: Duration::from_secs(5),
        search_timeout: Duration::from_secs(5),
        event_buffer: 64,
    }
}

/// Conductor over scripted collaborators and an in-memory store
pub fn conductor(
    llm: Arc<ScriptedLlm>,
    search: Arc<ScriptedSearch>,
) -> (Conductor, Arc<MemorySessionStore>) {
    let store = Arc::new(MemorySessionStore::new());
    let router = Arc::new(LLMRouter::new(vec![llm as Arc<dyn LLMProvider>], "scripted"));
    let conductor = Conductor::new(
        router,
        search as Arc<dyn SearchProvider>,
        Arc::clone(&store) as Arc<dyn SessionStore>,
        settings(),
    );
    (conductor, store)
}

/// Drain a run's events until the channel closes
pub async fn collect(mut rx: mpsc::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

pub fn names(events: &[ProgressEvent]) -> Vec<&'static str> {
    events.iter().map(|e| e.kind.name()).collect()
}

/// Exactly one terminal event, and it comes last
pub fn assert_single_terminal(events: &[ProgressEvent]) {
    let terminals = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminals, 1, "expected one run_ended, got {:?}", names(events));
    assert!(events.last().is_some_and(|e| e.is_terminal()));
}

pub fn run_ended(events: &[ProgressEvent]) -> &EventKind {
    &events
        .last()
        .expect("run produced no events")
        .kind
}
