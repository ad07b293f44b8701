//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - serve: Run the HTTP server
//! - ask: Answer one query in the terminal
//! - history: Print a session transcript
//! - config show: Print the effective configuration

use anyhow::{Context, Result};
use sdk::{EventKind, ProgressEvent, RunStatus};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;

use crate::conductor::{Conductor, RunRequest, RunSettings};
use crate::config::Config;
use crate::db::{Database, SessionStore};
use crate::llm::ollama::OllamaProvider;
use crate::llm::openai::OpenAIProvider;
use crate::llm::router::LLMRouter;
use crate::llm::LLMProvider;
use crate::search::{SearchProvider, TavilyProvider};
use crate::secrets::{SecretCache, SecretManager};
use crate::server::{self, AppState};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Everything a run needs, wired from configuration
pub struct Components {
    pub conductor: Conductor,
    pub router: Arc<LLMRouter>,
    pub database: Database,
}

/// Build providers, the session database and the conductor
pub async fn build_components(config: &Config) -> Result<Components> {
    let secret_manager = Arc::new(SecretManager::new("ross"));
    let secret_cache = Arc::new(SecretCache::new(Arc::clone(&secret_manager)));

    // Ollama needs no key, so it is always registered
    let mut providers: Vec<Arc<dyn LLMProvider>> = vec![Arc::new(OllamaProvider::new(
        config.llm.ollama.base_url.clone(),
        config.llm.ollama.model.clone(),
    ))];

    if secret_manager.has_secret("openai_api_key") {
        providers.push(Arc::new(OpenAIProvider::new(
            config.llm.openai.clone(),
            Arc::clone(&secret_cache),
        )));
    } else if config.llm.default_provider == "openai" {
        tracing::warn!("No OpenAI API key found (set OPENAI_API_KEY), falling back to Ollama");
    }

    let router = Arc::new(LLMRouter::new(
        providers,
        config.llm.default_provider.clone(),
    ));
    tracing::info!(providers = ?router.provider_names(), "LLM providers registered");

    let search: Arc<dyn SearchProvider> = Arc::new(TavilyProvider::new(
        config.search.tavily.clone(),
        Arc::clone(&secret_cache),
    ));

    let database = Database::new(&config.database_path())
        .await
        .context("Failed to open database")?;
    let store: Arc<dyn SessionStore> = Arc::new(database.sessions());

    let conductor = Conductor::new(
        Arc::clone(&router),
        search,
        store,
        RunSettings::from_config(config),
    );

    Ok(Components {
        conductor,
        router,
        database,
    })
}

/// Run the HTTP server until Ctrl-C
pub async fn handle_serve(
    host: Option<String>,
    port: Option<u16>,
    config: &Config,
) -> Result<()> {
    let mut server_config = config.server.clone();
    if let Some(host) = host {
        server_config.host = host;
    }
    if let Some(port) = port {
        server_config.port = port;
    }

    let components = build_components(config).await?;
    let state = AppState {
        conductor: components.conductor,
        router: components.router,
    };

    server::serve(&server_config, state).await?;

    components.database.close().await
}

/// Answer a query, printing progress as it happens
///
/// Fails when the run ends aborted.
pub async fn handle_ask(
    query: String,
    session: Option<String>,
    model: Option<String>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let query = query.trim().to_string();
    if query.is_empty() {
        anyhow::bail!("Query must not be empty");
    }

    let components = build_components(config).await?;
    let session_id = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let request = RunRequest::new(session_id.clone(), query).with_model(model);
    let mut events = components.conductor.start_run(request);

    let mut status = RunStatus::Aborted;
    while let Some(event) = events.recv().await {
        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string(&event)?),
            OutputFormat::Text => print_event(&event)?,
        }

        if let EventKind::RunEnded { status: s, .. } = event.kind {
            status = s;
            break;
        }
    }

    if let OutputFormat::Text = format {
        println!();
        println!("Session: {}", session_id);
    }

    components.database.close().await?;

    match status {
        RunStatus::Ok => Ok(()),
        RunStatus::Aborted => Err(anyhow::anyhow!("Run aborted")),
    }
}

fn print_event(event: &ProgressEvent) -> Result<()> {
    match &event.kind {
        EventKind::QueryRewritten { query } => println!("Query: {}", query),
        EventKind::PlanGenerationStarted => println!("Planning..."),
        EventKind::PlanGenerated { plan } => {
            println!("Plan ({} steps):", plan.steps.len());
            for step in &plan.steps {
                if step.dependencies.is_empty() {
                    println!("  [{}] {}", step.id, step.description);
                } else {
                    let deps: Vec<String> =
                        step.dependencies.iter().map(|d| d.to_string()).collect();
                    println!(
                        "  [{}] {} (after {})",
                        step.id,
                        step.description,
                        deps.join(", ")
                    );
                }
            }
        }
        EventKind::StepStarted {
            step_id,
            description,
        } => println!("Step {}: {}", step_id, description),
        EventKind::StepCompleted {
            results,
            skipped_queries,
            ..
        } => {
            if *skipped_queries > 0 {
                println!(
                    "  {} results ({} queries skipped)",
                    results, skipped_queries
                );
            } else {
                println!("  {} results", results);
            }
        }
        EventKind::AnswerChunk { text } => {
            print!("{}", text);
            std::io::stdout().flush()?;
        }
        EventKind::AnswerCompleted { sources, .. } => {
            println!();
            if !sources.is_empty() {
                println!();
                println!("Sources:");
                for source in sources {
                    println!("  [{}] {}", source.index, source.url);
                }
            }
        }
        EventKind::RunEnded {
            status: RunStatus::Aborted,
            reason,
            message,
        } => {
            let reason = reason.map(|r| r.as_str()).unwrap_or("unknown");
            eprintln!(
                "Run aborted ({}): {}",
                reason,
                message.as_deref().unwrap_or("no details")
            );
        }
        EventKind::RunEnded { .. } => {}
    }
    Ok(())
}

/// Print the transcript of a session
pub async fn handle_history(session: String, config: &Config, format: OutputFormat) -> Result<()> {
    let database = Database::new(&config.database_path())
        .await
        .context("Failed to open database")?;

    let messages = database
        .sessions()
        .transcript(&session)
        .await
        .context("Failed to fetch session history")?;

    match format {
        OutputFormat::Text => {
            if messages.is_empty() {
                println!("No messages in session {}", session);
            } else {
                println!("Session {} ({} messages):", session, messages.len());
                println!();
                for message in &messages {
                    println!("{}:", message.role.as_str());
                    println!("{}", message.content);
                    println!();
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "session_id": session,
                "messages": messages,
                "count": messages.len(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    database.close().await
}

/// Print the effective configuration
pub fn handle_config_show(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            let text =
                toml::to_string_pretty(config).context("Failed to serialize configuration")?;
            print!("{}", text);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
    }
    Ok(())
}
