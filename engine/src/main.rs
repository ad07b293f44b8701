// Ross plan-driven web search engine
// Main entry point for the Ross binary

use clap::Parser;
use ross_engine::cli::{Cli, Command, ConfigAction};
use ross_engine::config::Config;
use ross_engine::handlers::{
    handle_ask, handle_config_show, handle_history, handle_serve, OutputFormat,
};
use ross_engine::telemetry::init_telemetry_with_level;
use sdk::ErrorExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration (or use custom path if provided)
    let loaded = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)
    } else {
        Config::load_or_create()
    };
    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Hint: {}", e.user_hint());
            std::process::exit(1);
        }
    };

    // --log wins over the configured level; RUST_LOG wins over both
    init_telemetry_with_level(cli.log.as_deref().unwrap_or(&config.core.log_level));

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::info!("Ross v{} ({} - {})", version, commit, timestamp);

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    match cli.command {
        Command::Serve { host, port } => {
            tracing::info!("Starting server...");
            handle_serve(host, port, &config).await
        }

        Command::Ask {
            query,
            session,
            model,
        } => {
            tracing::info!("Answering query: {}", query);
            handle_ask(query, session, model, &config, format).await
        }

        Command::History { session } => handle_history(session, &config, format).await,

        Command::Config { action } => match action {
            ConfigAction::Show => handle_config_show(&config, format),
        },
    }
}
