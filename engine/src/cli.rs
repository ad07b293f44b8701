use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Ross - plan-driven web search
#[derive(Parser, Debug)]
#[command(name = "ross")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Use custom config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server
    Serve {
        /// Bind host (overrides server.host)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides server.port)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Answer a query and print its progress
    Ask {
        /// The question to answer
        query: String,

        /// Continue an existing session
        #[arg(long, short)]
        session: Option<String>,

        /// LLM provider to use (openai, ollama)
        #[arg(long, short)]
        model: Option<String>,
    },

    /// Show the transcript of a session
    History {
        /// Session ID
        session: String,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
}
