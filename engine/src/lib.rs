//! Ross Engine Library
//!
//! This library provides the core functionality of the Ross engine.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Secret management module
pub mod secrets;

/// Database persistence module
pub mod db;

/// LLM provider abstraction layer
pub mod llm;

/// Web search provider abstraction layer
pub mod search;

/// Conductor orchestration module
pub mod conductor;

/// HTTP and SSE surface
pub mod server;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
