//! API key resolution
//!
//! Collaborator API keys are resolved in this order:
//! 1. Environment variable named after the key, uppercased (`tavily_api_key` -> `TAVILY_API_KEY`)
//! 2. OS keychain entry under the configured service name
//!
//! Resolved values are cached for the life of the process and wrapped in
//! [`SecretString`] so they never end up in logs. [`scrub`] removes
//! key-shaped substrings from provider error text before it is surfaced.

use keyring::Entry;
use regex::Regex;
use sdk::errors::EngineError;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

/// A wrapper for sensitive string data that prevents accidental logging.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Access the raw underlying string
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED])")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

/// Patterns for key-shaped strings, compiled once.
static SECRET_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

fn secret_patterns() -> &'static Vec<Regex> {
    SECRET_PATTERNS.get_or_init(|| {
        vec![
            // OpenAI keys, including sk-proj- and similar variants
            Regex::new(r"sk-[a-zA-Z0-9\-_]{20,}").expect("Invalid OpenAI pattern"),
            // Tavily keys
            Regex::new(r"tvly-[a-zA-Z0-9\-_]{16,}").expect("Invalid Tavily pattern"),
            Regex::new(r"Bearer\s+[^\s]{20,}").expect("Invalid Bearer pattern"),
        ]
    })
}

/// Replace key-shaped substrings with `[REDACTED]`.
///
/// ```
/// use ross_engine::secrets::scrub;
///
/// let scrubbed = scrub("Invalid key tvly-abcdefghijklmnop1234");
/// assert_eq!(scrubbed, "Invalid key [REDACTED]");
/// ```
pub fn scrub(text: &str) -> String {
    let mut result = text.to_string();
    for pattern in secret_patterns() {
        result = pattern.replace_all(&result, "[REDACTED]").to_string();
    }
    result
}

/// Looks up secrets in the environment, then the OS keychain.
pub struct SecretManager {
    service_name: String,
}

impl SecretManager {
    /// The service name namespaces entries in the OS keychain.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    fn env_var_name(key: &str) -> String {
        key.to_uppercase()
    }

    /// Retrieves a secret.
    ///
    /// # Errors
    /// Returns `EngineError::SecretNotFound` if neither source has it and
    /// `EngineError::KeyringError` if the keychain cannot be queried.
    pub fn get_secret(&self, key: &str) -> Result<String, EngineError> {
        if let Ok(value) = std::env::var(Self::env_var_name(key)) {
            if !value.trim().is_empty() {
                tracing::debug!("Resolved secret '{}' from environment", key);
                return Ok(value);
            }
        }

        let entry = Entry::new(&self.service_name, key).map_err(|e| {
            EngineError::KeyringError(format!("Failed to create keyring entry: {}", e))
        })?;

        match entry.get_password() {
            Ok(secret) => {
                tracing::debug!("Retrieved secret '{}' from keychain", key);
                Ok(secret)
            }
            Err(keyring::Error::NoEntry) => Err(EngineError::SecretNotFound(key.to_string())),
            Err(e) => Err(EngineError::KeyringError(format!(
                "Failed to retrieve secret '{}': {}",
                key, e
            ))),
        }
    }

    /// Whether the secret can be resolved from either source.
    pub fn has_secret(&self, key: &str) -> bool {
        self.get_secret(key).is_ok()
    }
}

/// In-memory cache in front of a [`SecretManager`].
#[derive(Clone)]
pub struct SecretCache {
    manager: Arc<SecretManager>,
    cache: Arc<RwLock<HashMap<String, SecretString>>>,
}

impl SecretCache {
    pub fn new(manager: Arc<SecretManager>) -> Self {
        Self {
            manager,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Cache containing fixed values, bypassing env and keychain.
    pub fn with_values(values: &[(&str, &str)]) -> Self {
        let cache = values
            .iter()
            .map(|(k, v)| (k.to_string(), SecretString::new(*v)))
            .collect();
        Self {
            manager: Arc::new(SecretManager::new("ross-static")),
            cache: Arc::new(RwLock::new(cache)),
        }
    }

    pub fn get_secret(&self, key: &str) -> Result<SecretString, EngineError> {
        {
            let cache = self
                .cache
                .read()
                .map_err(|_| EngineError::KeyringError("Secret cache poisoned".to_string()))?;
            if let Some(secret) = cache.get(key) {
                return Ok(secret.clone());
            }
        }

        let secret = SecretString::new(self.manager.get_secret(key)?);

        {
            let mut cache = self
                .cache
                .write()
                .map_err(|_| EngineError::KeyringError("Secret cache poisoned".to_string()))?;
            cache.insert(key.to_string(), secret.clone());
        }

        Ok(secret)
    }
}
