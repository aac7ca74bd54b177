//! Named settings and secrets resolved at startup and per consumer invocation.
use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

pub const DB_HOST: &str = "/guestbook/db/host";
pub const DB_NAME: &str = "/guestbook/db/name";
pub const DB_USER: &str = "/guestbook/db/user";
pub const DB_PASSWORD: &str = "/guestbook/db/password";
pub const DB_PORT: &str = "/guestbook/db/port";
pub const QUEUE_URL: &str = "/guestbook/queue/url";
pub const EMAIL_FROM: &str = "/guestbook/email/from";
pub const EMAIL_TO: &str = "/guestbook/email/to";
pub const EMAIL_API_URL: &str = "/guestbook/email/api-url";
pub const EMAIL_API_TOKEN: &str = "/guestbook/email/api-token";

pub const DATABASE_KEYS: [&str; 5] = [DB_HOST, DB_NAME, DB_USER, DB_PASSWORD, DB_PORT];
pub const NOTIFICATION_KEYS: [&str; 5] =
    [QUEUE_URL, EMAIL_FROM, EMAIL_TO, EMAIL_API_URL, EMAIL_API_TOKEN];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to resolve parameter {key}: {reason}")]
pub struct ConfigResolutionError {
    pub key: String,
    pub reason: String,
}

impl ConfigResolutionError {
    pub fn new(key: &str, reason: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Key-value resolver for settings and secrets. Every key resolves
/// independently and may fail independently.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn resolve(&self, key: &str) -> Result<String, ConfigResolutionError>;
}

/// Parameters taken from the `parameters` map of the settings file.
#[derive(Debug, Clone, Default)]
pub struct FileParameters {
    values: BTreeMap<String, String>,
}

impl FileParameters {
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }
}

#[async_trait]
impl ConfigSource for FileParameters {
    async fn resolve(&self, key: &str) -> Result<String, ConfigResolutionError> {
        match self.values.get(key) {
            Some(v) if !v.trim().is_empty() => Ok(v.clone()),
            Some(_) => Err(ConfigResolutionError::new(key, "value is empty")),
            None => Err(ConfigResolutionError::new(key, "not present in settings file")),
        }
    }
}

/// Parameters read from the process environment.
///
/// `/guestbook/db/host` is looked up as `GUESTBOOK_DB_HOST`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvParameters;

pub fn env_var_name(key: &str) -> String {
    key.trim_start_matches('/')
        .chars()
        .map(|c| match c {
            '/' | '-' | '.' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

#[async_trait]
impl ConfigSource for EnvParameters {
    async fn resolve(&self, key: &str) -> Result<String, ConfigResolutionError> {
        let var = env_var_name(key);
        match std::env::var(&var) {
            Ok(v) if !v.trim().is_empty() => Ok(v),
            Ok(_) => Err(ConfigResolutionError::new(key, format!("{var} is empty"))),
            Err(_) => Err(ConfigResolutionError::new(key, format!("{var} is not set"))),
        }
    }
}

/// Tries each source in order and returns the first value found.
pub struct LayeredParameters {
    layers: Vec<Box<dyn ConfigSource>>,
}

impl LayeredParameters {
    pub fn new(layers: Vec<Box<dyn ConfigSource>>) -> Self {
        Self { layers }
    }
}

#[async_trait]
impl ConfigSource for LayeredParameters {
    async fn resolve(&self, key: &str) -> Result<String, ConfigResolutionError> {
        let mut reasons = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            match layer.resolve(key).await {
                Ok(v) => return Ok(v),
                Err(err) => reasons.push(err.reason),
            }
        }
        if reasons.is_empty() {
            reasons.push("no parameter sources configured".into());
        }
        Err(ConfigResolutionError::new(key, reasons.join("; ")))
    }
}

/// Mask secrets when printing resolved values.
pub fn display_value(key: &str, value: &str) -> String {
    if key.contains("password") || key.contains("token") {
        "***hidden***".to_string()
    } else {
        value.to_string()
    }
}
