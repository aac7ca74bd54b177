//! Settings file loader and the resolved service settings built from it.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::parameters::{
    self, ConfigResolutionError, ConfigSource, EnvParameters, FileParameters, LayeredParameters,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub queue: Queue,
    /// Parameter values keyed by their full name, e.g. `/guestbook/db/host`.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub bind_addr: String,
}

/// JetStream layout shared by the service and the consumer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Queue {
    pub stream: String,
    pub subject: String,
    pub consumer: String,
    pub batch_size: usize,
    pub max_wait_secs: u64,
}

impl Config {
    /// Environment variables take precedence over the `parameters` map.
    pub fn parameter_source(&self) -> LayeredParameters {
        LayeredParameters::new(vec![
            Box::new(EnvParameters),
            Box::new(FileParameters::new(self.parameters.clone())),
        ])
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.bind_addr.trim().is_empty() {
        return Err(ConfigError::Invalid("app.bind_addr must be non-empty"));
    }
    if cfg.queue.stream.trim().is_empty() {
        return Err(ConfigError::Invalid("queue.stream must be non-empty"));
    }
    if cfg.queue.subject.trim().is_empty() {
        return Err(ConfigError::Invalid("queue.subject must be non-empty"));
    }
    if !subject_in_stream(&cfg.queue.stream, &cfg.queue.subject) {
        return Err(ConfigError::Invalid(
            "queue.subject must start with '<queue.stream>.' (lowercased)",
        ));
    }
    if cfg.queue.consumer.trim().is_empty() {
        return Err(ConfigError::Invalid("queue.consumer must be non-empty"));
    }
    if cfg.queue.batch_size == 0 {
        return Err(ConfigError::Invalid("queue.batch_size must be > 0"));
    }
    if cfg.queue.max_wait_secs == 0 {
        return Err(ConfigError::Invalid("queue.max_wait_secs must be > 0"));
    }
    Ok(())
}

/// The stream captures `<stream>.*` in lowercase.
pub fn stream_subjects(stream: &str) -> String {
    format!("{}.*", stream.to_ascii_lowercase())
}

fn subject_in_stream(stream: &str, subject: &str) -> bool {
    subject
        .strip_prefix(&format!("{}.", stream.to_ascii_lowercase()))
        .is_some_and(|rest| !rest.is_empty() && !rest.contains('.'))
}

/// Where the store lives.
#[derive(Clone, PartialEq, Eq)]
pub enum DatabaseTarget {
    /// Full connection URL (`postgres://…` or `sqlite:…`), from `DATABASE_URL`.
    Url(String),
    Postgres {
        host: String,
        port: u16,
        name: String,
        user: String,
        password: String,
    },
}

impl fmt::Debug for DatabaseTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseTarget::Url(url) => {
                let scheme = url.split(':').next().unwrap_or_default();
                f.debug_tuple("Url").field(&scheme).finish()
            }
            DatabaseTarget::Postgres {
                host, port, name, ..
            } => f
                .debug_struct("Postgres")
                .field("host", host)
                .field("port", port)
                .field("name", name)
                .finish_non_exhaustive(),
        }
    }
}

/// Everything the ingestion service needs, resolved once before serving.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub bind_addr: String,
    pub database: DatabaseTarget,
    pub queue_url: String,
    pub queue: Queue,
}

impl ServiceSettings {
    /// Resolve the database and queue parameters. Any failure is fatal to boot.
    pub async fn resolve(
        cfg: &Config,
        params: &dyn ConfigSource,
        database_url: Option<String>,
    ) -> Result<Self, ConfigResolutionError> {
        let database = match database_url.filter(|u| !u.trim().is_empty()) {
            Some(url) => DatabaseTarget::Url(url),
            None => resolve_postgres(params).await?,
        };
        let queue_url = params.resolve(parameters::QUEUE_URL).await?;
        Ok(Self {
            bind_addr: cfg.app.bind_addr.clone(),
            database,
            queue_url,
            queue: cfg.queue.clone(),
        })
    }
}

async fn resolve_postgres(params: &dyn ConfigSource) -> Result<DatabaseTarget, ConfigResolutionError> {
    let host = params.resolve(parameters::DB_HOST).await?;
    let name = params.resolve(parameters::DB_NAME).await?;
    let user = params.resolve(parameters::DB_USER).await?;
    let password = params.resolve(parameters::DB_PASSWORD).await?;
    let port = params.resolve(parameters::DB_PORT).await?;
    let port = port.trim().parse::<u16>().map_err(|_| {
        ConfigResolutionError::new(parameters::DB_PORT, format!("'{port}' is not a valid port"))
    })?;
    Ok(DatabaseTarget::Postgres {
        host,
        port,
        name,
        user,
        password,
    })
}

/// Example settings file.
pub fn example() -> &'static str {
    r#"app:
  bind_addr: "0.0.0.0:3000"

queue:
  stream: "GUESTBOOK"
  subject: "guestbook.entries"
  consumer: "guestbook-notifier"
  batch_size: 10
  max_wait_secs: 5

parameters:
  /guestbook/db/host: "localhost"
  /guestbook/db/name: "guestbook"
  /guestbook/db/user: "guestbook"
  /guestbook/db/password: "change-me"
  /guestbook/db/port: "5432"
  /guestbook/queue/url: "nats://localhost:4222"
  /guestbook/email/from: "guestbook@example.com"
  /guestbook/email/to: "owner@example.com"
  /guestbook/email/api-url: "https://mail.example.com/v1/send"
  /guestbook/email/api-token: "YOUR_MAIL_API_TOKEN"
"#
}
