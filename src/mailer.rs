use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

/// A plain-text message ready to hand to the email transport.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
}

#[async_trait]
pub trait EmailTransport: Send + Sync {
    /// Send one message; returns the provider's message id.
    async fn send(&self, email: &OutgoingEmail) -> Result<String>;
}

/// Client for a JSON mail-sending API authenticated with a bearer token.
#[derive(Clone)]
pub struct HttpMailer {
    http: Client,
    endpoint: Url,
    token: String,
}

impl fmt::Debug for HttpMailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpMailer")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct SendResponse {
    id: String,
}

impl HttpMailer {
    pub fn new(endpoint: &str, token: String) -> Result<Self> {
        let endpoint = Url::parse(endpoint).context("invalid mail API URL")?;
        let http = Client::builder()
            .user_agent(concat!("guestbook/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            endpoint,
            token,
        })
    }

    pub fn build_request(&self, email: &OutgoingEmail) -> Result<reqwest::Request> {
        self.http
            .post(self.endpoint.clone())
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Content-Type", "application/json")
            .json(email)
            .build()
            .context("failed to build mail request")
    }
}

#[async_trait]
impl EmailTransport for HttpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<String> {
        let request = self.build_request(email)?;
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach mail API")?;

        let status = res.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!(%status, "rate limited by mail API");
            return Err(anyhow!("received 429 from mail API: {}", body));
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(%status, body = %body, "mail API error");
            return Err(anyhow!("mail API error {}: {}", status, body));
        }

        let payload: SendResponse = res.json().await.context("invalid mail API response JSON")?;
        info!(message_id = %payload.id, "email accepted by mail API");
        Ok(payload.id)
    }
}
