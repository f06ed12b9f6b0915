//! dyndns2 protocol provider (Infomaniak, DNS-O-Matic and compatibles).

use super::{DnsUpdater, UpdateRequest, UpdateResult};
use crate::config::Config;
use crate::error::{DdnsError, Result};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Instant;

/// Status token returned by a dyndns2 endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderResponse {
    /// `good`: record updated.
    Good,
    /// `nochg`: record already had this address.
    NoChange,
    BadAuth,
    NoHost,
    Abuse,
    BadAgent,
    /// `911`: provider-side trouble, try again later.
    ServerError,
    Unrecognized(String),
}

impl ProviderResponse {
    /// Parse the first word of a response body, case-insensitively.
    pub fn parse(body: &str) -> Self {
        let token = body
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_lowercase();

        match token.as_str() {
            "good" => ProviderResponse::Good,
            "nochg" => ProviderResponse::NoChange,
            "badauth" => ProviderResponse::BadAuth,
            "nohost" => ProviderResponse::NoHost,
            "abuse" => ProviderResponse::Abuse,
            "badagent" => ProviderResponse::BadAgent,
            "911" => ProviderResponse::ServerError,
            _ => ProviderResponse::Unrecognized(body.trim().to_string()),
        }
    }

    /// Map a response onto success, a terminal rejection or a transient failure.
    pub fn classify(self, status: StatusCode) -> Result<ProviderResponse> {
        let terminal = |token: &str, message: &str| DdnsError::TerminalUpdate {
            token: token.to_string(),
            message: message.to_string(),
        };

        match self {
            ProviderResponse::Good | ProviderResponse::NoChange if status.is_success() => Ok(self),
            ProviderResponse::BadAuth => Err(terminal("badauth", "invalid credentials")),
            ProviderResponse::NoHost => Err(terminal("nohost", "hostname not registered for dynamic DNS")),
            ProviderResponse::Abuse => Err(terminal("abuse", "update blocked for abuse or rate limiting")),
            ProviderResponse::BadAgent => Err(terminal("badagent", "user agent rejected")),
            ProviderResponse::ServerError => Err(DdnsError::TransientUpdate(
                "provider reported a server error (911)".to_string(),
            )),
            ProviderResponse::Unrecognized(body) => Err(DdnsError::TransientUpdate(format!(
                "unexpected response (HTTP {}): {:?}",
                status.as_u16(),
                body
            ))),
            ProviderResponse::Good | ProviderResponse::NoChange => Err(
                DdnsError::TransientUpdate(format!("update endpoint returned HTTP {}", status)),
            ),
        }
    }
}

/// dyndns2 update client.
pub struct DynDnsProvider {
    client: reqwest::Client,
    base_url: String,
    hostname: String,
    username: String,
    password: String,
    retry: RetryPolicy,
}

impl DynDnsProvider {
    /// Create a provider from configuration.
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self::with_base_url(
            client,
            config.update_url.clone(),
            config.hostname.clone(),
            config.username.clone(),
            config.password.clone(),
            config.retry_policy(),
        )
    }

    /// Create with a custom update endpoint.
    pub fn with_base_url(
        client: reqwest::Client,
        base_url: String,
        hostname: String,
        username: String,
        password: String,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            base_url,
            hostname,
            username,
            password,
            retry,
        }
    }

    /// Single update attempt.
    async fn send(&self, ip: &str) -> Result<ProviderResponse> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("hostname", self.hostname.as_str()), ("myip", ip)])
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        tracing::debug!("Update response [{}]: {}", status.as_u16(), text.trim());

        ProviderResponse::parse(&text).classify(status)
    }
}

#[async_trait]
impl DnsUpdater for DynDnsProvider {
    async fn update(&self, request: &UpdateRequest) -> UpdateResult {
        tracing::info!(
            "Updating {} {}: {} -> {}",
            self.hostname,
            request.family,
            request.previous_ip.as_deref().unwrap_or("unknown"),
            request.ip
        );

        let started = Instant::now();
        let what = format!("{} update of {}", request.family, self.hostname);
        let outcome = self
            .retry
            .run(&what, || self.send(&request.ip), DdnsError::is_transient)
            .await;

        match outcome {
            Ok(ProviderResponse::NoChange) => {
                tracing::info!("{} already points to {}", self.hostname, request.ip);
                UpdateResult::success(request, started.elapsed())
            }
            Ok(_) => {
                tracing::info!("{} updated to {}", self.hostname, request.ip);
                UpdateResult::success(request, started.elapsed())
            }
            Err(e) => UpdateResult::failure(request, e, started.elapsed()),
        }
    }
}
