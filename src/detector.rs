//! Public IP detection.

use crate::config::Config;
use crate::error::{DdnsError, Result};
use crate::family::AddressFamily;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use std::net::IpAddr;

/// Address discovered for one family during a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAddress {
    pub family: AddressFamily,
    /// Canonical textual form of the address.
    pub ip: String,
    /// Service that produced it.
    pub source: String,
}

/// Source of the current public address.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AddressSource: Send + Sync {
    /// Resolve the current public address for `family`.
    async fn resolve(&self, family: AddressFamily) -> Result<ResolvedAddress>;
}

/// IP detector with multiple fallback services per family.
pub struct IpDetector {
    client: reqwest::Client,
    ipv4_services: Vec<String>,
    ipv6_services: Vec<String>,
    retry: RetryPolicy,
}

impl IpDetector {
    /// Create a detector from configuration.
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self::with_services(
            client,
            config.ipv4_services.clone(),
            config.ipv6_services.clone(),
            config.retry_policy(),
        )
    }

    /// Create a detector with custom services.
    pub fn with_services(
        client: reqwest::Client,
        ipv4_services: Vec<String>,
        ipv6_services: Vec<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            ipv4_services,
            ipv6_services,
            retry,
        }
    }

    /// Get the discovery services configured for a family.
    pub fn services(&self, family: AddressFamily) -> &[String] {
        match family {
            AddressFamily::V4 => &self.ipv4_services,
            AddressFamily::V6 => &self.ipv6_services,
        }
    }

    /// Try a single IP detection service.
    async fn try_service(&self, url: &str, family: AddressFamily) -> Result<String> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(DdnsError::Network(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("json"));
        let text = response.text().await?;

        let ip = parse_body(&text, is_json)?;
        if !family.matches(&ip) {
            return Err(DdnsError::Network(format!(
                "{} returned {} which is not {}",
                url, ip, family
            )));
        }

        Ok(ip.to_string())
    }
}

#[async_trait]
impl AddressSource for IpDetector {
    async fn resolve(&self, family: AddressFamily) -> Result<ResolvedAddress> {
        for service in self.services(family) {
            let what = format!("{} lookup via {}", family, service);
            match self
                .retry
                .run(&what, || self.try_service(service, family), |_| true)
                .await
            {
                Ok(ip) => {
                    tracing::debug!("Detected {} {} from {}", family, ip, service);
                    return Ok(ResolvedAddress {
                        family,
                        ip,
                        source: service.clone(),
                    });
                }
                Err(e) => {
                    tracing::warn!("{} service {} failed: {}", family, service, e);
                }
            }
        }

        Err(DdnsError::ResolutionFailed {
            family,
            reason: format!(
                "all {} detection services failed",
                self.services(family).len()
            ),
        })
    }
}

/// Extract an address from a plain-text or JSON body.
fn parse_body(text: &str, is_json: bool) -> Result<IpAddr> {
    let trimmed = text.trim();

    if is_json || trimmed.starts_with('{') {
        let value: serde_json::Value = serde_json::from_str(trimmed)?;
        let ip_str = ["ip", "origin", "address"]
            .iter()
            .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
            .ok_or_else(|| DdnsError::Network(format!("No address in response: {}", trimmed)))?;
        return ip_str
            .trim()
            .parse()
            .map_err(|_| DdnsError::Network(format!("Invalid IP response: {}", ip_str)));
    }

    trimmed
        .parse()
        .map_err(|_| DdnsError::Network(format!("Invalid IP response: {}", trimmed)))
}
