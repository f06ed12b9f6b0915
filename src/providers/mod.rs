//! DNS update providers.

mod dyndns;

pub use dyndns::{DynDnsProvider, ProviderResponse};

use crate::error::DdnsError;
use crate::family::AddressFamily;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// One requested record change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    pub family: AddressFamily,
    /// Address to publish.
    pub ip: String,
    /// Last address successfully applied, if any.
    pub previous_ip: Option<String>,
}

/// Outcome category of an update attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    Success,
    Failure,
    Skipped,
}

/// Result of a DNS update operation.
#[derive(Debug)]
pub struct UpdateResult {
    pub family: AddressFamily,
    /// Previously applied address (if known).
    pub previous_ip: Option<String>,
    /// Target address.
    pub ip: String,
    pub status: UpdateStatus,
    /// Classified error if failed.
    pub error: Option<DdnsError>,
    /// Time spent on the update, retries included.
    pub latency: Duration,
    /// Timestamp of the outcome.
    pub timestamp: DateTime<Utc>,
}

impl UpdateResult {
    pub fn success(request: &UpdateRequest, latency: Duration) -> Self {
        Self::build(request, UpdateStatus::Success, None, latency)
    }

    pub fn failure(request: &UpdateRequest, error: DdnsError, latency: Duration) -> Self {
        Self::build(request, UpdateStatus::Failure, Some(error), latency)
    }

    /// No call was made because the address is already applied.
    pub fn skipped(request: &UpdateRequest) -> Self {
        Self::build(request, UpdateStatus::Skipped, None, Duration::ZERO)
    }

    fn build(
        request: &UpdateRequest,
        status: UpdateStatus,
        error: Option<DdnsError>,
        latency: Duration,
    ) -> Self {
        Self {
            family: request.family,
            previous_ip: request.previous_ip.clone(),
            ip: request.ip.clone(),
            status,
            error,
            latency,
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == UpdateStatus::Success
    }
}

/// Performs the remote record update.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DnsUpdater: Send + Sync {
    /// Publish `request.ip`. Failures are reported in the result, never panicked on.
    async fn update(&self, request: &UpdateRequest) -> UpdateResult;
}
