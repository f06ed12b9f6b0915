//! Run-time counters and periodic summaries.

use crate::error::DdnsError;
use crate::family::AddressFamily;
use crate::providers::{UpdateResult, UpdateStatus};
use chrono::{DateTime, Utc};
use std::fmt;

/// Counters accumulated over the process lifetime. Owned by the controller.
#[derive(Debug, Clone)]
pub struct Metrics {
    started_at: DateTime<Utc>,
    cycles: u64,
    updates_ok: u64,
    updates_failed: u64,
    updates_skipped: u64,
    resolution_failures: u64,
    last_ipv4: Option<String>,
    last_ipv6: Option<String>,
    last_update_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    consecutive_failures: u64,
}

/// Read-only view of [`Metrics`] at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub started_at: DateTime<Utc>,
    pub uptime: chrono::Duration,
    pub cycles: u64,
    pub updates_ok: u64,
    pub updates_failed: u64,
    pub updates_skipped: u64,
    pub resolution_failures: u64,
    pub last_ipv4: Option<String>,
    pub last_ipv6: Option<String>,
    pub last_update_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u64,
}

impl Metrics {
    /// Create metrics starting now.
    pub fn new() -> Self {
        Self::with_start(Utc::now())
    }

    /// Create metrics with an explicit start time.
    pub fn with_start(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            cycles: 0,
            updates_ok: 0,
            updates_failed: 0,
            updates_skipped: 0,
            resolution_failures: 0,
            last_ipv4: None,
            last_ipv6: None,
            last_update_at: None,
            last_error: None,
            consecutive_failures: 0,
        }
    }

    /// Count one completed cycle.
    pub fn record_check(&mut self) {
        self.cycles += 1;
    }

    /// Get the number of counted cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Count an update outcome.
    pub fn record_update(&mut self, result: &UpdateResult) {
        match result.status {
            UpdateStatus::Success => {
                self.updates_ok += 1;
                self.consecutive_failures = 0;
                self.last_update_at = Some(result.timestamp);
                self.last_error = None;
                match result.family {
                    AddressFamily::V4 => self.last_ipv4 = Some(result.ip.clone()),
                    AddressFamily::V6 => self.last_ipv6 = Some(result.ip.clone()),
                }
            }
            UpdateStatus::Failure => {
                self.updates_failed += 1;
                self.consecutive_failures += 1;
                self.last_error = Some(
                    result
                        .error
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_else(|| "unknown error".to_string()),
                );
            }
            UpdateStatus::Skipped => self.updates_skipped += 1,
        }
    }

    /// Count a family that could not be resolved this cycle.
    pub fn record_resolution_failure(&mut self, error: &DdnsError) {
        self.resolution_failures += 1;
        self.last_error = Some(error.to_string());
    }

    /// Count a family left unchecked because shutdown interrupted its cycle.
    pub fn record_abandoned(&mut self) {
        self.updates_skipped += 1;
    }

    /// Get a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.snapshot_at(Utc::now())
    }

    /// Get a snapshot with uptime measured at `now`.
    pub fn snapshot_at(&self, now: DateTime<Utc>) -> MetricsSnapshot {
        MetricsSnapshot {
            started_at: self.started_at,
            uptime: now - self.started_at,
            cycles: self.cycles,
            updates_ok: self.updates_ok,
            updates_failed: self.updates_failed,
            updates_skipped: self.updates_skipped,
            resolution_failures: self.resolution_failures,
            last_ipv4: self.last_ipv4.clone(),
            last_ipv6: self.last_ipv6.clone(),
            last_update_at: self.last_update_at,
            last_error: self.last_error.clone(),
            consecutive_failures: self.consecutive_failures,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSnapshot {
    /// Outcomes recorded across all families.
    pub fn outcomes(&self) -> u64 {
        self.updates_ok + self.updates_failed + self.updates_skipped + self.resolution_failures
    }

    /// Last update time, failure streak and last error, for the final summary.
    pub fn details(&self) -> String {
        let last_update = self
            .last_update_at
            .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "never".to_string());
        format!(
            "Last update: {} | Failure streak: {} | Last error: {}",
            last_update,
            self.consecutive_failures,
            self.last_error.as_deref().unwrap_or("none")
        )
    }
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hours = self.uptime.num_seconds().max(0) as f64 / 3600.0;
        write!(
            f,
            "Uptime: {:.1}h | Checks: {} | Updates: {} OK, {} KO, {} skip | Unresolved: {} | IPv4: {} | IPv6: {}",
            hours,
            self.cycles,
            self.updates_ok,
            self.updates_failed,
            self.updates_skipped,
            self.resolution_failures,
            self.last_ipv4.as_deref().unwrap_or("N/A"),
            self.last_ipv6.as_deref().unwrap_or("N/A"),
        )
    }
}
