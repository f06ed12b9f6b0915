//! Update loop controller.
//!
//! Drives one check cycle per interval. Each cycle walks the enabled
//! families in order:
//!
//! 1. Resolve the current public address
//! 2. Compare it with the last address successfully applied
//! 3. Call the provider if it changed
//! 4. Record the outcome
//!
//! Per-family errors never leave the cycle. A failed update leaves the
//! applied address untouched so the next cycle attempts it again.

use crate::config::Config;
use crate::decision::{decide, normalize, Decision};
use crate::detector::{AddressSource, IpDetector};
use crate::error::{DdnsError, Result};
use crate::family::AddressFamily;
use crate::metrics::Metrics;
use crate::providers::{DnsUpdater, DynDnsProvider, UpdateRequest, UpdateResult, UpdateStatus};
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// A summary is logged every this many cycles.
pub const SUMMARY_EVERY: u64 = 10;

/// Whether the periodic summary is due after `cycles` completed cycles.
pub fn should_summarize(cycles: u64) -> bool {
    cycles > 0 && cycles % SUMMARY_EVERY == 0
}

/// Lifecycle of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

/// Outcome of the most recent check of a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LastResult {
    #[default]
    Unknown,
    Ok,
    Failed,
    Skipped,
}

/// Per-family state, kept in memory for the process lifetime.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateState {
    /// Address last published successfully.
    pub last_applied: Option<String>,
    pub last_check: Option<DateTime<Utc>>,
    pub last_result: LastResult,
}

/// What happened to one family during a cycle.
#[derive(Debug)]
pub enum FamilyOutcome {
    /// No address could be discovered; nothing was sent.
    Unresolved(DdnsError),
    /// An address was discovered and the update was applied, failed or skipped.
    Checked(UpdateResult),
}

impl FamilyOutcome {
    /// Whether the family was left unresolved or its update failed.
    pub fn is_failure(&self) -> bool {
        match self {
            FamilyOutcome::Unresolved(_) => true,
            FamilyOutcome::Checked(result) => result.status == UpdateStatus::Failure,
        }
    }
}

pub struct Controller {
    config: Config,
    source: Box<dyn AddressSource>,
    updater: Box<dyn DnsUpdater>,
    metrics: Metrics,
    ipv4: UpdateState,
    ipv6: UpdateState,
    phase: Phase,
}

impl Controller {
    /// Build a controller talking to the configured services.
    pub fn new(config: Config) -> Result<Self> {
        let config = config.validated()?;
        let client = config.http_client()?;
        let source = IpDetector::new(client.clone(), &config);
        let updater = DynDnsProvider::new(client, &config);

        Self::with_components(config, Box::new(source), Box::new(updater))
    }

    /// Build a controller around custom address source and updater.
    pub fn with_components(
        config: Config,
        source: Box<dyn AddressSource>,
        updater: Box<dyn DnsUpdater>,
    ) -> Result<Self> {
        let config = config.validated()?;

        Ok(Self {
            config,
            source,
            updater,
            metrics: Metrics::new(),
            ipv4: UpdateState::default(),
            ipv6: UpdateState::default(),
            phase: Phase::Starting,
        })
    }

    /// Get the validated configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the run-time metrics.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Get the current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Get the update state of a family.
    pub fn state(&self, family: AddressFamily) -> &UpdateState {
        match family {
            AddressFamily::V4 => &self.ipv4,
            AddressFamily::V6 => &self.ipv6,
        }
    }

    fn state_mut(&mut self, family: AddressFamily) -> &mut UpdateState {
        match family {
            AddressFamily::V4 => &mut self.ipv4,
            AddressFamily::V6 => &mut self.ipv6,
        }
    }

    /// Run cycles until `shutdown` turns true or its sender is dropped.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        self.phase = Phase::Running;
        info!("Starting DDNS updater for {}", self.config.hostname);
        info!(
            "IPv6: {} | interval: {}s",
            if self.config.enable_ipv6 { "enabled" } else { "disabled" },
            self.config.check_interval_secs
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            if self.cycle(Some(&shutdown)).await.is_none() {
                break;
            }

            if should_summarize(self.metrics.cycles()) {
                info!("{}", self.metrics.snapshot());
            }

            let stop = tokio::select! {
                _ = tokio::time::sleep(self.config.interval()) => false,
                changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
            };
            if stop {
                break;
            }
        }

        self.begin_shutdown();
        self.phase = Phase::Stopped;
        let snapshot = self.metrics.snapshot();
        info!("Service stopped. {} | {}", snapshot, snapshot.details());
        Ok(())
    }

    fn begin_shutdown(&mut self) {
        if self.phase != Phase::ShuttingDown {
            self.phase = Phase::ShuttingDown;
            info!("Shutdown requested, no further cycles");
        }
    }

    /// Run one full cycle over every enabled family.
    pub async fn run_cycle(&mut self) -> Vec<FamilyOutcome> {
        self.cycle(None).await.unwrap_or_default()
    }

    /// Returns `None` when shutdown interrupted the cycle between families.
    /// Families left unchecked are counted as skipped so the cycle still
    /// accounts for every enabled family.
    async fn cycle(
        &mut self,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Option<Vec<FamilyOutcome>> {
        let families = self.config.families();
        let mut outcomes = Vec::with_capacity(families.len());

        for (done, &family) in families.iter().enumerate() {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                self.begin_shutdown();
                if done > 0 {
                    info!("Abandoning cycle before {}", family);
                    for _ in done..families.len() {
                        self.metrics.record_abandoned();
                    }
                    self.metrics.record_check();
                }
                return None;
            }
            outcomes.push(self.check_family(family).await);
        }

        self.metrics.record_check();
        Some(outcomes)
    }

    /// Resolve, decide, update and record for a single family.
    pub async fn check_family(&mut self, family: AddressFamily) -> FamilyOutcome {
        debug!("--- Checking {} ---", family);

        let resolved = match self.source.resolve(family).await {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!("Could not determine public {} address: {}", family, e);
                self.metrics.record_resolution_failure(&e);
                let state = self.state_mut(family);
                state.last_check = Some(Utc::now());
                state.last_result = LastResult::Skipped;
                return FamilyOutcome::Unresolved(e);
            }
        };

        info!("Public {} address: {} (via {})", family, resolved.ip, resolved.source);

        let request = UpdateRequest {
            family,
            ip: normalize(&resolved.ip).to_string(),
            previous_ip: self.state(family).last_applied.clone(),
        };

        let result = match decide(request.previous_ip.as_deref(), &request.ip) {
            Decision::Skip => {
                info!("{} address unchanged, no update needed", family);
                UpdateResult::skipped(&request)
            }
            Decision::Update => self.updater.update(&request).await,
        };

        self.apply(&result);
        self.metrics.record_update(&result);
        FamilyOutcome::Checked(result)
    }

    fn apply(&mut self, result: &UpdateResult) {
        let hostname = self.config.hostname.clone();
        let state = self.state_mut(result.family);
        state.last_check = Some(result.timestamp);

        match result.status {
            UpdateStatus::Success => {
                debug!("{} update took {:?}", result.family, result.latency);
                state.last_applied = Some(result.ip.clone());
                state.last_result = LastResult::Ok;
            }
            UpdateStatus::Skipped => {
                state.last_result = LastResult::Skipped;
            }
            UpdateStatus::Failure => {
                state.last_result = LastResult::Failed;
                match &result.error {
                    Some(e) if e.is_terminal() => error!(
                        "{} update of {} rejected: {}; retrying next cycle",
                        result.family, hostname, e
                    ),
                    Some(e) => warn!(
                        "{} update of {} failed after retries: {}",
                        result.family, hostname, e
                    ),
                    None => warn!("{} update of {} failed", result.family, hostname),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{MockAddressSource, ResolvedAddress};
    use crate::providers::MockDnsUpdater;
    use mockall::predicate::eq;
    use std::collections::VecDeque;
    use std::time::Duration;

    fn config(ipv6: bool) -> Config {
        Config {
            enable_ipv6: ipv6,
            ..Config::example()
        }
    }

    fn resolved(family: AddressFamily, ip: &str) -> ResolvedAddress {
        ResolvedAddress {
            family,
            ip: ip.to_string(),
            source: "mock".to_string(),
        }
    }

    /// Source returning the given IPv4 addresses in order; `None` fails resolution.
    fn sequence(ips: &[Option<&str>]) -> MockAddressSource {
        let mut queue: VecDeque<Option<String>> =
            ips.iter().map(|ip| ip.map(str::to_string)).collect();
        let mut source = MockAddressSource::new();
        source
            .expect_resolve()
            .with(eq(AddressFamily::V4))
            .times(ips.len())
            .returning(move |family| match queue.pop_front().flatten() {
                Some(ip) => Ok(resolved(family, &ip)),
                None => Err(DdnsError::ResolutionFailed {
                    family,
                    reason: "all sources failed".to_string(),
                }),
            });
        source
    }

    fn good_updater(times: usize) -> MockDnsUpdater {
        let mut updater = MockDnsUpdater::new();
        updater
            .expect_update()
            .times(times)
            .returning(|req| UpdateResult::success(req, Duration::from_millis(1)));
        updater
    }

    fn controller(source: MockAddressSource, updater: MockDnsUpdater) -> Controller {
        Controller::with_components(config(false), Box::new(source), Box::new(updater)).unwrap()
    }

    #[test]
    fn test_invalid_config_never_starts() {
        let mut bad = config(false);
        bad.check_interval_secs = 5;
        let result = Controller::with_components(
            bad,
            Box::new(MockAddressSource::new()),
            Box::new(MockDnsUpdater::new()),
        );
        assert!(matches!(result, Err(DdnsError::Config(_))));
    }

    #[tokio::test]
    async fn test_first_cycle_always_updates() {
        let mut ctrl = controller(sequence(&[Some("203.0.113.10")]), good_updater(1));
        assert_eq!(ctrl.state(AddressFamily::V4).last_result, LastResult::Unknown);

        let outcomes = ctrl.run_cycle().await;

        assert_eq!(outcomes.len(), 1);
        let state = ctrl.state(AddressFamily::V4);
        assert_eq!(state.last_applied.as_deref(), Some("203.0.113.10"));
        assert_eq!(state.last_result, LastResult::Ok);
        assert!(state.last_check.is_some());
        assert_eq!(ctrl.metrics().snapshot().updates_ok, 1);
    }

    #[tokio::test]
    async fn test_change_then_unchanged() {
        let source = sequence(&[Some("203.0.113.10"), Some("203.0.113.42"), Some("203.0.113.42")]);
        let mut updater = MockDnsUpdater::new();
        updater
            .expect_update()
            .withf(|req| req.ip == "203.0.113.10" && req.previous_ip.is_none())
            .times(1)
            .returning(|req| UpdateResult::success(req, Duration::ZERO));
        updater
            .expect_update()
            .withf(|req| {
                req.ip == "203.0.113.42" && req.previous_ip.as_deref() == Some("203.0.113.10")
            })
            .times(1)
            .returning(|req| UpdateResult::success(req, Duration::ZERO));
        let mut ctrl = controller(source, updater);

        ctrl.run_cycle().await;
        ctrl.run_cycle().await;
        assert_eq!(
            ctrl.state(AddressFamily::V4).last_applied.as_deref(),
            Some("203.0.113.42")
        );
        assert_eq!(ctrl.metrics().snapshot().updates_ok, 2);

        ctrl.run_cycle().await;
        let snap = ctrl.metrics().snapshot();
        assert_eq!(snap.updates_ok, 2);
        assert_eq!(snap.updates_skipped, 1);
        assert_eq!(ctrl.state(AddressFamily::V4).last_result, LastResult::Skipped);
    }

    #[tokio::test]
    async fn test_terminal_failure_retried_next_cycle() {
        let source = sequence(&[Some("203.0.113.42"), Some("203.0.113.42")]);
        let mut updater = MockDnsUpdater::new();
        updater
            .expect_update()
            .withf(|req| req.ip == "203.0.113.42")
            .times(2)
            .returning(|req| {
                UpdateResult::failure(
                    req,
                    DdnsError::TerminalUpdate {
                        token: "badauth".to_string(),
                        message: "invalid credentials".to_string(),
                    },
                    Duration::ZERO,
                )
            });
        let mut ctrl = controller(source, updater);

        ctrl.run_cycle().await;
        let state = ctrl.state(AddressFamily::V4);
        assert_eq!(state.last_applied, None);
        assert_eq!(state.last_result, LastResult::Failed);

        ctrl.run_cycle().await;
        let snap = ctrl.metrics().snapshot();
        assert_eq!(snap.updates_failed, 2);
        assert_eq!(snap.updates_ok, 0);
        assert_eq!(snap.cycles, 2);
    }

    #[tokio::test]
    async fn test_failed_update_keeps_previous_address() {
        let source = sequence(&[Some("203.0.113.10"), Some("203.0.113.42"), Some("203.0.113.42")]);
        let mut calls = 0;
        let mut updater = MockDnsUpdater::new();
        updater.expect_update().times(3).returning(move |req| {
            calls += 1;
            if calls == 2 {
                UpdateResult::failure(
                    req,
                    DdnsError::TransientUpdate("911".to_string()),
                    Duration::ZERO,
                )
            } else {
                UpdateResult::success(req, Duration::ZERO)
            }
        });
        let mut ctrl = controller(source, updater);

        ctrl.run_cycle().await;
        ctrl.run_cycle().await;
        assert_eq!(
            ctrl.state(AddressFamily::V4).last_applied.as_deref(),
            Some("203.0.113.10")
        );

        ctrl.run_cycle().await;
        assert_eq!(
            ctrl.state(AddressFamily::V4).last_applied.as_deref(),
            Some("203.0.113.42")
        );
        let snap = ctrl.metrics().snapshot();
        assert_eq!((snap.updates_ok, snap.updates_failed), (2, 1));
    }

    #[tokio::test]
    async fn test_resolution_failure_skips_update() {
        let source = sequence(&[Some("203.0.113.10"), None]);
        let mut ctrl = controller(source, good_updater(1));

        ctrl.run_cycle().await;
        let outcomes = ctrl.run_cycle().await;

        assert!(matches!(outcomes[0], FamilyOutcome::Unresolved(_)));
        assert!(outcomes[0].is_failure());
        assert_eq!(
            ctrl.state(AddressFamily::V4).last_applied.as_deref(),
            Some("203.0.113.10")
        );
        let snap = ctrl.metrics().snapshot();
        assert_eq!(snap.resolution_failures, 1);
        assert_eq!(snap.outcomes(), snap.cycles);
    }

    #[tokio::test]
    async fn test_both_families_accounted() {
        let mut source = MockAddressSource::new();
        source
            .expect_resolve()
            .with(eq(AddressFamily::V4))
            .times(3)
            .returning(|family| Ok(resolved(family, "203.0.113.42")));
        source
            .expect_resolve()
            .with(eq(AddressFamily::V6))
            .times(3)
            .returning(|family| Ok(resolved(family, "2001:db8::42")));
        let mut ctrl = Controller::with_components(
            config(true),
            Box::new(source),
            Box::new(good_updater(2)),
        )
        .unwrap();

        let mut previous = ctrl.metrics().snapshot();
        for _ in 0..3 {
            let outcomes = ctrl.run_cycle().await;
            assert_eq!(outcomes.len(), 2);

            let snap = ctrl.metrics().snapshot();
            assert!(snap.updates_ok >= previous.updates_ok);
            assert!(snap.updates_skipped >= previous.updates_skipped);
            assert_eq!(snap.outcomes(), snap.cycles * 2);
            previous = snap;
        }

        assert_eq!(previous.updates_ok, 2);
        assert_eq!(previous.updates_skipped, 4);
        assert_eq!(previous.last_ipv6.as_deref(), Some("2001:db8::42"));
    }

    #[tokio::test]
    async fn test_shutdown_before_start_runs_no_cycle() {
        let mut ctrl = controller(MockAddressSource::new(), MockDnsUpdater::new());
        let (tx, rx) = watch::channel(true);

        ctrl.run(rx).await.unwrap();

        assert_eq!(ctrl.phase(), Phase::Stopped);
        assert_eq!(ctrl.metrics().cycles(), 0);
        drop(tx);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_sleep() {
        let (tx, rx) = watch::channel(false);
        let mut source = MockAddressSource::new();
        source.expect_resolve().times(1).returning(move |family| {
            let _ = tx.send(true);
            Ok(resolved(family, "203.0.113.42"))
        });
        let mut ctrl = controller(source, good_updater(1));

        let finished = tokio::time::timeout(Duration::from_secs(5), ctrl.run(rx)).await;

        assert!(finished.is_ok(), "run should stop without waiting the interval");
        assert_eq!(ctrl.phase(), Phase::Stopped);
        assert_eq!(ctrl.metrics().cycles(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_between_families_abandons_cycle() {
        let (tx, rx) = watch::channel(false);
        let mut source = MockAddressSource::new();
        source
            .expect_resolve()
            .with(eq(AddressFamily::V4))
            .times(1)
            .returning(move |family| {
                let _ = tx.send(true);
                Ok(resolved(family, "203.0.113.42"))
            });
        source
            .expect_resolve()
            .with(eq(AddressFamily::V6))
            .never();
        let mut ctrl = Controller::with_components(
            config(true),
            Box::new(source),
            Box::new(good_updater(1)),
        )
        .unwrap();

        ctrl.run(rx).await.unwrap();

        let snap = ctrl.metrics().snapshot();
        assert_eq!(snap.cycles, 1);
        assert_eq!(snap.updates_ok, 1);
        assert_eq!(snap.updates_skipped, 1);
        assert_eq!(snap.outcomes(), snap.cycles * 2);
        assert_eq!(
            ctrl.state(AddressFamily::V4).last_applied.as_deref(),
            Some("203.0.113.42")
        );
        assert_eq!(ctrl.state(AddressFamily::V6), &UpdateState::default());
    }

    #[tokio::test]
    async fn test_shutdown_seen_in_cycle_enters_shutting_down() {
        let mut ctrl = controller(MockAddressSource::new(), MockDnsUpdater::new());
        let (_tx, rx) = watch::channel(true);

        assert!(ctrl.cycle(Some(&rx)).await.is_none());

        assert_eq!(ctrl.phase(), Phase::ShuttingDown);
        assert_eq!(ctrl.metrics().cycles(), 0);
        assert_eq!(ctrl.metrics().snapshot().outcomes(), 0);
    }

    #[test]
    fn test_summary_every_ten_cycles() {
        assert!(!should_summarize(0));
        for cycles in 1..SUMMARY_EVERY {
            assert!(!should_summarize(cycles), "no summary at cycle {}", cycles);
        }
        assert!(should_summarize(10));
        assert!(!should_summarize(11));
        assert!(!should_summarize(19));
        assert!(should_summarize(20));
    }
}
