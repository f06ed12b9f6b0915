//! # ddns-updater
//!
//! Keeps a dyndns2 record (Infomaniak by default) pointing at this machine's
//! public address.
//!
//! ## Features
//!
//! - IPv4 and optional IPv6 tracking
//! - Failover across several IP discovery services
//! - Bounded retries with exponential backoff
//! - Updates only when the address actually changed
//! - Graceful shutdown on SIGINT/SIGTERM and periodic summaries
//!
//! ## Usage
//!
//! ```bash
//! export DDNS_HOSTNAME=home.example.com
//! export DDNS_USERNAME=alice
//! export DDNS_PASSWORD=secret
//!
//! # Run the update loop
//! ddns-updater run
//!
//! # Single check, then exit
//! ddns-updater check
//! ```

pub mod config;
pub mod controller;
pub mod decision;
pub mod detector;
pub mod error;
pub mod family;
pub mod metrics;
pub mod providers;
pub mod retry;

pub use config::Config;
pub use controller::Controller;
pub use detector::IpDetector;
pub use error::{DdnsError, Result};
pub use family::AddressFamily;
