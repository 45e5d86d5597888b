//! Probe TLS endpoints and classify their certificates as valid, expiring,
//! expired, invalid or error.
//!
//! - [`tls`] connects and captures the presented certificate as data
//! - [`classify`] turns a probe outcome into a lifecycle status
//! - [`report`] runs batches and builds the JSON records
//! - [`pulse`] re-checks periodically and exports Prometheus metrics

pub mod classify;
pub mod cli;
pub mod metrics;
pub mod pulse;
pub mod report;
pub mod tls;
