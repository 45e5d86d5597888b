use crate::{
    classify::{ClassificationResult, Status, classify},
    tls::{ProbeEntry, ProbeOutcome, probe},
};
use chrono::{DateTime, SecondsFormat, Utc};
use futures::{StreamExt, stream};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Endpoint echoed back for correlation
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

/// One result record per probed endpoint
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CheckRecord {
    /// ISO-8601 instant of the evaluation
    pub date: String,
    pub servername: String,
    pub status: Status,
    /// ISO-8601, empty when `status` is `error`
    pub valid_to: String,
    /// ISO-8601, empty when `status` is `error`
    pub grace_date: String,
    pub endpoint: Endpoint,
}

impl CheckRecord {
    #[must_use]
    pub fn new(result: &ClassificationResult, entry: &ProbeEntry) -> Self {
        Self {
            date: iso8601(result.observed_at),
            servername: result.servername.clone(),
            status: result.status,
            valid_to: result.valid_to.map(iso8601).unwrap_or_default(),
            grace_date: result.grace_threshold.map(iso8601).unwrap_or_default(),
            endpoint: Endpoint {
                host: entry.host.clone(),
                port: entry.port,
            },
        }
    }
}

/// Everything produced for one endpoint
#[derive(Debug, Clone)]
pub struct Check {
    pub entry: ProbeEntry,
    pub outcome: ProbeOutcome,
    pub result: ClassificationResult,
    /// Wall time spent probing
    pub elapsed: std::time::Duration,
}

impl Check {
    #[must_use]
    pub fn record(&self) -> CheckRecord {
        CheckRecord::new(&self.result, &self.entry)
    }
}

/// Probe one endpoint and classify the outcome.
///
/// "now" is sampled once, after the probe returns, and used for the whole
/// classification.
pub async fn check_endpoint(entry: ProbeEntry, grace_period: f64) -> Check {
    let started = Instant::now();
    let outcome = probe(&entry).await;
    let elapsed = started.elapsed();

    let result = classify(&outcome, grace_period, Utc::now());

    Check {
        entry,
        outcome,
        result,
        elapsed,
    }
}

/// Check many endpoints with at most `concurrency` probes in flight.
///
/// Results keep the order of `entries`; every entry yields exactly one check.
pub async fn check_all(
    entries: Vec<ProbeEntry>,
    grace_period: f64,
    concurrency: usize,
) -> Vec<Check> {
    stream::iter(entries)
        .map(|entry| check_endpoint(entry, grace_period))
        .buffered(concurrency.max(1))
        .collect()
        .await
}

fn iso8601(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}
