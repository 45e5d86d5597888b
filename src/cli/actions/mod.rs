mod run;

use crate::tls::ProbeEntry;
use std::{net::IpAddr, path::PathBuf};

/// Where chain verification takes its trust anchors from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustSource {
    /// Bundled web PKI roots
    WebPki,
    /// PEM file loaded when the action runs
    PemFile(PathBuf),
}

/// Endpoints and the settings shared by every probe of a run
#[derive(Debug)]
pub struct Batch {
    pub entries: Vec<ProbeEntry>,
    pub grace_period: f64,
    pub concurrency: usize,
    pub trust: Option<TrustSource>,
}

/// Action enum representing each possible command
#[derive(Debug)]
pub enum Action {
    /// Probe every endpoint once and print one JSON record per endpoint
    Check { batch: Batch },
    /// Re-check every `interval` seconds and export `/metrics`
    Watch {
        batch: Batch,
        interval: u16,
        listen: Option<IpAddr>,
        port: u16,
    },
}

impl Action {
    /// Execute the action
    ///
    /// # Errors
    ///
    /// Returns an error if the action fails to execute
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}
