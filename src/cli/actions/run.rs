use super::{Action, Batch, TrustSource};
use crate::{
    report::check_all,
    tls::{ProbeEntry, TrustAnchors},
};
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

/// Execute the action's business logic by delegating to the appropriate module
pub async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Check { batch } => {
            let Batch {
                entries,
                grace_period,
                concurrency,
                trust,
            } = batch;
            let entries = prepare(entries, trust).await?;

            info!(endpoints = entries.len(), concurrency, "checking endpoints");
            for check in check_all(entries, grace_period, concurrency).await {
                println!("{}", serde_json::to_string(&check.record())?);
            }

            Ok(())
        }
        Action::Watch {
            batch,
            interval,
            listen,
            port,
        } => {
            let entries = prepare(batch.entries, batch.trust).await?;
            crate::pulse::start(
                entries,
                batch.grace_period,
                batch.concurrency,
                interval,
                listen,
                port,
            )
            .await
        }
    }
}

/// Load the trust anchors once and share them with every entry
async fn prepare(
    entries: Vec<ProbeEntry>,
    trust: Option<TrustSource>,
) -> Result<Vec<ProbeEntry>> {
    let anchors = match trust {
        None => return Ok(entries),
        Some(TrustSource::WebPki) => TrustAnchors::WebPki,
        Some(TrustSource::PemFile(path)) => TrustAnchors::from_pem_file(&path).await?,
    };

    let anchors = Arc::new(anchors);
    Ok(entries
        .into_iter()
        .map(|entry| entry.with_trust_anchors(Arc::clone(&anchors)))
        .collect())
}
