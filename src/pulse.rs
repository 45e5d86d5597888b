use crate::{
    classify::{ClassificationResult, Status},
    metrics::{
        CERT_EXPIRY_DAYS, CERT_GRACE_THRESHOLD_SECONDS, CERT_STATUS, CERT_VALID_TO_SECONDS,
        ITERATIONS_TOTAL, LAST_RUNTIME_MS, PANICS_RECOVERED, PROBE_DURATION, PROBE_ERRORS,
        TLS_INFO, encode_metrics,
    },
    report::{Check, check_all},
    tls::{CipherInfo, ProbeEntry},
};
use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{Duration, Utc};
use futures::FutureExt;
use std::{collections::HashMap, net::IpAddr};
use tokio::{net::TcpListener, task, time};
use tracing::{error, info};

/// Start watch mode: periodic checks plus the `/metrics` endpoint
///
/// # Errors
///
/// Returns an error if the service fails to bind to the port or the check
/// loop stops
pub async fn start(
    entries: Vec<ProbeEntry>,
    grace_period: f64,
    concurrency: usize,
    interval: u16,
    listen: Option<IpAddr>,
    port: u16,
) -> anyhow::Result<()> {
    let app = Router::new().route("/metrics", get(metrics_handler));

    // Bind to socket with smart fallback
    let (listener, bind_addr) = match listen {
        Some(addr) => {
            // Explicit address specified - bind to it
            let socket_addr = std::net::SocketAddr::new(addr, port);
            let listener = TcpListener::bind(socket_addr).await?;
            (listener, socket_addr.to_string())
        }
        None => {
            // Auto mode: try IPv6 first, fallback to IPv4
            if let Ok(l) = TcpListener::bind(format!("[::]:{port}")).await {
                (l, format!("[::]:{port}"))
            } else {
                let socket_addr = format!("0.0.0.0:{port}");
                (TcpListener::bind(&socket_addr).await?, socket_addr)
            }
        }
    };

    info!(
        listen = %bind_addr,
        interval,
        endpoints = entries.len(),
        grace_period,
        "watch mode started"
    );

    // keep JoinHandle to detect task failures
    let monitor_handle =
        task::spawn(async move { run_loop(&entries, grace_period, concurrency, interval).await });

    let server = axum::serve(listener, app.into_make_service());

    // Race between normal operation and monitoring task failure
    tokio::select! {
        result = server => {
            result?;
        }
        result = monitor_handle => {
            match result {
                Ok(()) => {
                    error!("check loop exited unexpectedly");
                    anyhow::bail!("Check loop stopped");
                }
                Err(e) => {
                    error!("check loop panicked: {e}");
                    anyhow::bail!("Check loop panicked: {e}");
                }
            }
        }
    }

    Ok(())
}

async fn metrics_handler() -> impl IntoResponse {
    match encode_metrics() {
        Ok(buffer) => (StatusCode::OK, buffer),
        Err(e) => {
            error!("{e}");
            (StatusCode::INTERNAL_SERVER_ERROR, Vec::new())
        }
    }
}

#[inline]
fn remaining_sleep_duration(wait_time: Duration, runtime: Duration) -> Option<time::Duration> {
    wait_time
        .checked_sub(&runtime)
        .and_then(|remaining| remaining.to_std().ok())
        .filter(|duration| !duration.is_zero())
}

/// Label values exported for one `(endpoint, servername)` target on the
/// previous iteration
#[derive(Debug, Default)]
struct Exported {
    status: Option<Status>,
    tls: Option<CipherInfo>,
}

type ExportedSeries = HashMap<(String, String), Exported>;

fn exported_for<'a>(
    exported: &'a mut ExportedSeries,
    endpoint: &str,
    servername: &str,
) -> &'a mut Exported {
    exported
        .entry((endpoint.to_string(), servername.to_string()))
        .or_default()
}

/// Keep exactly one `certpulse_cert_status` series per target
///
/// A target is the endpoint plus the servername sent in SNI, so one address
/// probed under several names exports one series per name. A changed status
/// removes the stale series.
fn update_status_metric(
    endpoint: &str,
    result: &ClassificationResult,
    exported: &mut ExportedSeries,
) {
    let servername = result.servername.as_str();
    let state = exported_for(exported, endpoint, servername);

    if let Some(previous) = state.status
        && previous != result.status
    {
        let _ = CERT_STATUS.remove_label_values(&[endpoint, servername, previous.as_str()]);
    }

    CERT_STATUS
        .with_label_values(&[endpoint, servername, result.status.as_str()])
        .set(1);

    state.status = Some(result.status);
}

/// Export the negotiated protocol and cipher, dropping the series of a
/// previous negotiation
fn update_tls_metric(
    endpoint: &str,
    servername: &str,
    cipher: Option<&CipherInfo>,
    exported: &mut ExportedSeries,
) {
    let state = exported_for(exported, endpoint, servername);

    if let Some(previous) = state.tls.as_ref()
        && Some(previous) != cipher
    {
        let _ = TLS_INFO.remove_label_values(&[
            endpoint,
            servername,
            previous.protocol.as_str(),
            previous.name.as_str(),
        ]);
    }

    if let Some(cipher) = cipher {
        TLS_INFO
            .with_label_values(&[
                endpoint,
                servername,
                cipher.protocol.as_str(),
                cipher.name.as_str(),
            ])
            .set(1);
    }

    state.tls = cipher.cloned();
}

/// Export everything known about one check
fn record_check(check: &Check, exported: &mut ExportedSeries) {
    let endpoint = check.entry.to_string();
    let result = &check.result;
    let labels = [endpoint.as_str(), result.servername.as_str()];

    update_status_metric(&endpoint, result, exported);
    update_tls_metric(
        &endpoint,
        &result.servername,
        check.outcome.cipher.as_ref(),
        exported,
    );

    PROBE_DURATION
        .with_label_values(&labels)
        .observe(check.elapsed.as_secs_f64());

    for err in check.outcome.errors() {
        PROBE_ERRORS
            .with_label_values(&[endpoint.as_str(), result.servername.as_str(), err.kind()])
            .inc();
    }

    match (&check.outcome.certificate, result.grace_threshold) {
        (Some(certificate), Some(grace_threshold)) => {
            CERT_VALID_TO_SECONDS
                .with_label_values(&labels)
                .set(certificate.valid_to.timestamp());
            CERT_GRACE_THRESHOLD_SECONDS
                .with_label_values(&labels)
                .set(grace_threshold.timestamp());
            CERT_EXPIRY_DAYS
                .with_label_values(&labels)
                .set(certificate.expiry_days(result.observed_at));
        }
        _ => {
            // no certificate, do not keep exporting dates from an older run
            let _ = CERT_VALID_TO_SECONDS.remove_label_values(&labels);
            let _ = CERT_GRACE_THRESHOLD_SECONDS.remove_label_values(&labels);
            let _ = CERT_EXPIRY_DAYS.remove_label_values(&labels);
        }
    }
}

async fn run_loop(entries: &[ProbeEntry], grace_period: f64, concurrency: usize, every: u16) {
    let mut exported = ExportedSeries::new();

    loop {
        // Catch panics in individual iterations to keep loop alive
        let iteration_result = std::panic::AssertUnwindSafe(async {
            let now = Utc::now();
            let wait_time = Duration::seconds(every.into());

            let checks = check_all(entries.to_vec(), grace_period, concurrency).await;

            for check in &checks {
                record_check(check, &mut exported);

                match serde_json::to_string(&check.record()) {
                    Ok(serialized) => println!("{serialized}"),
                    Err(e) => error!("failed to serialize record: {e}"),
                }
            }

            ITERATIONS_TOTAL.inc();

            let runtime = Utc::now().signed_duration_since(now);
            LAST_RUNTIME_MS.set(runtime.num_milliseconds());

            info!(
                endpoints = checks.len(),
                runtime_ms = runtime.num_milliseconds(),
                "iteration complete"
            );

            // Sleep for remaining interval time to maintain fixed interval
            if let Some(remaining) = remaining_sleep_duration(wait_time, runtime) {
                time::sleep(remaining).await;
            }
        })
        .catch_unwind()
        .await;

        // Handle panics in iteration gracefully
        if let Err(panic_info) = iteration_result {
            error!("panic in check loop iteration: {panic_info:?}");
            PANICS_RECOVERED.inc();
            // Sleep for the interval before retrying
            time::sleep(time::Duration::from_secs(every.into())).await;
        }
    }
}
