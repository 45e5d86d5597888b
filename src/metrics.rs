use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Registry, opts, register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_vec_with_registry,
    register_int_gauge_with_registry,
};
use std::sync::LazyLock;

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

trait ResultExt<T> {
    fn or_exit(self, context: &str) -> T;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: std::fmt::Display,
{
    fn or_exit(self, context: &str) -> T {
        match self {
            Ok(value) => value,
            Err(err) => {
                tracing::error!("failed to initialize metric ({context}): {err}");
                std::process::exit(1);
            }
        }
    }
}

pub static CERT_STATUS: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    register_int_gauge_vec_with_registry!(
        opts!(
            "certpulse_cert_status",
            "Current certificate status per endpoint (value is always 1)"
        ),
        &["endpoint", "servername", "status"],
        &REGISTRY
    )
    .or_exit("metric can be created")
});

pub static CERT_VALID_TO_SECONDS: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    register_int_gauge_vec_with_registry!(
        opts!(
            "certpulse_cert_valid_to_seconds",
            "Certificate notAfter as unix timestamp"
        ),
        &["endpoint", "servername"],
        &REGISTRY
    )
    .or_exit("metric can be created")
});

pub static CERT_GRACE_THRESHOLD_SECONDS: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    register_int_gauge_vec_with_registry!(
        opts!(
            "certpulse_cert_grace_threshold_seconds",
            "Instant the certificate enters its grace period, as unix timestamp"
        ),
        &["endpoint", "servername"],
        &REGISTRY
    )
    .or_exit("metric can be created")
});

pub static CERT_EXPIRY_DAYS: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    register_int_gauge_vec_with_registry!(
        opts!(
            "certpulse_cert_expiry_days",
            "Days until certificate expiration (negative if expired)"
        ),
        &["endpoint", "servername"],
        &REGISTRY
    )
    .or_exit("metric can be created")
});

pub static TLS_INFO: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    register_int_gauge_vec_with_registry!(
        opts!(
            "certpulse_tls_info",
            "Negotiated TLS protocol and cipher suite (value is always 1)"
        ),
        &["endpoint", "servername", "protocol", "cipher"],
        &REGISTRY
    )
    .or_exit("metric can be created")
});

pub static PROBE_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec_with_registry!(
        opts!(
            "certpulse_probe_errors_total",
            "Total probe errors by type (dns, connection, handshake, identity, untrusted, expired, parse, timeout)"
        ),
        &["endpoint", "servername", "error_type"],
        &REGISTRY
    )
    .or_exit("metric can be created")
});

pub static PROBE_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec_with_registry!(
        HistogramOpts::new(
            "certpulse_probe_duration_seconds",
            "Connect + TLS handshake duration in seconds"
        ),
        &["endpoint", "servername"],
        &REGISTRY
    )
    .or_exit("metric can be created")
});

pub static ITERATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter_with_registry!(
        opts!("certpulse_iterations_total", "Total check iterations run"),
        &REGISTRY
    )
    .or_exit("metric can be created")
});

pub static PANICS_RECOVERED: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter_with_registry!(
        opts!(
            "certpulse_panics_recovered_total",
            "Total panics recovered in the check loop"
        ),
        &REGISTRY
    )
    .or_exit("metric can be created")
});

pub static LAST_RUNTIME_MS: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge_with_registry!(
        opts!(
            "certpulse_last_runtime_ms",
            "Duration of the last check iteration in milliseconds"
        ),
        &REGISTRY
    )
    .or_exit("metric can be created")
});

/// Encode and return metrics for HTTP export
///
/// # Errors
///
/// Returns an error if metrics encoding fails
pub fn encode_metrics() -> Result<Vec<u8>, String> {
    let mut buffer = Vec::new();
    let encoder = prometheus::TextEncoder::new();

    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| format!("could not encode custom metrics: {e}"))?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn test_metrics_labels() {
        CERT_STATUS
            .with_label_values(&["example.com:443", "example.com", "valid"])
            .set(1);
        CERT_VALID_TO_SECONDS
            .with_label_values(&["example.com:443", "example.com"])
            .set(1_767_225_600);
        CERT_GRACE_THRESHOLD_SECONDS
            .with_label_values(&["example.com:443", "example.com"])
            .set(1_766_000_000);
        CERT_EXPIRY_DAYS
            .with_label_values(&["example.com:443", "example.com"])
            .set(90);
        TLS_INFO
            .with_label_values(&[
                "example.com:443",
                "example.com",
                "TLSv1_3",
                "TLS13_AES_256_GCM_SHA384",
            ])
            .set(1);
        PROBE_ERRORS
            .with_label_values(&["example.com:443", "example.com", "timeout"])
            .inc();
        PROBE_DURATION
            .with_label_values(&["example.com:443", "example.com"])
            .observe(0.05);
        LAST_RUNTIME_MS.set(42);
        assert_eq!(LAST_RUNTIME_MS.get(), 42);
    }

    #[test]
    fn test_counter_metrics() {
        let before = ITERATIONS_TOTAL.get();
        ITERATIONS_TOTAL.inc();
        assert!(ITERATIONS_TOTAL.get() > before);

        PANICS_RECOVERED.inc();
        assert!(PANICS_RECOVERED.get() >= 1);
    }

    #[test]
    fn test_encode_metrics() {
        // Initialize at least one metric to ensure non-empty output
        PANICS_RECOVERED.inc();

        let result = encode_metrics();
        assert!(result.is_ok());

        let buffer = result.unwrap();
        assert!(!buffer.is_empty());

        let output = String::from_utf8(buffer).unwrap();
        assert!(output.contains("certpulse_panics_recovered_total"));
    }

    #[test]
    fn test_registry() {
        CERT_EXPIRY_DAYS
            .with_label_values(&["registry.test:443", "registry.test"])
            .set(-3);
        let families = REGISTRY.gather();
        assert!(
            families
                .iter()
                .any(|family| family.name() == "certpulse_cert_expiry_days")
        );
    }
}
