use std::time::Duration;
use thiserror::Error;

/// Failures observed while probing an endpoint.
///
/// These never propagate out of [`probe`](super::probe::probe); they are carried
/// as data inside [`ProbeOutcome`](super::ProbeOutcome) and judged by the classifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("DNS resolution failed for {host}: {reason}")]
    DnsResolutionFailed { host: String, reason: String },

    #[error("connection to {addr} refused or reset: {reason}")]
    ConnectionRefusedOrReset { addr: String, reason: String },

    #[error("TLS handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("certificate has expired")]
    CertificateExpired,

    #[error("certificate is not valid for {servername}: {reason}")]
    IdentityMismatch { servername: String, reason: String },

    #[error("certificate rejected: {0}")]
    CertificateRejected(String),

    #[error("invalid certificate data: {0}")]
    ClassificationInputInvalid(String),

    #[error("invalid server name: {0}")]
    InvalidServerName(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl ProbeError {
    /// Short stable label, used as the `error_type` metric label
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::DnsResolutionFailed { .. } => "dns",
            Self::ConnectionRefusedOrReset { .. } => "connection",
            Self::HandshakeFailed(_) => "handshake",
            Self::CertificateExpired => "expired",
            Self::IdentityMismatch { .. } => "identity",
            Self::CertificateRejected(_) => "untrusted",
            Self::ClassificationInputInvalid(_) => "parse",
            Self::InvalidServerName(_) => "servername",
            Self::Timeout(_) => "timeout",
        }
    }

    /// Whether the TLS library itself reported the certificate as expired
    #[must_use]
    pub const fn is_expired(&self) -> bool {
        matches!(self, Self::CertificateExpired)
    }

    /// Map a rustls error surfaced during the handshake
    #[must_use]
    pub fn from_rustls(err: &rustls::Error) -> Self {
        use rustls::{CertificateError, Error};

        match err {
            Error::InvalidCertificate(
                CertificateError::Expired | CertificateError::ExpiredContext { .. },
            ) => Self::CertificateExpired,
            Error::InvalidCertificate(cert_err) => {
                Self::CertificateRejected(format!("{cert_err:?}"))
            }
            other => Self::HandshakeFailed(other.to_string()),
        }
    }
}
