use super::ProbeError;
use chrono::{DateTime, Utc};
use rustls::pki_types::CertificateDer;
use x509_parser::{
    prelude::{FromDer, GeneralName, X509Certificate},
    time::ASN1Time,
};

/// Leaf certificate fields needed downstream, extracted once after the handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    /// Certificate subject DN
    pub subject: String,
    /// Certificate issuer DN
    pub issuer: String,
    /// DNS names and IP addresses from the subjectAltName extension
    pub subject_alt_names: Vec<String>,
    /// Raw DER of the leaf
    pub der: CertificateDer<'static>,
}

impl CertificateInfo {
    /// Parse the fields of a DER-encoded certificate
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::ClassificationInputInvalid`] if the certificate or
    /// its validity dates cannot be decoded
    pub fn from_der(der: &CertificateDer<'_>) -> Result<Self, ProbeError> {
        let (_, cert) = X509Certificate::from_der(der.as_ref()).map_err(|e| {
            ProbeError::ClassificationInputInvalid(format!("failed to parse certificate: {e}"))
        })?;

        let validity = cert.validity();
        let valid_from = asn1_to_utc(&validity.not_before)?;
        let valid_to = asn1_to_utc(&validity.not_after)?;

        let subject_alt_names = cert
            .subject_alternative_name()
            .ok()
            .flatten()
            .map(|ext| {
                ext.value
                    .general_names
                    .iter()
                    .filter_map(|name| match name {
                        GeneralName::DNSName(dns) => Some((*dns).to_string()),
                        GeneralName::IPAddress(raw) => super::identity::ip_from_san(raw)
                            .as_ref()
                            .map(ToString::to_string),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            valid_from,
            valid_to,
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            subject_alt_names,
            der: der.clone().into_owned(),
        })
    }

    /// Days until expiration relative to `now` (negative if expired)
    #[must_use]
    pub fn expiry_days(&self, now: DateTime<Utc>) -> i64 {
        (self.valid_to - now).num_days()
    }
}

/// Negotiated cipher suite and protocol version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherInfo {
    /// Cipher suite used (e.g., `TLS13_AES_256_GCM_SHA384`)
    pub name: String,
    /// TLS protocol version (e.g., `TLSv1_3`)
    pub protocol: String,
}

/// Result of one connection attempt
///
/// `certificate` absent means the handshake never produced a usable leaf;
/// `connection_error` then says why.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProbeOutcome {
    /// SNI / identity name actually used
    pub servername: String,
    pub certificate: Option<CertificateInfo>,
    /// Full peer chain as presented, leaf first
    pub chain: Vec<CertificateDer<'static>>,
    pub identity_error: Option<ProbeError>,
    /// Only set when the probe was asked to verify the chain
    pub chain_error: Option<ProbeError>,
    pub cipher: Option<CipherInfo>,
    pub connection_error: Option<ProbeError>,
}

impl ProbeOutcome {
    /// Outcome of a probe that failed before a certificate was available
    #[must_use]
    pub fn failed(servername: impl Into<String>, error: ProbeError) -> Self {
        Self {
            servername: servername.into(),
            connection_error: Some(error),
            ..Default::default()
        }
    }

    /// All errors carried by the outcome, in reporting order
    pub fn errors(&self) -> impl Iterator<Item = &ProbeError> {
        self.connection_error
            .iter()
            .chain(self.identity_error.iter())
            .chain(self.chain_error.iter())
    }
}

fn asn1_to_utc(time: &ASN1Time) -> Result<DateTime<Utc>, ProbeError> {
    let raw = time.to_datetime();
    DateTime::<Utc>::from_timestamp(raw.unix_timestamp(), raw.nanosecond()).ok_or_else(|| {
        ProbeError::ClassificationInputInvalid("invalid certificate validity timestamp".to_string())
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn test_probe_outcome_default() {
        let outcome = ProbeOutcome::default();
        assert!(outcome.certificate.is_none());
        assert!(outcome.cipher.is_none());
        assert!(outcome.chain.is_empty());
        assert_eq!(outcome.errors().count(), 0);
    }

    #[test]
    fn test_probe_outcome_failed() {
        let outcome = ProbeOutcome::failed("example.com", ProbeError::CertificateExpired);
        assert_eq!(outcome.servername, "example.com");
        assert!(outcome.certificate.is_none());
        assert_eq!(outcome.errors().count(), 1);
    }

    #[test]
    fn test_from_der_garbage() {
        let der = CertificateDer::from(vec![0x30, 0x03, 0x01, 0x01, 0xff]);
        let result = CertificateInfo::from_der(&der);
        assert!(matches!(
            result,
            Err(ProbeError::ClassificationInputInvalid(_))
        ));
    }
}
