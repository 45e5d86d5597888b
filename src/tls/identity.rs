//! Hostname identity check, independent of the transport verifier.
//!
//! Matching rules:
//! - IP server names only match `iPAddress` subject alternative names
//! - DNS server names match `dNSName` entries case-insensitively, a trailing
//!   dot is ignored on both sides
//! - a wildcard is only honoured as the complete left-most label (`*.example.com`)
//!   and covers exactly one label
//! - the subject common name is consulted only when the certificate carries
//!   no `dNSName` at all

use super::ProbeError;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use x509_parser::prelude::{FromDer, GeneralName, X509Certificate};

/// Check that the certificate is valid for `servername`
///
/// # Errors
///
/// Returns [`ProbeError::IdentityMismatch`] when no name matches, or
/// [`ProbeError::ClassificationInputInvalid`] when the certificate cannot be parsed.
pub fn check_server_identity(servername: &str, cert_der: &[u8]) -> Result<(), ProbeError> {
    let (_, cert) = X509Certificate::from_der(cert_der).map_err(|e| {
        ProbeError::ClassificationInputInvalid(format!("failed to parse certificate: {e}"))
    })?;

    let mut dns_names = Vec::new();
    let mut ip_addresses = Vec::new();
    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            match name {
                GeneralName::DNSName(dns) => dns_names.push(*dns),
                GeneralName::IPAddress(raw) => ip_addresses.extend(ip_from_san(raw)),
                _ => {}
            }
        }
    }

    let mismatch = |reason: String| ProbeError::IdentityMismatch {
        servername: servername.to_string(),
        reason,
    };

    let host = servername.trim_end_matches('.');
    if let Ok(ip) = host.parse::<IpAddr>() {
        if ip_addresses.contains(&ip) {
            return Ok(());
        }
        return Err(mismatch(format!(
            "IP address not in certificate's list: {ip_addresses:?}"
        )));
    }

    if !dns_names.is_empty() {
        if dns_names.iter().any(|pattern| hostname_matches(pattern, host)) {
            return Ok(());
        }
        return Err(mismatch(format!(
            "host is not in certificate's altnames: {dns_names:?}"
        )));
    }

    let common_names: Vec<&str> = cert
        .subject()
        .iter_common_name()
        .filter_map(|cn| cn.as_str().ok())
        .collect();
    if common_names.iter().any(|cn| hostname_matches(cn, host)) {
        return Ok(());
    }

    Err(mismatch(format!("host is not the certificate's CN: {common_names:?}")))
}

/// Match a certificate name pattern against a host name
#[must_use]
pub fn hostname_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.trim_end_matches('.').to_ascii_lowercase();
    let host = host.trim_end_matches('.').to_ascii_lowercase();

    if pattern.is_empty() || host.is_empty() {
        return false;
    }

    if let Some(suffix) = pattern.strip_prefix("*.") {
        // wildcards need at least two labels after them and may not nest
        if suffix.contains('*') || !suffix.contains('.') {
            return false;
        }
        return host
            .split_once('.')
            .is_some_and(|(label, rest)| !label.is_empty() && rest == suffix);
    }

    !pattern.contains('*') && pattern == host
}

/// Decode the raw `iPAddress` bytes of a subject alternative name
#[must_use]
pub fn ip_from_san(raw: &[u8]) -> Option<IpAddr> {
    if let Ok(octets) = <[u8; 4]>::try_from(raw) {
        return Some(IpAddr::V4(Ipv4Addr::from(octets)));
    }
    <[u8; 16]>::try_from(raw)
        .ok()
        .map(|octets| IpAddr::V6(Ipv6Addr::from(octets)))
}
