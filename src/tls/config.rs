use anyhow::{Context, Result, anyhow};
use rustls::{RootCertStore, pki_types::CertificateDer};
use rustls_pemfile::certs;
use std::{
    fmt, io::Cursor, net::Ipv6Addr, path::Path, str::FromStr, sync::Arc, time::Duration,
};
use tokio::fs;

pub const DEFAULT_PORT: u16 = 443;

/// Trust anchors used for the optional chain verification step
#[derive(Debug, Clone)]
pub enum TrustAnchors {
    /// Mozilla root set bundled through `webpki-roots`
    WebPki,
    /// Caller supplied certificates (decoded from PEM)
    Custom(Vec<CertificateDer<'static>>),
}

impl TrustAnchors {
    /// Decode every `CERTIFICATE` block of a PEM document
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM is malformed or contains no certificate
    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        let mut reader = Cursor::new(pem);
        let parsed = certs(&mut reader)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| anyhow!("invalid certificate PEM: {e}"))?;

        if parsed.is_empty() {
            anyhow::bail!("no certificates found in PEM input");
        }

        Ok(Self::Custom(parsed))
    }

    /// Load trust anchors from a PEM file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or holds no certificate
    pub async fn from_pem_file(path: &Path) -> Result<Self> {
        let data = fs::read(path)
            .await
            .with_context(|| format!("failed to read trust anchors {}", path.display()))?;
        Self::from_pem(&data)
            .with_context(|| format!("invalid trust anchors in {}", path.display()))
    }

    /// Build the root store handed to the `WebPKI` verifier
    ///
    /// # Errors
    ///
    /// Returns an error if none of the custom certificates is a usable trust anchor
    pub fn root_store(&self) -> Result<RootCertStore> {
        match self {
            Self::WebPki => Ok(webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect()),
            Self::Custom(anchors) => {
                let mut store = RootCertStore::empty();
                let (added, _ignored) = store.add_parsable_certificates(anchors.iter().cloned());
                if added == 0 {
                    anyhow::bail!("none of the supplied certificates is a valid trust anchor");
                }
                Ok(store)
            }
        }
    }
}

/// Input of a single probe
///
/// Parsed from `host[:port][@servername]`; IPv6 literals go in brackets
/// (`[::1]:8443`), a bare IPv6 address is accepted without a port.
#[derive(Debug, Clone)]
pub struct ProbeEntry {
    pub host: String,
    pub port: u16,
    pub servername: Option<String>,
    pub trust_anchors: Option<Arc<TrustAnchors>>,
    pub timeout: Option<Duration>,
}

impl ProbeEntry {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            servername: None,
            trust_anchors: None,
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_servername(mut self, servername: impl Into<String>) -> Self {
        self.servername = Some(servername.into());
        self
    }

    #[must_use]
    pub fn with_trust_anchors(mut self, anchors: Arc<TrustAnchors>) -> Self {
        self.trust_anchors = Some(anchors);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Name used for SNI and for the identity check
    #[must_use]
    pub fn effective_servername(&self) -> &str {
        self.servername.as_deref().unwrap_or(&self.host)
    }
}

impl fmt::Display for ProbeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for ProbeEntry {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (address, servername) = match s.rsplit_once('@') {
            Some((address, servername)) => {
                if servername.is_empty() {
                    anyhow::bail!("empty servername in target: {s}");
                }
                (address, Some(servername.to_string()))
            }
            None => (s, None),
        };

        let (host, port) = split_host_port(address)?;
        if host.is_empty() {
            anyhow::bail!("missing host in target: {s}");
        }

        Ok(Self {
            host,
            port,
            servername,
            trust_anchors: None,
            timeout: None,
        })
    }
}

fn split_host_port(address: &str) -> Result<(String, u16)> {
    if let Some(rest) = address.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .with_context(|| format!("unterminated IPv6 literal: {address}"))?;
        let port = match tail {
            "" => DEFAULT_PORT,
            tail => parse_port(tail.strip_prefix(':').with_context(|| {
                format!("unexpected characters after IPv6 literal: {address}")
            })?)?,
        };
        return Ok((host.to_string(), port));
    }

    // bare IPv6 literal, no port possible
    if address.parse::<Ipv6Addr>().is_ok() {
        return Ok((address.to_string(), DEFAULT_PORT));
    }

    match address.rsplit_once(':') {
        Some((host, port)) => Ok((host.to_string(), parse_port(port)?)),
        None => Ok((address.to_string(), DEFAULT_PORT)),
    }
}

fn parse_port(port: &str) -> Result<u16> {
    let port = port
        .parse::<u16>()
        .with_context(|| format!("invalid port: {port}"))?;
    if port == 0 {
        anyhow::bail!("port must be between 1 and 65535");
    }
    Ok(port)
}
