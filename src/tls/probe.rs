use super::{
    CertificateInfo, ChainVerifier, CipherInfo, NoVerifier, ProbeEntry, ProbeError, ProbeOutcome,
    identity::check_server_identity,
};
use rustls::{
    ClientConfig,
    pki_types::{CertificateDer, ServerName, UnixTime},
};
use std::{
    io,
    net::{IpAddr, SocketAddr},
    sync::{Arc, OnceLock},
};
use tokio::{io::AsyncWriteExt, net::TcpStream, time};
use tokio_rustls::{TlsConnector, client::TlsStream};
use tracing::{debug, warn};

static CRYPTO_PROVIDER_INIT: OnceLock<()> = OnceLock::new();

/// Ensure the rustls crypto provider is initialized
///
/// This should be called before any TLS operations. It's safe to call
/// multiple times as initialization only happens once.
pub fn ensure_crypto_provider() {
    CRYPTO_PROVIDER_INIT.get_or_init(|| {
        if rustls::crypto::CryptoProvider::get_default().is_some() {
            return;
        }
        if let Err(err) = rustls::crypto::ring::default_provider().install_default() {
            debug!("crypto provider installed concurrently: {err:?}");
        }
    });
}

/// Probe a TLS endpoint and capture its certificate.
///
/// The handshake is performed without certificate verification so that
/// expired, self-signed and untrusted certificates can still be inspected.
/// The identity of the certificate is checked separately and, when the entry
/// carries trust anchors, the chain is verified against them. Neither check
/// aborts the probe.
///
/// Never fails: DNS, connection, handshake and timeout failures are returned
/// as [`ProbeOutcome::connection_error`]. The socket is released before
/// returning on every path.
pub async fn probe(entry: &ProbeEntry) -> ProbeOutcome {
    let servername = entry.effective_servername().to_string();

    let attempt = connect_and_inspect(entry, &servername);
    let result = match entry.timeout {
        Some(limit) => time::timeout(limit, attempt)
            .await
            .unwrap_or_else(|_| Err(ProbeError::Timeout(limit))),
        None => attempt.await,
    };

    match result {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(endpoint = %entry, %servername, error_type = err.kind(), "probe failed: {err}");
            ProbeOutcome::failed(servername, err)
        }
    }
}

async fn connect_and_inspect(
    entry: &ProbeEntry,
    servername: &str,
) -> Result<ProbeOutcome, ProbeError> {
    let server_name = server_name_from_host(servername)?;

    let chain_verifier = entry
        .trust_anchors
        .as_deref()
        .map(ChainVerifier::new)
        .transpose()
        .map_err(|e| ProbeError::CertificateRejected(format!("{e:#}")))?;

    let addrs = resolve(&entry.host, entry.port).await?;
    debug!(endpoint = %entry, ?addrs, "resolved");

    let stream = TcpStream::connect(addrs.as_slice())
        .await
        .map_err(|e| ProbeError::ConnectionRefusedOrReset {
            addr: entry.to_string(),
            reason: e.to_string(),
        })?;
    debug!(endpoint = %entry, %servername, "connected, starting TLS handshake");

    let mut tls_stream = build_tls_connector()
        .connect(server_name.clone(), stream)
        .await
        .map_err(|e| handshake_error(&e, entry))?;

    let outcome = inspect(&tls_stream, servername, &server_name, chain_verifier.as_ref());

    // best effort close_notify, the stream is dropped right after either way
    if let Err(err) = tls_stream.shutdown().await {
        debug!(endpoint = %entry, "TLS shutdown failed: {err}");
    }

    Ok(outcome)
}

async fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>, ProbeError> {
    let dns_error = |reason: String| ProbeError::DnsResolutionFailed {
        host: host.to_string(),
        reason,
    };

    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| dns_error(e.to_string()))?
        .collect();

    if addrs.is_empty() {
        return Err(dns_error("no addresses returned".to_string()));
    }

    Ok(addrs)
}

fn build_tls_connector() -> TlsConnector {
    ensure_crypto_provider();

    let config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoVerifier))
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}

fn server_name_from_host(host: &str) -> Result<ServerName<'static>, ProbeError> {
    host.parse::<IpAddr>().map_or_else(
        |_| {
            ServerName::try_from(host.to_string())
                .map_err(|_| ProbeError::InvalidServerName(host.to_string()))
        },
        |ip| Ok(ServerName::from(ip)),
    )
}

fn handshake_error(err: &io::Error, entry: &ProbeEntry) -> ProbeError {
    if let Some(tls_err) = err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
    {
        return ProbeError::from_rustls(tls_err);
    }

    match err.kind() {
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::BrokenPipe => ProbeError::ConnectionRefusedOrReset {
            addr: entry.to_string(),
            reason: err.to_string(),
        },
        _ => ProbeError::HandshakeFailed(err.to_string()),
    }
}

fn inspect(
    stream: &TlsStream<TcpStream>,
    servername: &str,
    server_name: &ServerName<'static>,
    chain_verifier: Option<&ChainVerifier>,
) -> ProbeOutcome {
    let (_, connection) = stream.get_ref();

    let chain: Vec<CertificateDer<'static>> = connection
        .peer_certificates()
        .map(|certs| certs.iter().map(|c| c.clone().into_owned()).collect())
        .unwrap_or_default();

    let cipher = connection.negotiated_cipher_suite().map(|suite| CipherInfo {
        name: format!("{:?}", suite.suite()),
        protocol: connection
            .protocol_version()
            .map_or_else(|| "unknown".to_string(), |version| format!("{version:?}")),
    });

    let Some(leaf) = chain.first() else {
        return ProbeOutcome {
            servername: servername.to_string(),
            cipher,
            connection_error: Some(ProbeError::HandshakeFailed(
                "peer presented no certificate".to_string(),
            )),
            ..Default::default()
        };
    };

    let certificate = match CertificateInfo::from_der(leaf) {
        Ok(certificate) => certificate,
        Err(err) => {
            return ProbeOutcome {
                servername: servername.to_string(),
                chain,
                cipher,
                connection_error: Some(err),
                ..Default::default()
            };
        }
    };

    let identity_error = check_server_identity(servername, leaf.as_ref()).err();
    let chain_error = chain_verifier
        .and_then(|verifier| verifier.verify(&chain, server_name, UnixTime::now()).err());

    debug!(
        %servername,
        subject = %certificate.subject,
        valid_to = %certificate.valid_to,
        identity_ok = identity_error.is_none(),
        chain_ok = chain_error.is_none(),
        protocol = cipher.as_ref().map_or("unknown", |c| c.protocol.as_str()),
        cipher = cipher.as_ref().map_or("unknown", |c| c.name.as_str()),
        "certificate retrieved"
    );

    ProbeOutcome {
        servername: servername.to_string(),
        certificate: Some(certificate),
        chain,
        identity_error,
        chain_error,
        cipher,
        connection_error: None,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn test_crypto_provider_init() {
        // Should not panic
        ensure_crypto_provider();
        ensure_crypto_provider(); // Second call should be idempotent
    }

    #[test]
    fn test_server_name_from_hostname() {
        assert!(server_name_from_host("example.com").is_ok());
        assert!(server_name_from_host("db.example.com").is_ok());
    }

    #[test]
    fn test_server_name_from_ip() {
        assert!(matches!(
            server_name_from_host("127.0.0.1"),
            Ok(ServerName::IpAddress(_))
        ));
        assert!(matches!(
            server_name_from_host("2001:db8::1"),
            Ok(ServerName::IpAddress(_))
        ));
    }

    #[test]
    fn test_server_name_invalid() {
        assert!(matches!(
            server_name_from_host(""),
            Err(ProbeError::InvalidServerName(_))
        ));
        assert!(matches!(
            server_name_from_host("invalid host name with spaces"),
            Err(ProbeError::InvalidServerName(_))
        ));
    }

    #[test]
    fn test_handshake_error_reset() {
        let entry = ProbeEntry::new("example.com", 443);
        let err = io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer");
        assert!(matches!(
            handshake_error(&err, &entry),
            ProbeError::ConnectionRefusedOrReset { .. }
        ));
    }

    #[test]
    fn test_handshake_error_rustls() {
        let entry = ProbeEntry::new("example.com", 443);
        let err = io::Error::new(
            io::ErrorKind::InvalidData,
            rustls::Error::InvalidCertificate(rustls::CertificateError::Expired),
        );
        assert_eq!(handshake_error(&err, &entry), ProbeError::CertificateExpired);
    }

    #[test]
    fn test_handshake_error_other() {
        let entry = ProbeEntry::new("example.com", 443);
        let err = io::Error::new(io::ErrorKind::UnexpectedEof, "tls handshake eof");
        assert!(matches!(
            handshake_error(&err, &entry),
            ProbeError::HandshakeFailed(_)
        ));
    }

    #[tokio::test]
    async fn test_probe_invalid_servername() {
        let entry = ProbeEntry::new("127.0.0.1", 1).with_servername("not a valid name");
        let outcome = probe(&entry).await;
        assert!(outcome.certificate.is_none());
        assert!(matches!(
            outcome.connection_error,
            Some(ProbeError::InvalidServerName(_))
        ));
        assert_eq!(outcome.servername, "not a valid name");
    }
}
