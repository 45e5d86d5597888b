#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use certpulse::tls::{ProbeEntry, ensure_crypto_provider};
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, date_time_ymd,
};
use rustls::{
    ServerConfig,
    pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer},
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{io::AsyncReadExt, net::TcpListener, task::JoinHandle};
use tokio_rustls::TlsAcceptor;

/// Certificate validity as (year, month, day) pairs
pub struct Validity {
    pub not_before: (i32, u8, u8),
    pub not_after: (i32, u8, u8),
}

/// Valid until the end of the century
pub const LONG_LIVED: Validity = Validity {
    not_before: (2020, 1, 1),
    not_after: (2099, 12, 31),
};

/// Expired years ago
pub const EXPIRED: Validity = Validity {
    not_before: (2019, 1, 1),
    not_after: (2020, 1, 1),
};

/// A leaf certificate with the key it was issued for
pub struct Issued {
    pub cert: Certificate,
    pub key_pair: KeyPair,
}

impl Issued {
    pub fn der(&self) -> CertificateDer<'static> {
        self.cert.der().clone()
    }

    pub fn pem(&self) -> String {
        self.cert.pem()
    }
}

fn leaf_params(names: &[&str], validity: &Validity) -> CertificateParams {
    let mut params =
        CertificateParams::new(names.iter().map(ToString::to_string).collect::<Vec<_>>())
            .unwrap();
    let mut dn = DistinguishedName::new();
    if let Some(primary) = names.first() {
        dn.push(DnType::CommonName, *primary);
    }
    params.distinguished_name = dn;
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

    let (y, m, d) = validity.not_before;
    params.not_before = date_time_ymd(y, m, d);
    let (y, m, d) = validity.not_after;
    params.not_after = date_time_ymd(y, m, d);
    params
}

/// Self-signed certificate for `names`
pub fn self_signed(names: &[&str], validity: &Validity) -> Issued {
    let key_pair = KeyPair::generate().unwrap();
    let cert = leaf_params(names, validity).self_signed(&key_pair).unwrap();
    Issued { cert, key_pair }
}

/// Certificate authority used as a custom trust anchor
pub fn certificate_authority() -> Issued {
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, "certpulse test CA");
    params.distinguished_name = dn;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.not_before = date_time_ymd(2020, 1, 1);
    params.not_after = date_time_ymd(2099, 12, 31);

    let key_pair = KeyPair::generate().unwrap();
    let cert = params.self_signed(&key_pair).unwrap();
    Issued { cert, key_pair }
}

/// Leaf certificate for `names` signed by `ca`
pub fn signed_by(names: &[&str], validity: &Validity, ca: &Issued) -> Issued {
    let key_pair = KeyPair::generate().unwrap();
    let cert = leaf_params(names, validity)
        .signed_by(&key_pair, &ca.cert, &ca.key_pair)
        .unwrap();
    Issued { cert, key_pair }
}

/// TLS server on an ephemeral loopback port presenting `leaf`
pub struct TestServer {
    pub addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(leaf: &Issued) -> Self {
        ensure_crypto_provider();

        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(leaf.key_pair.serialize_der()));
        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![leaf.der()], key)
            .unwrap();
        let acceptor = TlsAcceptor::from(Arc::new(config));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            while let Ok((stream, _peer)) = listener.accept().await {
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    if let Ok(mut tls) = acceptor.accept(stream).await {
                        // hold the connection until the client closes it
                        let mut buf = [0u8; 64];
                        let _ = tokio::time::timeout(Duration::from_secs(5), tls.read(&mut buf))
                            .await;
                    }
                });
            }
        });

        Self { addr, handle }
    }

    /// Entry for this server, probed as `servername`
    pub fn entry(&self, servername: &str) -> ProbeEntry {
        ProbeEntry::new("127.0.0.1", self.addr.port())
            .with_servername(servername)
            .with_timeout(Some(Duration::from_secs(5)))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Port that nothing listens on
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}
