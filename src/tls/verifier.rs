use super::{ProbeError, TrustAnchors};
use anyhow::{Result, anyhow};
use rustls::{
    CertificateError, DigitallySignedStruct, Error as TlsError, SignatureScheme,
    client::{
        WebPkiServerVerifier,
        danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    },
    pki_types::{CertificateDer, ServerName, UnixTime},
};
use std::{fmt, sync::Arc};

/// Transport-level verifier that accepts any certificate.
///
/// The probe must complete the handshake for expired, self-signed and otherwise
/// untrusted certificates; trust and identity are judged afterwards by
/// [`ChainVerifier`] and [`check_server_identity`](super::identity::check_server_identity).
#[derive(Debug)]
pub struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

/// Post-handshake chain verification against a set of trust anchors.
///
/// Delegates to rustls's `WebPkiServerVerifier` but reports the outcome as
/// data instead of aborting the connection. Name mismatches are left to the
/// identity check so they are not reported twice.
#[derive(Clone)]
pub struct ChainVerifier {
    inner: Arc<WebPkiServerVerifier>,
}

impl fmt::Debug for ChainVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainVerifier")
            .field("inner", &"WebPkiServerVerifier")
            .finish()
    }
}

impl ChainVerifier {
    /// Build a verifier for the given trust anchors
    ///
    /// # Errors
    ///
    /// Returns an error if the root store or the `WebPKI` verifier cannot be built
    pub fn new(anchors: &TrustAnchors) -> Result<Self> {
        super::ensure_crypto_provider();

        let inner = WebPkiServerVerifier::builder(Arc::new(anchors.root_store()?))
            .build()
            .map_err(|e| anyhow!("failed to build WebPKI verifier: {e}"))?;

        Ok(Self { inner })
    }

    /// Verify the presented chain, leaf first
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::CertificateExpired`] for an expired leaf or
    /// [`ProbeError::CertificateRejected`] for any other chain failure
    pub fn verify(
        &self,
        chain: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        now: UnixTime,
    ) -> Result<(), ProbeError> {
        let Some((end_entity, intermediates)) = chain.split_first() else {
            return Err(ProbeError::CertificateRejected(
                "peer presented no certificate".to_string(),
            ));
        };

        match self
            .inner
            .verify_server_cert(end_entity, intermediates, server_name, &[], now)
        {
            Ok(_)
            | Err(TlsError::InvalidCertificate(
                CertificateError::NotValidForName | CertificateError::NotValidForNameContext { .. },
            )) => Ok(()),
            Err(err) => Err(ProbeError::from_rustls(&err)),
        }
    }
}
