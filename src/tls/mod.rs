//! TLS endpoint probing
//!
//! Connects to an endpoint, completes the handshake whatever the state of the
//! presented certificate, and reports what was seen as plain data.
//!
//! # Module Organization
//!
//! - `config` - Probe input (`ProbeEntry`) and trust anchors
//! - `error` - Probe failure taxonomy
//! - `identity` - Hostname identity check against the leaf certificate
//! - `metadata` - Certificate, cipher and outcome structures
//! - `probe` - Connection, handshake and inspection
//! - `verifier` - Accept-all transport verifier and post-handshake chain verifier
//!
//! # Example
//!
//! ```rust,ignore
//! use certpulse::tls::{ProbeEntry, probe};
//!
//! let entry: ProbeEntry = "10.0.0.7:443@www.example.com".parse()?;
//! let outcome = probe(&entry.with_timeout(Some(Duration::from_secs(5)))).await;
//! if let Some(cert) = &outcome.certificate {
//!     println!("{} expires {}", cert.subject, cert.valid_to);
//! }
//! ```

pub mod config;
pub mod error;
pub mod identity;
pub mod metadata;
pub mod probe;
pub mod verifier;

// Re-export commonly used types
pub use config::{DEFAULT_PORT, ProbeEntry, TrustAnchors};
pub use error::ProbeError;
pub use identity::check_server_identity;
pub use metadata::{CertificateInfo, CipherInfo, ProbeOutcome};
pub use probe::{ensure_crypto_provider, probe};
pub use verifier::{ChainVerifier, NoVerifier};
