//! src/transport/tls.rs
//!
//! Derives a self-signed TLS identity from each role's long-term ed25519
//! keypair and builds the two distinct QUIC endpoint configurations: the
//! agent-facing listener, which accepts any certificate, and the
//! client-facing listener, which accepts a connection only if the presented
//! certificate's public key is in the authorized set.

use crate::error::{Error, Result};
use crate::keys::authorized_keys;
use ed25519_dalek::{SigningKey, VerifyingKey, PUBLIC_KEY_LENGTH};
use quinn::{ClientConfig, ServerConfig};
use rustls::client::{ServerCertVerified, ServerCertVerifier};
use rustls::server::{ClientCertVerified, ClientCertVerifier};
use rustls::{Certificate, DistinguishedName, Error as RustlsError, PrivateKey, ServerName};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

const ALPN: &[u8] = b"telemetry/1";

/// The ASN.1 DER prefix of an Ed25519 `SubjectPublicKeyInfo`
/// (`rfc8410`): algorithm identifier + bit-string header, always these same
/// 12 bytes, immediately followed by the raw 32-byte public key.
const ED25519_SPKI_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
];

/// Mint a self-signed certificate whose subject key *is* `signing_key`, so
/// the certificate itself is the role's long-term identity.
fn self_signed_cert(signing_key: &SigningKey) -> Result<(Certificate, PrivateKey)> {
    let key_pair = rcgen::KeyPair::from_der(&signing_key.to_pkcs8_der_bytes()?)
        .map_err(|e| Error::TlsConfig(format!("failed to load ed25519 key into rcgen: {e}")))?;
    let mut params = rcgen::CertificateParams::new(Vec::<String>::new());
    params.alg = &rcgen::PKCS_ED25519;
    params.key_pair = Some(key_pair);

    let cert = rcgen::Certificate::from_params(params)
        .map_err(|e| Error::TlsConfig(format!("failed to build self-signed certificate: {e}")))?;
    let cert_der = cert
        .serialize_der()
        .map_err(|e| Error::TlsConfig(format!("failed to serialize certificate: {e}")))?;
    Ok((Certificate(cert_der), PrivateKey(cert.serialize_private_key_der())))
}

/// Extract the raw Ed25519 public key embedded in a DER certificate minted
/// by [`self_signed_cert`], by locating the fixed SPKI prefix rather than
/// parsing the full X.509 structure.
fn ed25519_public_key_of(cert: &Certificate) -> Option<VerifyingKey> {
    let der = &cert.0;
    let prefix_at = der
        .windows(ED25519_SPKI_PREFIX.len())
        .position(|window| window == ED25519_SPKI_PREFIX)?;
    let key_start = prefix_at + ED25519_SPKI_PREFIX.len();
    let raw: [u8; PUBLIC_KEY_LENGTH] = der.get(key_start..key_start + PUBLIC_KEY_LENGTH)?.try_into().ok()?;
    VerifyingKey::from_bytes(&raw).ok()
}

/// Accepts any presented certificate: there is no peer-identity check on
/// the agent-facing endpoint, which trusts agents by network topology.
#[derive(Debug)]
struct AcceptAnyCert;

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> std::result::Result<ServerCertVerified, RustlsError> {
        Ok(ServerCertVerified::assertion())
    }
}

impl ClientCertVerifier for AcceptAnyCert {
    fn client_auth_root_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _now: SystemTime,
    ) -> std::result::Result<ClientCertVerified, RustlsError> {
        Ok(ClientCertVerified::assertion())
    }
}

/// Accepts a client certificate only if its embedded public key is one of
/// `authorized`. Re-reads the authorized-client directory on every handshake
/// so dropping a new `<name>.key` file in takes effect without a restart.
#[derive(Debug)]
struct AuthorizedClientsOnly {
    dir: std::path::PathBuf,
}

impl ClientCertVerifier for AuthorizedClientsOnly {
    fn client_auth_root_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        end_entity: &Certificate,
        _intermediates: &[Certificate],
        _now: SystemTime,
    ) -> std::result::Result<ClientCertVerified, RustlsError> {
        let presented =
            ed25519_public_key_of(end_entity).ok_or(RustlsError::InvalidCertificate(
                rustls::CertificateError::BadEncoding,
            ))?;
        let authorized = authorized_keys(&self.dir);
        if authorized.contains(&presented) {
            Ok(ClientCertVerified::assertion())
        } else {
            Err(RustlsError::General("peer is not an authorized client".into()))
        }
    }
}

/// Builds the QUIC server config for the agent-facing listener: presents
/// `signing_key`'s certificate, accepts any client certificate.
pub fn agent_listener_config(signing_key: &SigningKey) -> Result<ServerConfig> {
    let (cert, key) = self_signed_cert(signing_key)?;
    let mut crypto = rustls::ServerConfig::builder()
        .with_safe_defaults()
        .with_client_cert_verifier(Arc::new(AcceptAnyCert))
        .with_single_cert(vec![cert], key)
        .map_err(|e| Error::TlsConfig(format!("agent listener TLS config: {e}")))?;
    crypto.alpn_protocols = vec![ALPN.to_vec()];
    let mut server_config = ServerConfig::with_crypto(Arc::new(crypto));
    Arc::get_mut(&mut server_config.transport)
        .expect("fresh ServerConfig transport has no other owner")
        .keep_alive_interval(Some(std::time::Duration::from_secs(5)));
    Ok(server_config)
}

/// Builds the QUIC server config for the client-facing listener: presents
/// `signing_key`'s certificate, accepts only certificates whose public key
/// is under `authorized_dir`.
pub fn client_listener_config(signing_key: &SigningKey, authorized_dir: &Path) -> Result<ServerConfig> {
    let (cert, key) = self_signed_cert(signing_key)?;
    let verifier = Arc::new(AuthorizedClientsOnly {
        dir: authorized_dir.to_path_buf(),
    });
    let mut crypto = rustls::ServerConfig::builder()
        .with_safe_defaults()
        .with_client_cert_verifier(verifier)
        .with_single_cert(vec![cert], key)
        .map_err(|e| Error::TlsConfig(format!("client listener TLS config: {e}")))?;
    crypto.alpn_protocols = vec![ALPN.to_vec()];
    let mut server_config = ServerConfig::with_crypto(Arc::new(crypto));
    Arc::get_mut(&mut server_config.transport)
        .expect("fresh ServerConfig transport has no other owner")
        .keep_alive_interval(Some(std::time::Duration::from_secs(5)));
    Ok(server_config)
}

/// Builds the QUIC client config used by both the Agent and the Client
/// binary to dial a Collector endpoint, presenting `signing_key`'s
/// certificate as this peer's identity and trusting any server certificate
/// in turn (the Collector is not required to prove its identity to dialers
/// — only the reverse).
pub fn dialer_config(signing_key: &SigningKey) -> Result<ClientConfig> {
    let (cert, key) = self_signed_cert(signing_key)?;
    let mut crypto = rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
        .with_client_auth_cert(vec![cert], key)
        .map_err(|e| Error::TlsConfig(format!("dialer TLS config: {e}")))?;
    crypto.alpn_protocols = vec![ALPN.to_vec()];
    Ok(ClientConfig::new(Arc::new(crypto)))
}

pub fn alpn() -> &'static [u8] {
    ALPN
}

trait SigningKeyPkcs8Der {
    fn to_pkcs8_der_bytes(&self) -> Result<Vec<u8>>;
}

impl SigningKeyPkcs8Der for SigningKey {
    fn to_pkcs8_der_bytes(&self) -> Result<Vec<u8>> {
        use ed25519_dalek::pkcs8::EncodePrivateKey;
        Ok(self
            .to_pkcs8_der()
            .map_err(|e| Error::TlsConfig(format!("failed to encode signing key as PKCS8: {e}")))?
            .as_bytes()
            .to_vec())
    }
}
