//! CA generation, loading and leaf issuance.

use super::CaError;
use rand::RngCore;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue,
    ExtendedKeyUsagePurpose, IsCa, Issuer, KeyIdMethod, KeyPair, KeyUsagePurpose, SanType,
    SerialNumber, PKCS_RSA_SHA256,
};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::RsaPrivateKey;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use sha1::{Digest, Sha1};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

pub const DEFAULT_CA_NAME: &str = "Everdeen Proxy CA";
pub const DEFAULT_CA_ORGANIZATION: &str = "Everdeen";

const RSA_KEY_BITS: usize = 2048;
/// 160-bit serials
const SERIAL_BYTES: usize = 20;

/// Leaf certificate chain (`[leaf, ca]`) and the leaf's private key.
pub struct LeafCertificate {
    pub chain: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
}

/// Root identity used to sign per-host leaf certificates.
///
/// Read-only once constructed, so leaf issuance needs no locking.
pub struct CertificateAuthority {
    issuer: Issuer<'static, KeyPair>,
    cert_der: CertificateDer<'static>,
    cert_pem: String,
    key_pem: String,
    organization: Option<DnValue>,
    validity: Duration,
}

impl std::fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateAuthority")
            .field("organization", &self.organization)
            .field("validity", &self.validity)
            .finish_non_exhaustive()
    }
}

impl CertificateAuthority {
    /// Generate a fresh self-signed CA in memory.
    pub fn generate(name: &str, organization: &str, validity: Duration) -> Result<Self, CaError> {
        let key = RsaKey::generate()?;

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, name);
        dn.push(DnType::OrganizationName, organization);

        let mut params = CertificateParams::default();
        params.distinguished_name = dn;
        params.serial_number = Some(random_serial());
        params.key_identifier_method = KeyIdMethod::PreSpecified(key.subject_key_identifier());
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
            KeyUsagePurpose::KeyCertSign,
        ];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        if !name.contains(char::is_whitespace) {
            if let Ok(dns_name) = name.try_into() {
                params.subject_alt_names = vec![SanType::DnsName(dns_name)];
            }
        }
        let now = OffsetDateTime::now_utc();
        params.not_before = now - validity;
        params.not_after = now + validity;

        let cert = params.self_signed(&key.key_pair)?;
        let cert_pem = cert.pem();
        info!(name, organization, "Generated CA certificate");
        Self::from_parts(cert_pem, key, validity)
    }

    /// Generate a CA and write the certificate and private key as PEM.
    pub async fn generate_and_save(
        name: &str,
        organization: &str,
        validity: Duration,
        cert_path: &Path,
        key_path: &Path,
    ) -> Result<Self, CaError> {
        let ca = Self::generate(name, organization, validity)?;

        fs::write(cert_path, ca.cert_pem.as_bytes())
            .await
            .map_err(|e| CaError::io(cert_path, e))?;
        write_private(key_path, ca.key_pem.as_bytes())
            .await
            .map_err(|e| CaError::io(key_path, e))?;

        info!(cert = ?cert_path, key = ?key_path, "Saved CA certificate and key");
        Ok(ca)
    }

    /// Load a CA certificate and its RSA key (PKCS#8 or PKCS#1 PEM).
    pub async fn load(cert_path: &Path, key_path: &Path, validity: Duration) -> Result<Self, CaError> {
        let cert_pem = fs::read_to_string(cert_path)
            .await
            .map_err(|e| CaError::io(cert_path, e))?;
        let key_pem = fs::read_to_string(key_path)
            .await
            .map_err(|e| CaError::io(key_path, e))?;
        let ca = Self::from_pem(&cert_pem, &key_pem, validity)?;
        info!(cert = ?cert_path, "Loaded CA certificate");
        Ok(ca)
    }

    /// Build from PEM text. `validity` applies to issued leaves.
    pub fn from_pem(cert_pem: &str, key_pem: &str, validity: Duration) -> Result<Self, CaError> {
        let key = RsaKey::from_pem(key_pem)?;
        Self::from_parts(cert_pem.to_string(), key, validity)
    }

    fn from_parts(cert_pem: String, key: RsaKey, validity: Duration) -> Result<Self, CaError> {
        let cert_der = rustls_pemfile::certs(&mut cert_pem.as_bytes())
            .next()
            .ok_or(CaError::NoCertificate)?
            .map_err(|e| CaError::Pem(e.to_string()))?;

        let organization = ca_organization(&cert_der)?;

        let issuer = Issuer::from_ca_cert_pem(&cert_pem, key.key_pair)?;

        Ok(Self {
            issuer,
            cert_der,
            cert_pem,
            key_pem: key.pkcs8_pem,
            organization,
            validity,
        })
    }

    /// CA certificate in PEM form, for clients that need to trust it.
    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    /// CA private key as PKCS#8 PEM.
    pub fn key_pem(&self) -> &str {
        &self.key_pem
    }

    pub fn cert_der(&self) -> &CertificateDer<'static> {
        &self.cert_der
    }

    /// Issue a leaf certificate for `hostname` with a freshly generated key.
    ///
    /// Any port is stripped first. IP literals get an IP SAN, everything else
    /// a DNS SAN. This generates an RSA key and is CPU-bound.
    pub fn issue_leaf(&self, hostname: &str) -> Result<LeafCertificate, CaError> {
        let host = strip_port(hostname);
        if host.is_empty() {
            return Err(CaError::InvalidHostname(hostname.to_string()));
        }
        let key = RsaKey::generate()?;

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, host);
        if let Some(org) = &self.organization {
            dn.push(DnType::OrganizationName, org.clone());
        }

        let mut params = CertificateParams::default();
        params.distinguished_name = dn;
        params.serial_number = Some(random_serial());
        params.key_identifier_method = KeyIdMethod::PreSpecified(key.subject_key_identifier());
        params.use_authority_key_identifier_extension = true;
        params.is_ca = IsCa::ExplicitNoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        params.subject_alt_names = match host.parse::<IpAddr>() {
            Ok(ip) => vec![SanType::IpAddress(ip)],
            Err(_) => vec![SanType::DnsName(
                host.try_into()
                    .map_err(|_| CaError::InvalidHostname(hostname.to_string()))?,
            )],
        };
        let now = OffsetDateTime::now_utc();
        params.not_before = now - self.validity;
        params.not_after = now + self.validity;

        let cert = params.signed_by(&key.key_pair, &self.issuer)?;
        debug!(host, "Issued leaf certificate");

        Ok(LeafCertificate {
            chain: vec![cert.der().clone(), self.cert_der.clone()],
            key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key.key_pair.serialize_der())),
        })
    }

    /// rustls server config presenting a leaf for `hostname`, HTTP/1.1 only.
    pub fn server_config(&self, hostname: &str) -> Result<Arc<rustls::ServerConfig>, CaError> {
        let leaf = self.issue_leaf(hostname)?;
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut config = rustls::ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(leaf.chain, leaf.key)?;
        config.alpn_protocols = vec![b"http/1.1".to_vec()];
        Ok(Arc::new(config))
    }
}

/// RSA key material in the forms the rest of the CA needs.
struct RsaKey {
    key_pair: KeyPair,
    pkcs8_pem: String,
    spki_der: Vec<u8>,
}

impl RsaKey {
    fn generate() -> Result<Self, CaError> {
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), RSA_KEY_BITS)
            .map_err(|e| CaError::Key(e.to_string()))?;
        Self::from_private(&private)
    }

    fn from_pem(pem: &str) -> Result<Self, CaError> {
        let private = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| CaError::Key(format!("not a PKCS#8 or PKCS#1 RSA key: {e}")))?;
        Self::from_private(&private)
    }

    fn from_private(private: &RsaPrivateKey) -> Result<Self, CaError> {
        let pkcs8_pem = private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| CaError::Key(e.to_string()))?;
        let spki = private
            .to_public_key()
            .to_public_key_der()
            .map_err(|e| CaError::Key(e.to_string()))?;
        let key_pair = KeyPair::from_pem_and_sign_algo(&pkcs8_pem, &PKCS_RSA_SHA256)?;
        Ok(Self {
            key_pair,
            pkcs8_pem: pkcs8_pem.as_str().to_string(),
            spki_der: spki.as_bytes().to_vec(),
        })
    }

    /// SHA-1 of the DER-encoded SubjectPublicKeyInfo.
    fn subject_key_identifier(&self) -> Vec<u8> {
        Sha1::digest(&self.spki_der).to_vec()
    }
}

/// Organization of the CA subject, copied into every leaf.
fn ca_organization(cert_der: &CertificateDer<'_>) -> Result<Option<DnValue>, CaError> {
    let (_, cert) = x509_parser::parse_x509_certificate(cert_der.as_ref())
        .map_err(|e| CaError::Pem(e.to_string()))?;
    let organization = cert
        .subject()
        .iter_organization()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(|org| DnValue::Utf8String(org.to_string()));
    Ok(organization)
}

fn random_serial() -> SerialNumber {
    let mut bytes = [0u8; SERIAL_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    // Keep the DER integer positive.
    bytes[0] &= 0x7f;
    SerialNumber::from_slice(&bytes)
}

/// `example.com:443` -> `example.com`, `[::1]:443` -> `::1`
pub fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        // A bare IPv6 literal has more than one colon.
        Some((name, _)) if !name.contains(':') => name,
        _ => host,
    }
}

async fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(path).await?;
    file.write_all(contents).await?;
    file.flush().await
}
