//! PEM to structured certificate decoding
//!
//! The decoder is stateless and shared process-wide. Every decoded
//! certificate keeps its DER bytes for path validation plus the handful of
//! fields needed to explain a verdict in the logs (names, serial, validity,
//! SANs and a SHA-256 fingerprint). Certificate text itself is never logged.

use crate::error::DecodeError;
use once_cell::sync::Lazy;
use pki_types::CertificateDer;
use sha2::{Digest, Sha256};
use std::fmt;
use std::net::IpAddr;
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::*;

const CERTIFICATE_LABELS: [&str; 2] = ["CERTIFICATE", "X509 CERTIFICATE"];

static DECODER: Lazy<CertificateDecoder> = Lazy::new(CertificateDecoder::new);

/// Certificate decoded from a single PEM block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCertificate {
    der: CertificateDer<'static>,
    subject: String,
    issuer: String,
    serial: String,
    not_before: i64,
    not_after: i64,
    is_ca: bool,
    dns_names: Vec<String>,
    ip_addresses: Vec<IpAddr>,
    fingerprint_sha256: String,
}

impl DecodedCertificate {
    pub fn der(&self) -> &CertificateDer<'static> {
        &self.der
    }

    /// Subject distinguished name in RFC 4514 form
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Serial number as colon separated hex
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Start of the validity window, seconds since the Unix epoch
    pub fn not_before(&self) -> i64 {
        self.not_before
    }

    /// End of the validity window, seconds since the Unix epoch
    pub fn not_after(&self) -> i64 {
        self.not_after
    }

    pub fn is_ca(&self) -> bool {
        self.is_ca
    }

    /// DNS names from the subjectAltName extension
    pub fn dns_names(&self) -> &[String] {
        &self.dns_names
    }

    /// IP addresses from the subjectAltName extension
    pub fn ip_addresses(&self) -> &[IpAddr] {
        &self.ip_addresses
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint_sha256
    }

    pub fn is_self_issued(&self) -> bool {
        self.subject == self.issuer
    }
}

impl fmt::Display for DecodedCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (sha256:{})", self.subject, self.fingerprint_sha256)
    }
}

/// Stateless PEM → X.509 decoder
#[derive(Debug, Default)]
pub struct CertificateDecoder {
    _private: (),
}

impl CertificateDecoder {
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// The process-wide decoder instance
    pub fn shared() -> &'static CertificateDecoder {
        &DECODER
    }

    /// Decode one PEM-armored certificate.
    pub fn decode(&self, pem_text: &str) -> Result<DecodedCertificate, DecodeError> {
        let block = ::pem::parse(pem_text).map_err(|e| DecodeError::InvalidPem(e.to_string()))?;

        if !CERTIFICATE_LABELS.contains(&block.tag()) {
            return Err(DecodeError::UnexpectedLabel(block.tag().to_string()));
        }

        self.decode_der(block.into_contents())
    }

    /// Decode DER bytes that were already stripped of their armor.
    pub fn decode_der(&self, der: Vec<u8>) -> Result<DecodedCertificate, DecodeError> {
        let fingerprint_sha256 = hex::encode(Sha256::digest(&der));

        let (subject, issuer, serial, not_before, not_after, is_ca, dns_names, ip_addresses) = {
            let (rest, cert) = X509Certificate::from_der(&der)
                .map_err(|e| DecodeError::InvalidCertificate(e.to_string()))?;
            if !rest.is_empty() {
                return Err(DecodeError::InvalidCertificate(format!(
                    "{} trailing bytes after certificate",
                    rest.len()
                )));
            }

            let (dns_names, ip_addresses) = subject_alt_names(&cert)?;

            (
                cert.subject().to_string(),
                cert.issuer().to_string(),
                cert.raw_serial_as_string(),
                cert.validity().not_before.timestamp(),
                cert.validity().not_after.timestamp(),
                cert.is_ca(),
                dns_names,
                ip_addresses,
            )
        };

        Ok(DecodedCertificate {
            der: CertificateDer::from(der),
            subject,
            issuer,
            serial,
            not_before,
            not_after,
            is_ca,
            dns_names,
            ip_addresses,
            fingerprint_sha256,
        })
    }

    /// Decode every certificate block in a PEM bundle, in file order.
    /// Blocks with other labels (keys, CRLs) are skipped.
    pub fn decode_bundle(&self, pem_text: &str) -> Result<Vec<DecodedCertificate>, DecodeError> {
        ::pem::parse_many(pem_text)
            .map_err(|e| DecodeError::InvalidPem(e.to_string()))?
            .into_iter()
            .filter(|block| CERTIFICATE_LABELS.contains(&block.tag()))
            .map(|block| self.decode_der(block.into_contents()))
            .collect()
    }
}

/// Split a PEM bundle into one armored string per certificate, in file
/// order. This is the shape in which a TLS layer hands certificates over.
pub fn split_bundle(pem_text: &str) -> Result<Vec<String>, DecodeError> {
    Ok(::pem::parse_many(pem_text)
        .map_err(|e| DecodeError::InvalidPem(e.to_string()))?
        .iter()
        .filter(|block| CERTIFICATE_LABELS.contains(&block.tag()))
        .map(::pem::encode)
        .collect())
}

fn subject_alt_names(cert: &X509Certificate<'_>) -> Result<(Vec<String>, Vec<IpAddr>), DecodeError> {
    let mut dns_names = Vec::new();
    let mut ip_addresses = Vec::new();

    let san = cert
        .subject_alternative_name()
        .map_err(|e| DecodeError::InvalidCertificate(e.to_string()))?;

    if let Some(san) = san {
        for name in &san.value.general_names {
            match name {
                GeneralName::DNSName(dns) => dns_names.push(dns.to_string()),
                GeneralName::IPAddress(bytes) => {
                    if let Some(ip) = ip_from_octets(bytes) {
                        ip_addresses.push(ip);
                    }
                }
                _ => {}
            }
        }
    }

    Ok((dns_names, ip_addresses))
}

fn ip_from_octets(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => <[u8; 4]>::try_from(bytes).ok().map(IpAddr::from),
        16 => <[u8; 16]>::try_from(bytes).ok().map(IpAddr::from),
        _ => None,
    }
}
