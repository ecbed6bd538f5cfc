use crate::decoder::{CertificateDecoder, DecodedCertificate};
use crate::error::DecodeError;
use std::slice;

/// Decoded certificate chain, leaf first.
///
/// Index 0 is the server certificate and each following index moves one step
/// toward the root. The TLS layer delivers certificates root first, so the
/// received order is reversed exactly once, at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateChain {
    certs: Box<[DecodedCertificate]>,
}

impl CertificateChain {
    /// Build a chain from certificates in the order they were received
    /// (root first).
    pub fn from_received(mut received: Vec<DecodedCertificate>) -> Self {
        received.reverse();
        Self {
            certs: received.into_boxed_slice(),
        }
    }

    /// Decode PEM blobs given in received order and build the chain.
    pub fn decode_received<S: AsRef<str>>(
        decoder: &CertificateDecoder,
        pems: &[S],
    ) -> Result<Self, DecodeError> {
        let decoded = pems
            .iter()
            .map(|pem| decoder.decode(pem.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_received(decoded))
    }

    pub fn leaf(&self) -> Option<&DecodedCertificate> {
        self.certs.first()
    }

    /// Everything above the leaf, nearest issuer first
    pub fn intermediates(&self) -> &[DecodedCertificate] {
        self.certs.get(1..).unwrap_or_default()
    }

    pub fn get(&self, index: usize) -> Option<&DecodedCertificate> {
        self.certs.get(index)
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, DecodedCertificate> {
        self.certs.iter()
    }

    /// Whether every certificate names the next one as its issuer. Only a
    /// diagnostic: path validation decides trust.
    pub fn is_linked(&self) -> bool {
        self.certs
            .windows(2)
            .all(|pair| matches!(pair, [child, parent] if child.issuer() == parent.subject()))
    }
}

impl<'a> IntoIterator for &'a CertificateChain {
    type Item = &'a DecodedCertificate;
    type IntoIter = slice::Iter<'a, DecodedCertificate>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
