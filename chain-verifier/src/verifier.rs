use crate::anchors::TrustAnchorSet;
use crate::chain::CertificateChain;
use crate::error::VerifyError;
use pki_types::{CertificateDer, ServerName, UnixTime};
use std::sync::Arc;
use tracing::{debug, info, warn};
use webpki::{EndEntityCert, KeyUsage};

/// Validates a complete, leaf-first chain for a server address.
///
/// Trust path validation runs first (signatures up to an anchor, validity
/// periods, basic constraints, serverAuth usage). Only a trusted chain has its
/// leaf matched against the address.
///
/// The address is matched against the leaf's subject alternative names only.
/// A leaf that carries its host name solely in the subject CN is rejected
/// with [`VerifyError::HostnameMismatch`].
#[derive(Debug, Clone)]
pub struct ChainVerifier {
    anchors: Arc<TrustAnchorSet>,
    validate: bool,
}

impl ChainVerifier {
    pub fn new(anchors: Arc<TrustAnchorSet>) -> Self {
        Self {
            anchors,
            validate: true,
        }
    }

    /// Accept every complete chain without trust or hostname checks.
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validate = enabled;
        self
    }

    pub fn anchors(&self) -> &TrustAnchorSet {
        &self.anchors
    }

    /// Boolean verdict. The reason for a rejection is logged, never returned.
    pub fn verify(&self, address: &str, chain: &CertificateChain) -> bool {
        match self.check(address, chain) {
            Ok(()) => true,
            Err(e) => {
                warn!(address, reason = %e, "Rejected certificate chain");
                false
            }
        }
    }

    /// Same checks as [`ChainVerifier::verify`], keeping the reason.
    pub fn check(&self, address: &str, chain: &CertificateChain) -> Result<(), VerifyError> {
        let leaf = chain.leaf().ok_or(VerifyError::EmptyChain)?;

        if !self.validate {
            warn!(
                address,
                leaf = %leaf,
                "Certificate validation is disabled, accepting chain"
            );
            return Ok(());
        }

        if !chain.is_linked() {
            debug!(address, "Chain is not in issuer order, relying on path building");
        }

        let end_entity = EndEntityCert::try_from(leaf.der()).map_err(VerifyError::Untrusted)?;
        let intermediates = chain
            .intermediates()
            .iter()
            .map(|cert| CertificateDer::from(cert.der().as_ref()))
            .collect::<Vec<_>>();

        end_entity
            .verify_for_usage(
                webpki::ALL_VERIFICATION_ALGS,
                self.anchors.as_slice(),
                &intermediates,
                UnixTime::now(),
                KeyUsage::server_auth(),
                None,
                None,
            )
            .map_err(VerifyError::Untrusted)?;

        let server_name = ServerName::try_from(address)
            .map_err(|_| VerifyError::InvalidServerName(address.to_string()))?;

        end_entity
            .verify_is_valid_for_subject_name(&server_name)
            .map_err(|e| {
                debug!(
                    address,
                    dns_names = ?leaf.dns_names(),
                    ip_addresses = ?leaf.ip_addresses(),
                    error = %e,
                    "Leaf names do not cover address"
                );
                VerifyError::HostnameMismatch {
                    address: address.to_string(),
                }
            })?;

        info!(address, leaf = %leaf, depth = chain.len(), "Certificate chain trusted");
        Ok(())
    }
}
