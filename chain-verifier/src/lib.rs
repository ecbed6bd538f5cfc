//! Incremental TLS certificate-chain verification
//!
//! An external TLS implementation that validates server certificates itself
//! hands over one certificate per callback, root first, with the chain depth
//! counting down to 0 at the leaf. This crate:
//! - Buffers the certificates per server address until the leaf arrives
//! - Rebuilds the chain leaf first
//! - Validates it against trusted roots (platform store, bundled Mozilla
//!   roots, or a PEM bundle)
//! - Checks the address against the leaf's subject alternative names
//! - Forgets the session whatever the outcome
//!
//! Every per-verification failure collapses into a boolean at the callback
//! boundary; reasons are logged through `tracing`.
//!
//! # Example
//!
//! ```no_run
//! use chain_verifier::{CertificateVerifier, VerifierConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let verifier = CertificateVerifier::new(VerifierConfig::from_env()?)?;
//!
//!     # let (root_pem, intermediate_pem, leaf_pem) = ("", "", "");
//!     // Called by the TLS layer, root first.
//!     assert!(verifier.verify_certificate("sync.example.com", root_pem, 2));
//!     assert!(verifier.verify_certificate("sync.example.com", intermediate_pem, 1));
//!     let trusted = verifier.verify_certificate("sync.example.com", leaf_pem, 0);
//!     println!("trusted: {}", trusted);
//!     Ok(())
//! }
//! ```

pub mod anchors;
pub mod assembler;
pub mod chain;
pub mod config;
pub mod decoder;
pub mod error;
pub mod session;
pub mod verifier;

#[cfg(test)]
pub(crate) mod test_utils;

pub use anchors::TrustAnchorSet;
pub use assembler::{ChainAssembler, Verdict};
pub use chain::CertificateChain;
pub use config::{TrustStoreSource, VerifierConfig, MAX_CHAIN_DEPTH_LIMIT};
pub use decoder::{split_bundle, CertificateDecoder, DecodedCertificate};
pub use error::*;
pub use session::{SessionState, VerificationSession};
pub use verifier::ChainVerifier;

use once_cell::sync::OnceCell;
use std::sync::Arc;

static GLOBAL_VERIFIER: OnceCell<VerifierResult<CertificateVerifier>> = OnceCell::new();

/// Owned verifier: configuration, anchors and the session store.
pub struct CertificateVerifier {
    assembler: ChainAssembler,
}

impl CertificateVerifier {
    /// Validate `config` and build a verifier on the process-wide anchors.
    pub fn new(config: VerifierConfig) -> VerifierResult<Self> {
        config.validate()?;

        let anchors = if config.validate {
            TrustAnchorSet::shared(&config)?
        } else {
            tracing::warn!("Certificate validation disabled, no trust anchors loaded");
            Arc::new(TrustAnchorSet::empty())
        };

        Ok(Self::with_anchors(config, anchors))
    }

    /// Like [`CertificateVerifier::new`], but loads anchors of its own instead
    /// of sharing the process-wide set.
    pub fn standalone(config: VerifierConfig) -> VerifierResult<Self> {
        config.validate()?;

        let anchors = if config.validate {
            TrustAnchorSet::load(&config)?
        } else {
            TrustAnchorSet::empty()
        };

        Ok(Self::with_anchors(config, Arc::new(anchors)))
    }

    /// Build a verifier on an explicit anchor set.
    pub fn with_anchors(config: VerifierConfig, anchors: Arc<TrustAnchorSet>) -> Self {
        let verifier = ChainVerifier::new(anchors).with_validation(config.validate);
        Self {
            assembler: ChainAssembler::new(verifier, &config),
        }
    }

    pub fn submit(&self, address: &str, pem: &str, depth: u32) -> Verdict {
        self.assembler.submit(address, pem, depth)
    }

    /// The callback contract: `true` for any depth above 0, the verdict at 0.
    pub fn verify_certificate(&self, address: &str, pem: &str, depth: u32) -> bool {
        self.submit(address, pem, depth).accepts()
    }

    pub fn assembler(&self) -> &ChainAssembler {
        &self.assembler
    }
}

/// Process-wide callback entry point.
///
/// The first call builds a verifier from `CHAIN_VERIFIER_*` environment
/// settings. If that fails, the failure is kept and every call returns
/// `false`.
pub fn verify_certificate(address: &str, pem: &str, depth: u32) -> bool {
    let verifier = GLOBAL_VERIFIER.get_or_init(|| {
        VerifierConfig::from_env()
            .map_err(VerifierError::from)
            .and_then(CertificateVerifier::new)
    });

    match verifier {
        Ok(verifier) => verifier.verify_certificate(address, pem, depth),
        Err(e) => {
            tracing::error!(address, depth, "Certificate verifier unavailable: {}", e);
            false
        }
    }
}
