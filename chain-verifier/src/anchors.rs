//! Trusted roots used for path validation
//!
//! Anchors come from the platform store, the bundled Mozilla roots, or a
//! PEM bundle on disk (optionally layered on top of either of the first
//! two). The process-wide set is built once; a failure to build it is kept
//! and reported on every later request instead of being retried.

use crate::config::{TrustStoreSource, VerifierConfig};
use crate::error::TrustStoreError;
use once_cell::sync::OnceCell;
use pki_types::{CertificateDer, TrustAnchor};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

static SHARED_ANCHORS: OnceCell<Result<Arc<TrustAnchorSet>, TrustStoreError>> = OnceCell::new();

/// Read-only set of trust anchors
#[derive(Debug, Clone)]
pub struct TrustAnchorSet {
    anchors: Vec<TrustAnchor<'static>>,
    origin: String,
}

impl TrustAnchorSet {
    /// A set that trusts nothing. Only useful when validation is disabled.
    pub fn empty() -> Self {
        Self {
            anchors: Vec::new(),
            origin: "empty".to_string(),
        }
    }

    /// Process-wide anchors, built from `config` on first use.
    ///
    /// Later calls return the first outcome regardless of the config passed.
    pub fn shared(config: &VerifierConfig) -> Result<Arc<TrustAnchorSet>, TrustStoreError> {
        SHARED_ANCHORS
            .get_or_init(|| {
                let result = Self::load(config).map(Arc::new);
                if let Err(e) = &result {
                    tracing::error!("Trust store initialization failed: {}", e);
                }
                result
            })
            .clone()
    }

    /// Build a fresh set as described by `config`.
    pub fn load(config: &VerifierConfig) -> Result<Self, TrustStoreError> {
        let mut set = match config.trust_store {
            TrustStoreSource::Native => Self::native()?,
            TrustStoreSource::Bundled => Self::bundled(),
            TrustStoreSource::File => Self {
                anchors: Vec::new(),
                origin: "file".to_string(),
            },
        };

        if let Some(path) = &config.ca_bundle_path {
            let extra = Self::from_pem_file(path)?;
            set.origin = format!("{}+{}", set.origin, extra.origin);
            set.anchors.extend(extra.anchors);
        }

        if set.anchors.is_empty() {
            return Err(TrustStoreError::Empty(set.origin));
        }

        info!("Loaded {} trust anchors from {}", set.anchors.len(), set.origin);
        Ok(set)
    }

    /// Roots from the operating system certificate store. Roots that cannot
    /// be used as anchors are skipped.
    pub fn native() -> Result<Self, TrustStoreError> {
        let result = rustls_native_certs::load_native_certs();

        for error in &result.errors {
            warn!("Error when loading native certs: {}", error);
        }

        if result.certs.is_empty() {
            let reason = result
                .errors
                .first()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no certificates found".to_string());
            return Err(TrustStoreError::Native(reason));
        }

        let mut anchors = Vec::with_capacity(result.certs.len());
        for cert in &result.certs {
            match webpki::anchor_from_trusted_cert(cert) {
                Ok(anchor) => anchors.push(anchor.to_owned()),
                Err(e) => warn!("Skipping unusable platform root: {}", e),
            }
        }

        Ok(Self {
            anchors,
            origin: "native".to_string(),
        })
    }

    /// The Mozilla root program as shipped with `webpki-roots`
    pub fn bundled() -> Self {
        Self {
            anchors: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
            origin: "bundled".to_string(),
        }
    }

    pub fn from_pem_file(path: &Path) -> Result<Self, TrustStoreError> {
        let text = std::fs::read_to_string(path).map_err(|e| TrustStoreError::BundleRead {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let ders = pem::parse_many(&text)
            .map_err(|e| TrustStoreError::BundleParse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
            .into_iter()
            .filter(|block| block.tag() == "CERTIFICATE")
            .map(|block| CertificateDer::from(block.into_contents()));

        let mut set = Self::from_certificates(ders).map_err(|reason| TrustStoreError::BundleParse {
            path: path.to_path_buf(),
            reason,
        })?;
        set.origin = path.display().to_string();
        debug!("Read {} anchors from {}", set.anchors.len(), set.origin);
        Ok(set)
    }

    /// Anchors from DER certificates. Any certificate that cannot serve as an
    /// anchor fails the whole set.
    pub fn from_certificates<I>(certs: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = CertificateDer<'static>>,
    {
        let mut anchors = Vec::new();
        for (idx, cert) in certs.into_iter().enumerate() {
            let anchor = webpki::anchor_from_trusted_cert(&cert)
                .map_err(|e| format!("certificate number {idx}: {e}"))?;
            anchors.push(anchor.to_owned());
        }

        Ok(Self {
            anchors,
            origin: "memory".to_string(),
        })
    }

    pub fn as_slice(&self) -> &[TrustAnchor<'static>] {
        &self.anchors
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Where the anchors came from, for diagnostics
    pub fn origin(&self) -> &str {
        &self.origin
    }
}
