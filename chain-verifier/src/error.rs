use std::path::PathBuf;

use thiserror::Error;

/// Failure to turn PEM text into a structured certificate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Invalid PEM encoding: {0}")]
    InvalidPem(String),

    #[error("Unexpected PEM label {0:?}, expected CERTIFICATE")]
    UnexpectedLabel(String),

    #[error("Invalid X.509 certificate: {0}")]
    InvalidCertificate(String),
}

/// Reason a chain was not accepted.
///
/// These never cross the callback boundary; they are logged and folded into
/// a boolean verdict there.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("Malformed certificate: {0}")]
    Decode(#[from] DecodeError),

    #[error("Certificate chain is empty")]
    EmptyChain,

    #[error("Untrusted certificate chain: {0}")]
    Untrusted(webpki::Error),

    #[error("Address {0:?} is not a valid DNS name or IP address")]
    InvalidServerName(String),

    #[error("Leaf certificate is not valid for {address}")]
    HostnameMismatch { address: String },

    #[error("Depth sequence skipped from {from} to {to}")]
    IrregularDepthSequence { from: u32, to: u32 },

    #[error("Chain depth {depth} exceeds the configured maximum of {max}")]
    ChainTooLong { depth: u32, max: u32 },

    #[error("Session address must not be empty")]
    EmptyAddress,

    #[error("Verification aborted by a panic")]
    Panicked,
}

/// Failure to assemble the set of trusted roots.
///
/// Cloneable so a cached initialization failure can be handed out again
/// instead of being retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrustStoreError {
    #[error("Failed to load platform trust store: {0}")]
    Native(String),

    #[error("Failed to read CA bundle {path}: {reason}")]
    BundleRead { path: PathBuf, reason: String },

    #[error("Invalid CA bundle {path}: {reason}")]
    BundleParse { path: PathBuf, reason: String },

    #[error("Trust store from {0} contains no usable anchors")]
    Empty(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Source(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors raised while bringing a verifier up. Per-verification failures are
/// [`VerifyError`]s and never surface here.
#[derive(Error, Debug)]
pub enum VerifierError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    TrustStore(#[from] TrustStoreError),
}

pub type VerifierResult<T> = Result<T, VerifierError>;
