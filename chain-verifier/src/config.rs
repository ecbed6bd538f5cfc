//! Verifier configuration
//!
//! Settings are read with the `config` crate from an optional file (TOML,
//! YAML or JSON, picked by extension) overlaid by `CHAIN_VERIFIER_*`
//! environment variables:
//! - Whether chains are validated at all
//! - Where trust anchors come from
//! - Depth and session limits for the assembler

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Upper bound accepted for `max_chain_depth`
pub const MAX_CHAIN_DEPTH_LIMIT: u32 = 64;

/// Trust anchor source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustStoreSource {
    /// Operating system certificate store
    Native,
    /// Mozilla root program compiled into the binary
    Bundled,
    /// PEM bundle at `ca_bundle_path` only
    File,
}

impl FromStr for TrustStoreSource {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "native" | "system" | "platform" => Ok(TrustStoreSource::Native),
            "bundled" | "mozilla" | "webpki-roots" => Ok(TrustStoreSource::Bundled),
            "file" | "pem" | "bundle" => Ok(TrustStoreSource::File),
            _ => Err(ConfigError::Invalid(format!(
                "Unknown trust store: {}. Valid options: native, bundled, file",
                s
            ))),
        }
    }
}

impl Default for TrustStoreSource {
    fn default() -> Self {
        TrustStoreSource::Native
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Run trust path and hostname checks. When false every complete chain
    /// is accepted.
    pub validate: bool,

    pub trust_store: TrustStoreSource,

    /// Extra (or, with `File`, the only) trusted roots in PEM form
    pub ca_bundle_path: Option<PathBuf>,

    /// Largest depth accepted from the TLS layer
    pub max_chain_depth: u32,

    /// Reject sessions whose depths skip a level instead of validating
    /// whatever arrived
    pub strict_depth_sequence: bool,

    /// Lifetime of a session that never saw depth 0. Zero disables pruning.
    pub session_ttl_seconds: u64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            validate: true,
            trust_store: TrustStoreSource::Native,
            ca_bundle_path: None,
            max_chain_depth: 10,
            strict_depth_sequence: false,
            session_ttl_seconds: 300,
        }
    }
}

impl VerifierConfig {
    pub const ENV_PREFIX: &'static str = "CHAIN_VERIFIER";

    /// Load from `path` (if any) and the environment, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let config: Self = builder
            .add_source(config::Environment::with_prefix(Self::ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Configuration from `CHAIN_VERIFIER_*` environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trust_store == TrustStoreSource::File && self.ca_bundle_path.is_none() {
            return Err(ConfigError::Invalid(
                "ca_bundle_path is required when trust_store is 'file'".to_string(),
            ));
        }

        if self.max_chain_depth == 0 {
            return Err(ConfigError::Invalid(
                "max_chain_depth must be at least 1".to_string(),
            ));
        }

        if self.max_chain_depth > MAX_CHAIN_DEPTH_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "max_chain_depth must not exceed {MAX_CHAIN_DEPTH_LIMIT}, got {}",
                self.max_chain_depth
            )));
        }

        Ok(())
    }

    pub fn session_ttl(&self) -> Option<Duration> {
        (self.session_ttl_seconds > 0).then(|| Duration::from_secs(self.session_ttl_seconds))
    }

    pub fn with_trust_store(mut self, source: TrustStoreSource) -> Self {
        self.trust_store = source;
        self
    }

    pub fn with_ca_bundle(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_bundle_path = Some(path.into());
        self
    }

    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validate = enabled;
        self
    }

    pub fn with_strict_depth_sequence(mut self, strict: bool) -> Self {
        self.strict_depth_sequence = strict;
        self
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl_seconds = ttl.as_secs();
        self
    }
}
