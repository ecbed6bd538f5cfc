//! Per-address chain accumulation
//!
//! The external TLS layer calls [`ChainAssembler::submit`] once per
//! certificate, root first, counting depth down to 0. Certificates are
//! buffered per address; the depth-0 call removes the session from the map
//! before anything is decoded, so no outcome of validation (error or panic)
//! can leave certificate material behind.

use crate::chain::CertificateChain;
use crate::config::VerifierConfig;
use crate::decoder::CertificateDecoder;
use crate::error::VerifyError;
use crate::session::{Append, VerificationSession};
use crate::verifier::ChainVerifier;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Result of a single callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// More certificates are expected for this address.
    Pending,
    Trusted,
    Rejected(VerifyError),
}

impl Verdict {
    /// What the TLS layer is told: `Pending` accepts for now, since the
    /// real check happens once the leaf arrives.
    pub fn accepts(&self) -> bool {
        !matches!(self, Verdict::Rejected(_))
    }

    pub fn is_final(&self) -> bool {
        !matches!(self, Verdict::Pending)
    }
}

pub struct ChainAssembler {
    sessions: DashMap<String, VerificationSession>,
    verifier: ChainVerifier,
    decoder: &'static CertificateDecoder,
    max_chain_depth: u32,
    strict_depth_sequence: bool,
    session_ttl: Option<Duration>,
}

impl ChainAssembler {
    pub fn new(verifier: ChainVerifier, config: &VerifierConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            verifier,
            decoder: CertificateDecoder::shared(),
            max_chain_depth: config.max_chain_depth,
            strict_depth_sequence: config.strict_depth_sequence,
            session_ttl: config.session_ttl(),
        }
    }

    /// Buffer `pem` for `address`; at depth 0 validate the whole chain and
    /// forget the session.
    pub fn submit(&self, address: &str, pem: &str, depth: u32) -> Verdict {
        if address.is_empty() {
            warn!(depth, "Certificate submitted without a server address");
            return Verdict::Rejected(VerifyError::EmptyAddress);
        }

        if !self.sessions.contains_key(address) {
            self.purge_stale();
        }

        let finished = match self.sessions.entry(address.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get_mut().append(pem, depth) == Append::Superseded {
                    warn!(
                        address,
                        depth,
                        state = ?occupied.get().state(),
                        "Discarding unfinished chain, a new handshake started"
                    );
                    occupied.insert(VerificationSession::open(pem, depth, self.max_chain_depth));
                }

                if occupied.get().is_finalizing() {
                    Some(occupied.remove())
                } else {
                    None
                }
            }
            Entry::Vacant(vacant) => {
                let session = VerificationSession::open(pem, depth, self.max_chain_depth);
                if session.is_finalizing() {
                    Some(session)
                } else {
                    vacant.insert(session);
                    None
                }
            }
        };

        match finished {
            Some(session) => self.finalize(address, session),
            None => {
                debug!(address, depth, "Buffered certificate");
                Verdict::Pending
            }
        }
    }

    /// Validate a session that is no longer in the map.
    fn finalize(&self, address: &str, session: VerificationSession) -> Verdict {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.evaluate(address, &session)));
        drop(session);

        match outcome {
            Ok(Ok(())) => Verdict::Trusted,
            Ok(Err(e)) => {
                warn!(address, reason = %e, "Certificate chain rejected");
                Verdict::Rejected(e)
            }
            Err(_) => {
                error!(address, "Certificate verification panicked");
                Verdict::Rejected(VerifyError::Panicked)
            }
        }
    }

    fn evaluate(&self, address: &str, session: &VerificationSession) -> Result<(), VerifyError> {
        match session.anomaly() {
            Some(e @ VerifyError::IrregularDepthSequence { .. }) if !self.strict_depth_sequence => {
                warn!(address, anomaly = %e, "Validating chain with irregular depth sequence");
            }
            Some(e) => return Err(e.clone()),
            None => {}
        }

        let chain = CertificateChain::decode_received(self.decoder, session.pems())?;
        self.verifier.check(address, &chain)
    }

    /// Drop sessions that outlived the configured TTL, returning how many
    /// were removed.
    pub fn purge_stale(&self) -> usize {
        let Some(ttl) = self.session_ttl else {
            return 0;
        };

        let before = self.sessions.len();
        self.sessions.retain(|address, session| {
            let keep = session.age() < ttl;
            if !keep {
                warn!(address = %address, "Evicting stale certificate session");
            }
            keep
        });
        before.saturating_sub(self.sessions.len())
    }

    pub fn pending_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn has_session(&self, address: &str) -> bool {
        self.sessions.contains_key(address)
    }

    pub fn verifier(&self) -> &ChainVerifier {
        &self.verifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchors::TrustAnchorSet;
    use crate::test_utils::{self, ThreeTier};
    use std::sync::Arc;

    fn assembler_for(pki: &ThreeTier, config: &VerifierConfig) -> ChainAssembler {
        ChainAssembler::new(ChainVerifier::new(test_utils::anchors_for(&pki.root)), config)
    }

    fn submit_all(assembler: &ChainAssembler, address: &str, pems: &[String]) -> Verdict {
        let last = pems.len() - 1;
        let mut verdict = Verdict::Pending;
        for (index, pem) in pems.iter().enumerate() {
            verdict = assembler.submit(address, pem, (last - index) as u32);
        }
        verdict
    }

    #[test]
    fn test_pending_until_leaf() {
        let pki = ThreeTier::new("good.example.com");
        let assembler = assembler_for(&pki, &VerifierConfig::default());
        let pems = pki.root_first_pems();

        assert_eq!(assembler.submit("good.example.com", &pems[0], 2), Verdict::Pending);
        assert_eq!(assembler.submit("good.example.com", &pems[1], 1), Verdict::Pending);
        assert!(assembler.has_session("good.example.com"));

        assert_eq!(assembler.submit("good.example.com", &pems[2], 0), Verdict::Trusted);
        assert!(!assembler.has_session("good.example.com"));
    }

    #[test]
    fn test_session_removed_after_rejection() {
        let pki = ThreeTier::new("good.example.com");
        let assembler = assembler_for(&pki, &VerifierConfig::default());

        let verdict = submit_all(&assembler, "evil.example.com", &pki.root_first_pems());
        assert!(matches!(verdict, Verdict::Rejected(VerifyError::HostnameMismatch { .. })));
        assert_eq!(assembler.pending_sessions(), 0);
    }

    #[test]
    fn test_malformed_pem_is_rejected_and_cleaned_up() {
        let pki = ThreeTier::new("good.example.com");
        let assembler = assembler_for(&pki, &VerifierConfig::default());

        assert_eq!(assembler.submit("good.example.com", "garbage", 1), Verdict::Pending);
        let verdict = assembler.submit("good.example.com", &pki.leaf.cert.pem(), 0);

        assert!(matches!(verdict, Verdict::Rejected(VerifyError::Decode(_))));
        assert!(!assembler.has_session("good.example.com"));
    }

    #[test]
    fn test_depth_gap_is_still_validated() {
        let pki = ThreeTier::new("good.example.com");
        let assembler = assembler_for(&pki, &VerifierConfig::default());

        assembler.submit("good.example.com", &pki.root.cert.pem(), 2);
        let verdict = assembler.submit("good.example.com", &pki.leaf.cert.pem(), 0);

        // The intermediate never arrived, so path building fails.
        assert!(matches!(verdict, Verdict::Rejected(VerifyError::Untrusted(_))));
        assert_eq!(assembler.pending_sessions(), 0);
    }

    #[test]
    fn test_depth_gap_rejected_when_strict() {
        let pki = ThreeTier::new("good.example.com");
        let config = VerifierConfig::default().with_strict_depth_sequence(true);
        let assembler = assembler_for(&pki, &config);

        assembler.submit("good.example.com", &pki.intermediate.cert.pem(), 2);
        let verdict = assembler.submit("good.example.com", &pki.leaf.cert.pem(), 0);

        assert_eq!(
            verdict,
            Verdict::Rejected(VerifyError::IrregularDepthSequence { from: 2, to: 0 })
        );
    }

    #[test]
    fn test_restarted_handshake_replaces_stale_chain() {
        let pki = ThreeTier::new("good.example.com");
        let assembler = assembler_for(&pki, &VerifierConfig::default());
        let unrelated = test_utils::make_ca("Leftover CA", None);

        // An aborted handshake left a partial chain behind.
        assembler.submit("good.example.com", &unrelated.cert.pem(), 3);
        assembler.submit("good.example.com", &unrelated.cert.pem(), 2);

        let verdict = submit_all(&assembler, "good.example.com", &pki.root_first_pems());
        assert_eq!(verdict, Verdict::Trusted);
    }

    #[test]
    fn test_oversized_chain_rejected() {
        let pki = ThreeTier::new("good.example.com");
        let config = VerifierConfig {
            max_chain_depth: 1,
            ..VerifierConfig::default()
        };
        let assembler = assembler_for(&pki, &config);

        let verdict = submit_all(&assembler, "good.example.com", &pki.root_first_pems());
        assert_eq!(
            verdict,
            Verdict::Rejected(VerifyError::ChainTooLong { depth: 2, max: 1 })
        );
        assert_eq!(assembler.pending_sessions(), 0);
    }

    #[test]
    fn test_empty_address_rejected_without_session() {
        let pki = ThreeTier::new("good.example.com");
        let assembler = assembler_for(&pki, &VerifierConfig::default());

        assert_eq!(
            assembler.submit("", &pki.root.cert.pem(), 2),
            Verdict::Rejected(VerifyError::EmptyAddress)
        );
        assert_eq!(assembler.pending_sessions(), 0);
    }

    #[test]
    fn test_purge_stale_sessions() {
        let pki = ThreeTier::new("good.example.com");
        let config = VerifierConfig::default().with_session_ttl(Duration::from_secs(1));
        let assembler = assembler_for(&pki, &config);

        assembler.submit("stale.example.com", &pki.root.cert.pem(), 2);
        assert_eq!(assembler.purge_stale(), 0);

        std::thread::sleep(Duration::from_millis(1100));
        assert_eq!(assembler.purge_stale(), 1);
        assert!(!assembler.has_session("stale.example.com"));
    }

    #[test]
    fn test_opening_new_session_evicts_stale_ones() {
        let pki = ThreeTier::new("good.example.com");
        let config = VerifierConfig::default().with_session_ttl(Duration::from_secs(1));
        let assembler = assembler_for(&pki, &config);

        assembler.submit("stale.example.com", &pki.root.cert.pem(), 2);
        std::thread::sleep(Duration::from_millis(1100));

        // Continuing an existing session does not purge.
        assert_eq!(
            assembler.submit("stale.example.com", &pki.intermediate.cert.pem(), 1),
            Verdict::Pending
        );
        assert!(assembler.has_session("stale.example.com"));

        assert_eq!(
            assembler.submit("fresh.example.com", &pki.root.cert.pem(), 2),
            Verdict::Pending
        );
        assert!(!assembler.has_session("stale.example.com"));
        assert!(assembler.has_session("fresh.example.com"));
        assert_eq!(assembler.pending_sessions(), 1);
    }

    #[test]
    fn test_purge_disabled_without_ttl() {
        let assembler = ChainAssembler::new(
            ChainVerifier::new(Arc::new(TrustAnchorSet::empty())),
            &VerifierConfig::default().with_session_ttl(Duration::ZERO),
        );
        assembler.submit("idle.example.com", "pem", 3);
        assert_eq!(assembler.purge_stale(), 0);
        assert_eq!(assembler.pending_sessions(), 1);
    }

    #[test]
    fn test_verdict_acceptance() {
        assert!(Verdict::Pending.accepts());
        assert!(Verdict::Trusted.accepts());
        assert!(!Verdict::Rejected(VerifyError::EmptyChain).accepts());
        assert!(!Verdict::Pending.is_final());
        assert!(Verdict::Trusted.is_final());
    }
}
