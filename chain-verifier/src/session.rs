//! Per-address accumulation of a chain in flight
//!
//! A session moves `Accumulating { remaining }` → `Finalizing` as depths
//! count down to 0. Depth sequences are checked as they arrive:
//! - a skipped level is recorded as an anomaly and the session carries on
//! - a depth at or above the previous one means a new handshake started,
//!   and the session must be replaced
//! - a first depth beyond the limit stops buffering altogether

use crate::error::VerifyError;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for more certificates. `remaining` is the last depth received,
    /// which is also the number of certificates still expected.
    Accumulating { remaining: u32 },
    /// The leaf arrived; the chain is ready for validation.
    Finalizing,
}

/// Outcome of offering a certificate to an existing session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Append {
    Accepted,
    /// The depth does not continue this session; a new handshake began.
    Superseded,
}

#[derive(Debug)]
pub struct VerificationSession {
    pems: Vec<String>,
    state: SessionState,
    anomaly: Option<VerifyError>,
    oversized: bool,
    opened_at: Instant,
}

impl VerificationSession {
    /// Start a session with its first certificate.
    pub fn open(pem: &str, depth: u32, max_depth: u32) -> Self {
        let oversized = depth > max_depth;
        let mut session = Self {
            pems: Vec::new(),
            state: SessionState::Accumulating { remaining: depth },
            anomaly: oversized.then_some(VerifyError::ChainTooLong {
                depth,
                max: max_depth,
            }),
            oversized,
            opened_at: Instant::now(),
        };
        session.push(pem, depth);
        session
    }

    pub fn append(&mut self, pem: &str, depth: u32) -> Append {
        let remaining = match self.state {
            SessionState::Accumulating { remaining } => remaining,
            SessionState::Finalizing => return Append::Superseded,
        };

        if depth >= remaining {
            return Append::Superseded;
        }

        if depth + 1 != remaining && self.anomaly.is_none() {
            self.anomaly = Some(VerifyError::IrregularDepthSequence {
                from: remaining,
                to: depth,
            });
        }

        self.push(pem, depth);
        Append::Accepted
    }

    fn push(&mut self, pem: &str, depth: u32) {
        if !self.oversized {
            self.pems.push(pem.to_owned());
        }
        self.state = if depth == 0 {
            SessionState::Finalizing
        } else {
            SessionState::Accumulating { remaining: depth }
        };
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_finalizing(&self) -> bool {
        self.state == SessionState::Finalizing
    }

    /// Buffered PEM blobs in received order (root first)
    pub fn pems(&self) -> &[String] {
        &self.pems
    }

    /// First structural problem seen in the depth sequence
    pub fn anomaly(&self) -> Option<&VerifyError> {
        self.anomaly.as_ref()
    }

    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }
}
