use crate::utils::hash_sum;
use log::{debug, warn};
use num_bigint::BigUint;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// How many candidate nonces are tried between two looks at the cancel flag.
pub const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// Cooperative cancellation for a running proof-of-work search.
///
/// Clones share the same flag, so the node can keep one handle and give the
/// other to the mining thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `true` when both handles share one flag.
    pub fn same_as(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Result of a search. `Aborted` is never confused with a nonce of zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowOutcome {
    Found(u64),
    /// The cancel token fired.
    Aborted,
    /// Every candidate nonce was tried without a hit.
    Exhausted,
}

/// Brute-force search for `nonce` such that
/// `sha256(block_hash || be64(nonce)) < 2^(256 - difficulty)`.
pub struct ProofOfWork {
    block_hash: Vec<u8>,
    target: BigUint,
}

impl ProofOfWork {
    pub fn new(block_hash: &[u8], difficulty: u8) -> ProofOfWork {
        let target = BigUint::from(1u8) << (256 - difficulty as usize);
        ProofOfWork {
            block_hash: block_hash.to_vec(),
            target,
        }
    }

    pub fn target(&self) -> &BigUint {
        &self.target
    }

    fn digest(&self, nonce: u64) -> Vec<u8> {
        hash_sum(&[&self.block_hash, &nonce.to_be_bytes()])
    }

    /// `true` when `nonce` meets the target.
    pub fn check(&self, nonce: u64) -> bool {
        BigUint::from_bytes_be(&self.digest(nonce)) < self.target
    }

    pub fn validate(block_hash: &[u8], difficulty: u8, nonce: u64) -> bool {
        ProofOfWork::new(block_hash, difficulty).check(nonce)
    }

    pub fn run(&self, cancel: &CancelToken) -> PowOutcome {
        self.search(0..=u64::MAX, cancel)
    }

    fn search(&self, nonces: RangeInclusive<u64>, cancel: &CancelToken) -> PowOutcome {
        for nonce in nonces {
            if nonce % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                debug!("Proof-of-work cancelled after {nonce} attempts");
                return PowOutcome::Aborted;
            }
            if self.check(nonce) {
                debug!("Proof-of-work solved with nonce {nonce}");
                return PowOutcome::Found(nonce);
            }
        }
        warn!("Proof-of-work ran out of nonces");
        PowOutcome::Exhausted
    }
}
