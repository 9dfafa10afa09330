//! In-process stand-ins for the chain and the randomness beacon
use std::collections::BTreeMap;
use std::sync::Mutex;

use agora_core::bincode::STD_BINCODE_CONFIG;
use agora_core::payload::{Randomness, TxHash};
use agora_core::peer::PeerSeckey;
use agora_util_bincode::encode_infallible;
use async_trait::async_trait;

use crate::external::{
    ChainApi, ExternalError, ExternalResult, RandomnessObservation, RandomnessSource, Receipt,
    SERVICE_REGISTRY, TERMINATION_SIGNAL,
};

#[derive(Default)]
struct MockChainInner {
    receipts: BTreeMap<TxHash, Receipt>,
    sent: Vec<(String, String, TxHash)>,
    nonce: u64,
    termination_signal: Option<TxHash>,
    fail_next_sends: usize,
    fail_next_reads: usize,
    withhold_next_receipts: usize,
}

/// Chain shared by all peers of a local run
///
/// Sent transactions succeed and get a receipt immediately.
#[derive(Default)]
pub struct MockChain {
    inner: Mutex<MockChainInner>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockChainInner> {
        self.inner.lock().expect("Locking failed")
    }

    /// Make the service registry report that the service should terminate
    pub fn set_termination_signal(&self, tx_hash: TxHash) {
        self.lock().termination_signal = Some(tx_hash);
    }

    pub fn fail_next_sends(&self, n: usize) {
        self.lock().fail_next_sends = n;
    }

    pub fn fail_next_reads(&self, n: usize) {
        self.lock().fail_next_reads = n;
    }

    /// Answer the next `n` receipt queries as if the receipt wasn't there yet
    pub fn withhold_next_receipts(&self, n: usize) {
        self.lock().withhold_next_receipts = n;
    }

    /// `(contract, method, tx_hash)` of every sent transaction, in order
    pub fn sent_transactions(&self) -> Vec<(String, String, TxHash)> {
        self.lock().sent.clone()
    }
}

#[async_trait]
impl ChainApi for MockChain {
    async fn read(&self, contract: &str, method: &str, _args: &[u8]) -> ExternalResult<Vec<u8>> {
        let mut inner = self.lock();
        if 0 < inner.fail_next_reads {
            inner.fail_next_reads -= 1;
            return Err(ExternalError::Failed {
                message: "Read failed".into(),
            });
        }
        match (contract, method) {
            (SERVICE_REGISTRY, TERMINATION_SIGNAL) => {
                Ok(encode_infallible(&inner.termination_signal, STD_BINCODE_CONFIG))
            }
            _ => Err(ExternalError::Failed {
                message: format!("Unknown method {contract}.{method}"),
            }),
        }
    }

    async fn build_and_send(
        &self,
        contract: &str,
        method: &str,
        args: &[u8],
        signer: PeerSeckey,
    ) -> ExternalResult<TxHash> {
        let mut inner = self.lock();
        if 0 < inner.fail_next_sends {
            inner.fail_next_sends -= 1;
            return Err(ExternalError::Failed {
                message: "Transaction rejected".into(),
            });
        }

        let mut hasher = blake3::Hasher::new();
        hasher.update(contract.as_bytes());
        hasher.update(method.as_bytes());
        hasher.update(args);
        hasher.update(signer.pubkey().as_slice());
        hasher.update(&inner.nonce.to_be_bytes());
        inner.nonce += 1;
        let tx_hash = TxHash::from_bytes(*hasher.finalize().as_bytes());

        inner.receipts.insert(
            tx_hash,
            Receipt {
                tx_hash,
                success: true,
            },
        );
        inner
            .sent
            .push((contract.to_owned(), method.to_owned(), tx_hash));
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> ExternalResult<Option<Receipt>> {
        let mut inner = self.lock();
        if 0 < inner.withhold_next_receipts {
            inner.withhold_next_receipts -= 1;
            return Ok(None);
        }
        Ok(inner.receipts.get(&tx_hash).cloned())
    }
}

#[derive(Default)]
struct MockRandomnessInner {
    round: u64,
    fail_next: usize,
}

/// Deterministic beacon: the value is a hash of a seed and the current round
pub struct MockRandomness {
    seed: [u8; 32],
    inner: Mutex<MockRandomnessInner>,
}

impl MockRandomness {
    pub fn new(seed: [u8; 32]) -> Self {
        Self {
            seed,
            inner: Mutex::new(MockRandomnessInner {
                round: 1,
                fail_next: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockRandomnessInner> {
        self.inner.lock().expect("Locking failed")
    }

    pub fn round(&self) -> u64 {
        self.lock().round
    }

    /// Move the beacon to its next round
    pub fn advance(&self) {
        self.lock().round += 1;
    }

    pub fn fail_next(&self, n: usize) {
        self.lock().fail_next = n;
    }

    pub fn value_at(&self, round: u64) -> Randomness {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.seed);
        hasher.update(&round.to_be_bytes());
        Randomness::from_bytes(*hasher.finalize().as_bytes())
    }
}

#[async_trait]
impl RandomnessSource for MockRandomness {
    async fn fetch(&self) -> ExternalResult<RandomnessObservation> {
        let round = {
            let mut inner = self.lock();
            if 0 < inner.fail_next {
                inner.fail_next -= 1;
                return Err(ExternalError::Failed {
                    message: "Beacon unavailable".into(),
                });
            }
            inner.round
        };
        Ok(RandomnessObservation {
            round,
            randomness: self.value_at(round),
        })
    }
}
