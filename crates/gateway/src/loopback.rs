#[cfg(test)]
mod tests;

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use agora_core::block::{Block, BlockHash, BlockHeight};
use agora_core::payload::PayloadRaw;
use agora_core::signed::Signed;
use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::{ConsensusGateway, GatewayError, GatewayResult, GatewayStatus, LOG_TARGET, SubmitAck};

const DEFAULT_MAX_KEPT_BLOCKS: usize = 1024;

/// In-memory ordering service shared by all local peers
///
/// Whatever was submitted since the last block goes into the next one, in
/// submission order.
pub struct LoopbackGateway {
    inner: Mutex<Inner>,
    height_tx: watch::Sender<BlockHeight>,
    syncing_tx: watch::Sender<bool>,
}

struct Inner {
    pending: Vec<Signed<PayloadRaw>>,
    blocks: VecDeque<Block>,
    /// Height of the block preceding the first one this gateway produces
    start_height: BlockHeight,
    max_kept_blocks: usize,
    fail_next_submissions: usize,
}

impl Default for LoopbackGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackGateway {
    pub fn new() -> Self {
        Self::new_at(BlockHeight::ZERO)
    }

    /// Gateway continuing after an already committed `height`
    pub fn new_at(height: BlockHeight) -> Self {
        let (height_tx, _) = watch::channel(height);
        let (syncing_tx, _) = watch::channel(false);
        Self {
            inner: Mutex::new(Inner {
                pending: vec![],
                blocks: VecDeque::new(),
                start_height: height,
                max_kept_blocks: DEFAULT_MAX_KEPT_BLOCKS,
                fail_next_submissions: 0,
            }),
            height_tx,
            syncing_tx,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("Locking can't fail")
    }

    pub fn height(&self) -> BlockHeight {
        *self.height_tx.borrow()
    }

    pub fn set_syncing(&self, syncing: bool) {
        self.syncing_tx.send_replace(syncing);
    }

    /// Make the next `n` submissions time out, as an unreachable engine would
    pub fn fail_next_submissions(&self, n: usize) {
        self.lock().fail_next_submissions = n;
    }

    pub fn num_pending(&self) -> usize {
        self.lock().pending.len()
    }

    /// Commit everything submitted so far as the next block
    pub fn produce_block(&self) -> Block {
        let block = {
            let mut inner = self.lock();
            let payloads = std::mem::take(&mut inner.pending);

            let block = match inner.blocks.back() {
                Some(prev) => Block::new_next(Some(prev), payloads),
                None => Block {
                    height: inner.start_height.next_expect(),
                    prev_hash: BlockHash::ZERO,
                    payloads,
                },
            };

            inner.blocks.push_back(block.clone());
            while inner.max_kept_blocks < inner.blocks.len() {
                inner.blocks.pop_front();
            }
            block
        };

        trace!(
            target: LOG_TARGET,
            height = %block.height,
            num_payloads = block.payloads.len(),
            "Produced block"
        );
        self.height_tx.send_replace(block.height);
        block
    }

    /// Produce a block every `interval`, forever
    pub async fn run(&self, interval: Duration) {
        let mut interval = tokio::time::interval(interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // first tick is immediate
        interval.tick().await;

        loop {
            interval.tick().await;
            self.produce_block();
        }
    }

    fn get_block(&self, height: BlockHeight) -> GatewayResult<Option<Block>> {
        let inner = self.lock();
        let Some(first) = inner.blocks.front() else {
            return if height <= inner.start_height {
                Err(GatewayError::Pruned { height })
            } else {
                Ok(None)
            };
        };

        if height < first.height {
            return Err(GatewayError::Pruned { height });
        }

        let idx = usize::try_from(height.saturating_sub(first.height)).expect("Can't overflow");
        Ok(inner.blocks.get(idx).cloned())
    }
}

#[async_trait]
impl ConsensusGateway for LoopbackGateway {
    async fn submit(&self, payload: Signed<PayloadRaw>) -> GatewayResult<SubmitAck> {
        let mut inner = self.lock();
        if 0 < inner.fail_next_submissions {
            inner.fail_next_submissions -= 1;
            debug!(target: LOG_TARGET, "Dropping submission");
            return Err(GatewayError::Timeout);
        }
        inner.pending.push(payload);

        Ok(SubmitAck {
            height: self.height(),
        })
    }

    async fn get_status(&self) -> GatewayResult<GatewayStatus> {
        Ok(GatewayStatus {
            height: self.height(),
            syncing: *self.syncing_tx.borrow(),
        })
    }

    async fn wait_block(&self, height: BlockHeight) -> GatewayResult<Block> {
        let mut height_rx = self.height_tx.subscribe();
        loop {
            if let Some(block) = self.get_block(height)? {
                return Ok(block);
            }

            height_rx
                .wait_for(|current| height <= *current)
                .await
                .map_err(|_| GatewayError::Shutdown)?;
        }
    }
}
