// SPDX-License-Identifier: MIT

//! Capability used by peers to get payloads totally ordered
//!
//! The consensus engine itself is external. Peers only submit signed payloads
//! and read back committed blocks, which are identical on every peer.

mod loopback;

use agora_core::block::{Block, BlockHeight};
use agora_core::payload::PayloadRaw;
use agora_core::signed::Signed;
use async_trait::async_trait;
pub use loopback::LoopbackGateway;
use snafu::Snafu;

const LOG_TARGET: &str = "agora::gateway";

#[derive(Debug, Snafu)]
pub enum GatewayError {
    #[snafu(display("Gateway did not respond in time"))]
    Timeout,
    #[snafu(display("Block {height} is no longer available"))]
    Pruned { height: BlockHeight },
    #[snafu(display("Gateway was shut down"))]
    Shutdown,
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Acknowledgement of a submission
///
/// Best effort: the payload may still never make it into a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitAck {
    /// Height committed at the time of submission
    pub height: BlockHeight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayStatus {
    /// Latest committed block height
    pub height: BlockHeight,
    /// Engine is still catching up with the rest of the network
    pub syncing: bool,
}

#[async_trait]
pub trait ConsensusGateway: Send + Sync {
    async fn submit(&self, payload: Signed<PayloadRaw>) -> GatewayResult<SubmitAck>;

    async fn get_status(&self) -> GatewayResult<GatewayStatus>;

    /// Wait for the block at `height` to be committed
    async fn wait_block(&self, height: BlockHeight) -> GatewayResult<Block>;
}
