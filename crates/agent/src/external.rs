//! Capabilities reaching outside of the agreement: chain and randomness
use std::sync::Arc;

use agora_core::payload::{Randomness, TxHash};
use agora_core::peer::PeerSeckey;
use async_trait::async_trait;
use snafu::Snafu;

/// Registry contract telling the service whether it should wind down
pub const SERVICE_REGISTRY: &str = "service_registry";
/// Returns an encoded `Option<TxHash>`
pub const TERMINATION_SIGNAL: &str = "termination_signal";

#[derive(Debug, Clone, Snafu, PartialEq, Eq)]
pub enum ExternalError {
    #[snafu(display("External call timed out"))]
    Timeout,
    #[snafu(display("External call failed: {message}"))]
    Failed { message: String },
    #[snafu(display("Unexpected response to {request}"))]
    UnexpectedResponse { request: &'static str },
}

pub type ExternalResult<T> = Result<T, ExternalError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub success: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandomnessObservation {
    pub round: u64,
    pub randomness: Randomness,
}

#[async_trait]
pub trait ChainApi: Send + Sync {
    async fn read(&self, contract: &str, method: &str, args: &[u8]) -> ExternalResult<Vec<u8>>;

    async fn build_and_send(
        &self,
        contract: &str,
        method: &str,
        args: &[u8],
        signer: PeerSeckey,
    ) -> ExternalResult<TxHash>;

    /// `None` if no receipt is available (yet)
    async fn wait_for_receipt(&self, tx_hash: TxHash) -> ExternalResult<Option<Receipt>>;
}

#[async_trait]
pub trait RandomnessSource: Send + Sync {
    async fn fetch(&self) -> ExternalResult<RandomnessObservation>;
}

pub type DynChainApi = Arc<dyn ChainApi>;
pub type DynRandomnessSource = Arc<dyn RandomnessSource>;

/// A call a behaviour wants performed on its behalf
#[derive(Debug, Clone)]
pub enum ExternalRequest {
    Read {
        contract: String,
        method: String,
        args: Vec<u8>,
    },
    BuildAndSend {
        contract: String,
        method: String,
        args: Vec<u8>,
        signer: PeerSeckey,
    },
    WaitForReceipt {
        tx_hash: TxHash,
    },
    FetchRandomness,
}

impl ExternalRequest {
    pub fn name(&self) -> &'static str {
        match self {
            ExternalRequest::Read { .. } => "read",
            ExternalRequest::BuildAndSend { .. } => "build_and_send",
            ExternalRequest::WaitForReceipt { .. } => "wait_for_receipt",
            ExternalRequest::FetchRandomness => "fetch_randomness",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalResponse {
    Read(Vec<u8>),
    Sent(TxHash),
    Receipt(Option<Receipt>),
    Randomness(RandomnessObservation),
}

/// All external capabilities of a peer
#[derive(Clone)]
pub struct Externals {
    pub chain: DynChainApi,
    pub randomness: DynRandomnessSource,
}

impl Externals {
    pub async fn execute(&self, request: ExternalRequest) -> ExternalResult<ExternalResponse> {
        Ok(match request {
            ExternalRequest::Read {
                contract,
                method,
                args,
            } => ExternalResponse::Read(self.chain.read(&contract, &method, &args).await?),
            ExternalRequest::BuildAndSend {
                contract,
                method,
                args,
                signer,
            } => ExternalResponse::Sent(
                self.chain
                    .build_and_send(&contract, &method, &args, signer)
                    .await?,
            ),
            ExternalRequest::WaitForReceipt { tx_hash } => {
                ExternalResponse::Receipt(self.chain.wait_for_receipt(tx_hash).await?)
            }
            ExternalRequest::FetchRandomness => {
                ExternalResponse::Randomness(self.randomness.fetch().await?)
            }
        })
    }
}
