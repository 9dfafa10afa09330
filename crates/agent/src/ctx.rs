//! Everything a running behaviour can use, injected by the scheduler
#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use agora_core::block::BlockHeight;
use agora_core::payload::{Payload, PayloadData, RoundCount, TxHash};
use agora_core::peer::{PeerPubkey, PeerSeckey};
use agora_gateway::{ConsensusGateway, GatewayError, GatewayResult, SubmitAck};
use agora_rounds::kind::RoundId;
use agora_rounds::sync_data::{DataVersion, SynchronizedData};
use agora_util_error::fmt::FmtCompact as _;
use backon::{BackoffBuilder as _, FibonacciBuilder};
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::LOG_TARGET;
use crate::behaviour::BehaviourId;
use crate::dispatcher::Dispatcher;
use crate::external::{
    ExternalError, ExternalRequest, ExternalResponse, ExternalResult, RandomnessObservation,
    Receipt,
};
use crate::params::BehaviourParams;
use crate::state::{BehaviourState, InstanceId, Suspension};

/// Where the application is, as last published by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundInfo {
    pub round: RoundId,
    pub round_count: RoundCount,
    pub version: DataVersion,
    /// Last applied block
    pub height: BlockHeight,
    pub finished: bool,
}

#[derive(Clone)]
pub struct BehaviourCtx {
    behaviour: BehaviourId,
    instance: InstanceId,
    /// Round count the behaviour was started for
    round_count: RoundCount,
    seckey: PeerSeckey,
    params: Arc<BehaviourParams>,
    gateway: Arc<dyn ConsensusGateway>,
    dispatcher: Dispatcher,
    round_rx: watch::Receiver<RoundInfo>,
    sync_data_rx: watch::Receiver<SynchronizedData>,
    state_tx: Arc<watch::Sender<BehaviourState>>,
}

/// Marks the behaviour as suspended until dropped
struct SuspendGuard<'a>(&'a watch::Sender<BehaviourState>);

impl Drop for SuspendGuard<'_> {
    fn drop(&mut self) {
        self.0.send_if_modified(|state| {
            if matches!(state, BehaviourState::Suspended(_)) {
                *state = BehaviourState::Running;
                true
            } else {
                false
            }
        });
    }
}

#[bon::bon]
impl BehaviourCtx {
    #[builder]
    pub fn new(
        behaviour: BehaviourId,
        instance: InstanceId,
        seckey: PeerSeckey,
        params: Arc<BehaviourParams>,
        gateway: Arc<dyn ConsensusGateway>,
        dispatcher: Dispatcher,
        round_rx: watch::Receiver<RoundInfo>,
        sync_data_rx: watch::Receiver<SynchronizedData>,
    ) -> Self {
        let round_count = round_rx.borrow().round_count;
        Self {
            behaviour,
            instance,
            round_count,
            seckey,
            params,
            gateway,
            dispatcher,
            round_rx,
            sync_data_rx,
            state_tx: Arc::new(watch::channel(BehaviourState::Ready).0),
        }
    }
}

impl BehaviourCtx {
    pub fn behaviour(&self) -> BehaviourId {
        self.behaviour
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    pub fn round_count(&self) -> RoundCount {
        self.round_count
    }

    pub fn params(&self) -> &BehaviourParams {
        &self.params
    }

    pub fn gateway(&self) -> &dyn ConsensusGateway {
        self.gateway.as_ref()
    }

    pub fn seckey(&self) -> PeerSeckey {
        self.seckey
    }

    pub fn self_pubkey(&self) -> PeerPubkey {
        self.seckey.pubkey()
    }

    pub fn round_info(&self) -> RoundInfo {
        *self.round_rx.borrow()
    }

    pub fn sync_data(&self) -> SynchronizedData {
        self.sync_data_rx.borrow().clone()
    }

    pub fn state(&self) -> BehaviourState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<BehaviourState> {
        self.state_tx.subscribe()
    }

    pub(crate) fn set_state(&self, state: BehaviourState) {
        trace!(target: LOG_TARGET, behaviour = %self.behaviour, %state, "Behaviour state");
        self.state_tx.send_replace(state);
    }

    fn suspend(&self, suspension: Suspension) -> SuspendGuard<'_> {
        self.set_state(BehaviourState::Suspended(suspension));
        SuspendGuard(&self.state_tx)
    }

    pub async fn sleep(&self, duration: Duration) {
        let _guard = self.suspend(Suspension::Timer);
        tokio::time::sleep(duration).await;
    }

    /// Wait until the application moves past the round this behaviour
    /// was started for
    ///
    /// Returns `false` on timeout.
    pub async fn wait_until_round_end(&self, timeout: Option<Duration>) -> bool {
        let start = self.round_count;
        let mut round_rx = self.round_rx.clone();
        let _guard = self.suspend(Suspension::RoundEnd);
        let wait = async move {
            round_rx
                .wait_for(|info| info.round_count != start || info.finished)
                .await
                .is_ok()
        };
        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, wait).await.unwrap_or(false),
            None => wait.await,
        }
    }

    /// Wait until `cond` holds for the agreed state
    ///
    /// Returns `false` on timeout.
    pub async fn wait_for_condition(
        &self,
        cond: impl Fn(&SynchronizedData) -> bool,
        timeout: Option<Duration>,
    ) -> bool {
        let mut sync_data_rx = self.sync_data_rx.clone();
        let _guard = self.suspend(Suspension::Condition);
        let wait = async move { sync_data_rx.wait_for(|data| cond(data)).await.is_ok() };
        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, wait).await.unwrap_or(false),
            None => wait.await,
        }
    }

    /// Sign `data` for the current round and hand it to the gateway
    pub async fn send_a2a_transaction(&self, data: PayloadData) -> GatewayResult<SubmitAck> {
        let payload = Payload {
            sender: self.self_pubkey(),
            round_count: self.round_count,
            data,
        };
        let signed = payload.sign(self.seckey);
        tokio::time::timeout(self.params.submit_timeout(), self.gateway.submit(signed))
            .await
            .unwrap_or_else(|_| Err(GatewayError::Timeout))
    }

    /// Submit `data` until the round ends
    ///
    /// Every submission waits up to the inclusion timeout for the round to
    /// end. After the configured number of submissions the behaviour backs
    /// off before starting over.
    pub async fn submit_and_wait(&self, data: PayloadData) {
        let mut backoff = FibonacciBuilder::new()
            .with_jitter()
            .without_max_times()
            .with_min_delay(self.params.sleep_time())
            .with_max_delay(self.params.max_backoff())
            .build();
        loop {
            for attempt in 1..=self.params.submit_attempts() {
                match self.send_a2a_transaction(data.clone()).await {
                    Ok(ack) => {
                        debug!(
                            target: LOG_TARGET,
                            behaviour = %self.behaviour,
                            round_count = %self.round_count,
                            height = %ack.height,
                            attempt,
                            "Submitted payload"
                        );
                        if self
                            .wait_until_round_end(Some(self.params.inclusion_timeout()))
                            .await
                        {
                            return;
                        }
                    }
                    Err(err) => {
                        debug!(
                            target: LOG_TARGET,
                            behaviour = %self.behaviour,
                            attempt,
                            err = %err.fmt_compact(),
                            "Submission failed"
                        );
                    }
                }
            }
            let delay = backoff.next().unwrap_or(self.params.max_backoff());
            warn!(
                target: LOG_TARGET,
                behaviour = %self.behaviour,
                round_count = %self.round_count,
                delay_millis = %delay.as_millis(),
                "Payload not included, backing off"
            );
            self.sleep(delay).await;
        }
    }

    /// Perform an external call through the dispatcher
    pub async fn call(&self, request: ExternalRequest) -> ExternalResult<ExternalResponse> {
        let (nonce, rx) = self.dispatcher.request(self.instance, request);
        let _guard = self.suspend(Suspension::Message { nonce });
        match tokio::time::timeout(self.params.request_timeout(), rx).await {
            Ok(Ok(res)) => res,
            Ok(Err(_)) => Err(ExternalError::Failed {
                message: "Request released".into(),
            }),
            Err(_) => Err(ExternalError::Timeout),
        }
    }

    pub async fn read(
        &self,
        contract: &str,
        method: &str,
        args: Vec<u8>,
    ) -> ExternalResult<Vec<u8>> {
        match self
            .call(ExternalRequest::Read {
                contract: contract.to_owned(),
                method: method.to_owned(),
                args,
            })
            .await?
        {
            ExternalResponse::Read(bytes) => Ok(bytes),
            _ => Err(ExternalError::UnexpectedResponse { request: "read" }),
        }
    }

    pub async fn build_and_send(
        &self,
        contract: &str,
        method: &str,
        args: Vec<u8>,
    ) -> ExternalResult<TxHash> {
        match self
            .call(ExternalRequest::BuildAndSend {
                contract: contract.to_owned(),
                method: method.to_owned(),
                args,
                signer: self.seckey,
            })
            .await?
        {
            ExternalResponse::Sent(tx_hash) => Ok(tx_hash),
            _ => Err(ExternalError::UnexpectedResponse {
                request: "build_and_send",
            }),
        }
    }

    pub async fn wait_for_receipt(&self, tx_hash: TxHash) -> ExternalResult<Option<Receipt>> {
        match self
            .call(ExternalRequest::WaitForReceipt { tx_hash })
            .await?
        {
            ExternalResponse::Receipt(receipt) => Ok(receipt),
            _ => Err(ExternalError::UnexpectedResponse {
                request: "wait_for_receipt",
            }),
        }
    }

    pub async fn fetch_randomness(&self) -> ExternalResult<RandomnessObservation> {
        match self.call(ExternalRequest::FetchRandomness).await? {
            ExternalResponse::Randomness(observation) => Ok(observation),
            _ => Err(ExternalError::UnexpectedResponse {
                request: "fetch_randomness",
            }),
        }
    }
}
