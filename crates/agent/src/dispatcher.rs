//! Routing of external-call responses back to the behaviour that asked
#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::LOG_TARGET;
use crate::external::{ExternalRequest, ExternalResponse, ExternalResult, Externals};
use crate::state::{InstanceId, RequestNonce};

pub type ResponseEnvelope = (RequestNonce, ExternalResult<ExternalResponse>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// Owner was torn down (or stopped waiting)
    Dropped,
}

struct Pending {
    instance: InstanceId,
    tx: oneshot::Sender<ExternalResult<ExternalResponse>>,
}

#[derive(Default)]
struct DispatcherInner {
    next_nonce: RequestNonce,
    pending: BTreeMap<RequestNonce, Pending>,
    num_dropped: u64,
}

/// Hands out request nonces and matches responses to their owners
///
/// Cheap to clone. Responses flow through the peer's scheduler task: a
/// request's future sends its result to the scheduler, which calls
/// [`Dispatcher::deliver`].
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Mutex<DispatcherInner>>,
    externals: Externals,
    responses_tx: mpsc::UnboundedSender<ResponseEnvelope>,
}

impl Dispatcher {
    pub fn new(externals: Externals) -> (Self, mpsc::UnboundedReceiver<ResponseEnvelope>) {
        let (responses_tx, responses_rx) = mpsc::unbounded_channel();
        (
            Self {
                inner: Arc::default(),
                externals,
                responses_tx,
            },
            responses_rx,
        )
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DispatcherInner> {
        self.inner.lock().expect("Locking failed")
    }

    pub fn register(
        &self,
        instance: InstanceId,
    ) -> (
        RequestNonce,
        oneshot::Receiver<ExternalResult<ExternalResponse>>,
    ) {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.lock();
        let nonce = inner.next_nonce;
        inner.next_nonce = nonce.next_expect();
        inner.pending.insert(nonce, Pending { instance, tx });
        (nonce, rx)
    }

    /// Register and start performing `request`
    ///
    /// The call itself runs detached, so it completes even if `instance`
    /// gets torn down in the meantime.
    pub fn request(
        &self,
        instance: InstanceId,
        request: ExternalRequest,
    ) -> (
        RequestNonce,
        oneshot::Receiver<ExternalResult<ExternalResponse>>,
    ) {
        let (nonce, rx) = self.register(instance);
        let externals = self.externals.clone();
        let responses_tx = self.responses_tx.clone();
        tokio::spawn(async move {
            let res = externals.execute(request).await;
            // Scheduler gone means the peer is shutting down
            let _ = responses_tx.send((nonce, res));
        });
        (nonce, rx)
    }

    pub fn deliver(
        &self,
        nonce: RequestNonce,
        response: ExternalResult<ExternalResponse>,
    ) -> Delivery {
        let mut inner = self.lock();
        let Some(pending) = inner.pending.remove(&nonce) else {
            inner.num_dropped += 1;
            debug!(target: LOG_TARGET, %nonce, "Dropping response for a torn-down behaviour");
            return Delivery::Dropped;
        };
        if pending.tx.send(response).is_err() {
            inner.num_dropped += 1;
            debug!(
                target: LOG_TARGET,
                %nonce,
                instance = %pending.instance,
                "Dropping response nobody waits for"
            );
            return Delivery::Dropped;
        }
        Delivery::Delivered
    }

    /// Forget all outstanding requests of `instance`
    pub fn release(&self, instance: InstanceId) -> usize {
        let mut inner = self.lock();
        let before = inner.pending.len();
        inner.pending.retain(|_, p| p.instance != instance);
        before - inner.pending.len()
    }

    pub fn num_pending(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn num_dropped(&self) -> u64 {
        self.lock().num_dropped
    }
}
