use std::sync::Arc;

use assert_matches::assert_matches;

use super::*;
use crate::external::{ExternalError, RandomnessSource as _};
use crate::mock::{MockChain, MockRandomness};

fn externals() -> (Externals, Arc<MockRandomness>) {
    let randomness = Arc::new(MockRandomness::new([7; 32]));
    (
        Externals {
            chain: Arc::new(MockChain::new()),
            randomness: randomness.clone(),
        },
        randomness,
    )
}

#[test_log::test(tokio::test)]
async fn response_for_torn_down_instance_is_dropped() {
    let (externals, _) = externals();
    let (dispatcher, _responses_rx) = Dispatcher::new(externals);
    let instance = InstanceId::new(3);

    let (nonce, rx) = dispatcher.register(instance);
    assert_eq!(dispatcher.num_pending(), 1);

    assert_eq!(dispatcher.release(instance), 1);
    assert_eq!(dispatcher.num_pending(), 0);

    assert_eq!(
        dispatcher.deliver(nonce, Ok(ExternalResponse::Read(vec![1, 2, 3]))),
        Delivery::Dropped
    );
    assert_eq!(dispatcher.num_dropped(), 1);
    assert!(rx.await.is_err());
}

#[test_log::test(tokio::test)]
async fn response_reaches_its_requester() {
    let (externals, randomness) = externals();
    let (dispatcher, mut responses_rx) = Dispatcher::new(externals);

    let (nonce, rx) = dispatcher.request(InstanceId::ZERO, ExternalRequest::FetchRandomness);
    let (received_nonce, response) = responses_rx.recv().await.expect("sent");
    assert_eq!(received_nonce, nonce);
    assert_eq!(dispatcher.deliver(received_nonce, response), Delivery::Delivered);

    let expected = randomness.fetch().await.expect("available");
    assert_eq!(
        rx.await.expect("delivered"),
        Ok(ExternalResponse::Randomness(expected))
    );
    assert_eq!(dispatcher.num_dropped(), 0);
}

#[test_log::test(tokio::test)]
async fn release_leaves_other_instances_alone() {
    let (externals, _) = externals();
    let (dispatcher, _responses_rx) = Dispatcher::new(externals);
    let old = InstanceId::new(1);
    let new = InstanceId::new(2);

    let (old_nonce, _old_rx) = dispatcher.register(old);
    let (new_nonce, new_rx) = dispatcher.register(new);
    assert_ne!(old_nonce, new_nonce);

    assert_eq!(dispatcher.release(old), 1);
    assert_eq!(
        dispatcher.deliver(old_nonce, Err(ExternalError::Timeout)),
        Delivery::Dropped
    );
    assert_eq!(
        dispatcher.deliver(new_nonce, Err(ExternalError::Timeout)),
        Delivery::Delivered
    );
    assert_matches!(new_rx.await, Ok(Err(ExternalError::Timeout)));
}

#[test_log::test(tokio::test)]
async fn unknown_nonce_is_dropped() {
    let (externals, _) = externals();
    let (dispatcher, _responses_rx) = Dispatcher::new(externals);

    assert_eq!(
        dispatcher.deliver(RequestNonce::new(42), Err(ExternalError::Timeout)),
        Delivery::Dropped
    );
}
