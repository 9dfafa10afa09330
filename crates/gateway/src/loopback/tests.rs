use agora_core::payload::{Payload, PayloadData, RoundCount};
use agora_core::peer::PeerSeckey;
use assert_matches::assert_matches;

use super::*;

fn registration(seckey: PeerSeckey) -> Signed<PayloadRaw> {
    Payload {
        sender: seckey.pubkey(),
        round_count: RoundCount::ZERO,
        data: PayloadData::Registration,
    }
    .sign(seckey)
}

#[test_log::test(tokio::test)]
async fn blocks_contain_submissions_in_order() {
    let gateway = LoopbackGateway::new();
    let a = registration(PeerSeckey::generate());
    let b = registration(PeerSeckey::generate());

    gateway.submit(a.clone()).await.expect("accepted");
    gateway.submit(b.clone()).await.expect("accepted");
    assert_eq!(gateway.num_pending(), 2);

    let produced = gateway.produce_block();
    let empty = gateway.produce_block();

    let first = gateway.wait_block(BlockHeight::new(1)).await.expect("committed");
    assert_eq!(first, produced);
    assert_eq!(first.payloads, vec![a, b]);

    let second = gateway.wait_block(BlockHeight::new(2)).await.expect("committed");
    assert_eq!(second, empty);
    assert!(second.payloads.is_empty());
    assert_eq!(second.prev_hash, first.block_hash());
}

#[test_log::test(tokio::test)]
async fn wait_block_waits_for_commit() {
    let gateway = std::sync::Arc::new(LoopbackGateway::new());

    let waiter = tokio::spawn({
        let gateway = gateway.clone();
        async move { gateway.wait_block(BlockHeight::new(2)).await }
    });

    gateway.produce_block();
    tokio::task::yield_now().await;
    assert!(!waiter.is_finished());
    gateway.produce_block();

    let block = waiter.await.expect("no panic").expect("committed");
    assert_eq!(block.height, BlockHeight::new(2));
}

#[test_log::test(tokio::test)]
async fn failed_submissions_and_status() {
    let gateway = LoopbackGateway::new_at(BlockHeight::new(10));
    gateway.fail_next_submissions(1);

    let payload = registration(PeerSeckey::generate());
    assert_matches!(
        gateway.submit(payload.clone()).await,
        Err(GatewayError::Timeout)
    );
    assert_eq!(
        gateway.submit(payload).await.expect("accepted").height,
        BlockHeight::new(10)
    );

    gateway.set_syncing(true);
    assert_eq!(
        gateway.get_status().await.expect("status"),
        GatewayStatus {
            height: BlockHeight::new(10),
            syncing: true
        }
    );

    assert_eq!(gateway.produce_block().height, BlockHeight::new(11));
    assert_matches!(
        gateway.wait_block(BlockHeight::new(10)).await,
        Err(GatewayError::Pruned { .. })
    );
}

#[test_log::test(tokio::test(start_paused = true))]
async fn run_produces_blocks_on_interval() {
    let gateway = std::sync::Arc::new(LoopbackGateway::new());
    let _task = tokio::spawn({
        let gateway = gateway.clone();
        async move { gateway.run(Duration::from_millis(100)).await }
    });

    let block = gateway.wait_block(BlockHeight::new(3)).await.expect("committed");
    assert_eq!(block.height, BlockHeight::new(3));
}
