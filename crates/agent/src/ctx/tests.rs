use std::sync::Arc;
use std::time::Duration;

use agora_core::peer::PeerSeckey;
use agora_gateway::LoopbackGateway;
use agora_rounds::sync_data::{SyncDataUpdate, keys};

use super::*;
use crate::external::Externals;
use crate::mock::{MockChain, MockRandomness};

struct Setup {
    ctx: BehaviourCtx,
    gateway: Arc<LoopbackGateway>,
    round_tx: watch::Sender<RoundInfo>,
    sync_data_tx: watch::Sender<SynchronizedData>,
    responses_rx: tokio::sync::mpsc::UnboundedReceiver<crate::dispatcher::ResponseEnvelope>,
}

fn setup(params: BehaviourParams) -> Setup {
    let gateway = Arc::new(LoopbackGateway::new());
    let (dispatcher, responses_rx) = Dispatcher::new(Externals {
        chain: Arc::new(MockChain::new()),
        randomness: Arc::new(MockRandomness::new([1; 32])),
    });
    let (round_tx, round_rx) = watch::channel(RoundInfo {
        round: RoundId::RegistrationStartup,
        round_count: RoundCount::ZERO,
        version: DataVersion::ZERO,
        height: BlockHeight::ZERO,
        finished: false,
    });
    let (sync_data_tx, sync_data_rx) = watch::channel(SynchronizedData::new());
    let ctx = BehaviourCtx::builder()
        .behaviour(BehaviourId::Registration)
        .instance(InstanceId::ZERO)
        .seckey(PeerSeckey::generate())
        .params(Arc::new(params))
        .gateway(gateway.clone())
        .dispatcher(dispatcher)
        .round_rx(round_rx)
        .sync_data_rx(sync_data_rx)
        .build();
    Setup {
        ctx,
        gateway,
        round_tx,
        sync_data_tx,
        responses_rx,
    }
}

fn next_round(round_tx: &watch::Sender<RoundInfo>) {
    round_tx.send_modify(|info| {
        info.round = RoundId::Randomness;
        info.round_count = info.round_count.next_expect();
    });
}

#[test_log::test(tokio::test(start_paused = true))]
async fn sleep_is_a_timer_suspension() {
    let s = setup(BehaviourParams::default());
    s.ctx.set_state(BehaviourState::Running);
    let mut state_rx = s.ctx.subscribe_state();

    let task = tokio::spawn({
        let ctx = s.ctx.clone();
        async move { ctx.sleep(Duration::from_secs(3)).await }
    });
    state_rx
        .wait_for(|state| *state == BehaviourState::Suspended(Suspension::Timer))
        .await
        .expect("ctx alive");
    assert!(!task.is_finished());

    task.await.expect("no panic");
    assert_eq!(*state_rx.borrow_and_update(), BehaviourState::Running);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn round_end_wait_resolves_on_next_round() {
    let s = setup(BehaviourParams::default());

    let task = tokio::spawn({
        let ctx = s.ctx.clone();
        async move { ctx.wait_until_round_end(None).await }
    });
    tokio::task::yield_now().await;
    assert_eq!(s.ctx.state(), BehaviourState::Suspended(Suspension::RoundEnd));

    // Same round, just a new block
    s.round_tx.send_modify(|info| info.height = info.height.next_expect());
    tokio::task::yield_now().await;
    assert!(!task.is_finished());

    next_round(&s.round_tx);
    assert!(task.await.expect("no panic"));
}

#[test_log::test(tokio::test(start_paused = true))]
async fn round_end_wait_times_out() {
    let s = setup(BehaviourParams::default());
    assert!(
        !s.ctx
            .wait_until_round_end(Some(Duration::from_secs(1)))
            .await
    );
}

#[test_log::test(tokio::test(start_paused = true))]
async fn condition_wait_sees_sync_data_updates() {
    let s = setup(BehaviourParams::default());

    let task = tokio::spawn({
        let ctx = s.ctx.clone();
        async move {
            ctx.wait_for_condition(
                |data| data.termination_majority_reached().unwrap_or(false),
                Some(Duration::from_secs(10)),
            )
            .await
        }
    });
    tokio::task::yield_now().await;
    assert_eq!(
        s.ctx.state(),
        BehaviourState::Suspended(Suspension::Condition)
    );

    let data = s.sync_data_tx.borrow().clone();
    s.sync_data_tx.send_replace(
        data.update(SyncDataUpdate::new().set(keys::TERMINATION_MAJORITY_REACHED, &true)),
    );
    assert!(task.await.expect("no panic"));
}

#[test_log::test(tokio::test(start_paused = true))]
async fn submission_carries_the_starting_round_count() {
    let s = setup(BehaviourParams::default());
    next_round(&s.round_tx);

    s.ctx
        .send_a2a_transaction(PayloadData::Registration)
        .await
        .expect("accepted");
    let block = s.gateway.produce_block();
    let payload = block.payloads[0].open().expect("valid");

    assert_eq!(payload.sender, s.ctx.self_pubkey());
    assert_eq!(payload.round_count, RoundCount::ZERO);
    assert_eq!(payload.data, PayloadData::Registration);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn submit_and_wait_resubmits_until_round_ends() {
    let s = setup(
        BehaviourParams::builder()
            .inclusion_timeout(Duration::from_secs(1))
            .build(),
    );
    s.gateway.fail_next_submissions(1);

    let task = tokio::spawn({
        let ctx = s.ctx.clone();
        async move { ctx.submit_and_wait(PayloadData::Registration).await }
    });

    tokio::time::sleep(Duration::from_millis(1500)).await;
    // First attempt was dropped, two more made it through
    assert_eq!(s.gateway.num_pending(), 2);
    assert!(!task.is_finished());

    next_round(&s.round_tx);
    task.await.expect("no panic");
}

#[test_log::test(tokio::test(start_paused = true))]
async fn external_call_suspends_on_its_nonce() {
    let Setup {
        ctx,
        mut responses_rx,
        ..
    } = setup(BehaviourParams::default());

    let task = tokio::spawn({
        let ctx = ctx.clone();
        async move { ctx.fetch_randomness().await }
    });
    let (nonce, response) = responses_rx.recv().await.expect("sent");
    assert_eq!(
        ctx.state(),
        BehaviourState::Suspended(Suspension::Message { nonce })
    );

    ctx.dispatcher.deliver(nonce, response);
    let observation = task.await.expect("no panic").expect("available");
    assert_eq!(observation.round, 1);
}
