use agora_core::payload::{Payload, PayloadData, Randomness, TxHash};
use agora_core::peer::{PeerPubkey, PeerSeckey};
use agora_core::peer_set::PeerSet;
use assert_matches::assert_matches;

use super::*;
use crate::error::{ConfigurationError, FatalError};

struct Setup {
    seckeys: Vec<PeerSeckey>,
    app: Application,
    last_block: Option<Block>,
}

impl Setup {
    fn new(n: usize) -> Self {
        let mut seckeys: Vec<_> = (0..n).map(|_| PeerSeckey::generate()).collect();
        seckeys.sort_unstable_by_key(|s| s.pubkey());
        let participants: PeerSet = seckeys.iter().map(|s| s.pubkey()).collect();

        let app = Application::new(
            AppParams::builder()
                .participants(participants)
                .round_timeout(10)
                .build(),
        )
        .expect("valid app");

        Self {
            seckeys,
            app,
            last_block: None,
        }
    }

    fn payload(&self, peer: usize, data: PayloadData) -> Signed<PayloadRaw> {
        Payload {
            sender: self.seckeys[peer].pubkey(),
            round_count: self.app.round_count(),
            data,
        }
        .sign(self.seckeys[peer])
    }

    fn all(&self, data: PayloadData) -> Vec<Signed<PayloadRaw>> {
        (0..self.seckeys.len())
            .map(|peer| self.payload(peer, data.clone()))
            .collect()
    }

    fn next_block(&mut self, payloads: Vec<Signed<PayloadRaw>>) -> FatalResult<BlockOutcome> {
        let block = Block::new_next(self.last_block.as_ref(), payloads);
        let res = self.app.process_block(&block);
        self.last_block = Some(block);
        res
    }

    fn keeper(&self) -> PeerPubkey {
        self.seckeys[1].pubkey()
    }

    fn register(&mut self) {
        let payloads = self.all(PayloadData::Registration);
        let outcome = self.next_block(payloads).expect("no fatal error");
        assert_eq!(
            outcome.transition.map(|t| t.to),
            Some(RoundId::Randomness)
        );
    }

    fn randomness(&self) -> PayloadData {
        PayloadData::Randomness {
            round: 1,
            randomness: Randomness::from_bytes([7; 32]),
        }
    }
}

fn termination() -> PayloadData {
    PayloadData::Termination {
        termination_tx: TxHash::from_bytes([5; 32]),
    }
}

#[test_log::test]
fn full_period() {
    let mut setup = Setup::new(4);
    assert_eq!(setup.app.current_round(), RoundId::RegistrationStartup);

    setup.register();
    assert_eq!(
        setup.app.sync_data().participants().expect("registered").len(),
        4
    );

    let payloads = setup.all(setup.randomness());
    let t = setup.next_block(payloads).expect("ok").transition;
    assert_eq!(t.map(|t| t.to), Some(RoundId::SelectKeeper));

    let payloads = setup.all(PayloadData::SelectKeeper {
        keeper: setup.keeper(),
    });
    let t = setup.next_block(payloads).expect("ok").transition;
    assert_eq!(t.map(|t| t.to), Some(RoundId::CollectSignature));

    let payloads = (0..3)
        .map(|peer| {
            setup.payload(
                peer,
                PayloadData::Signature {
                    signature: agora_core::Signature::from_bytes([peer as u8; 64]),
                },
            )
        })
        .collect();
    let t = setup.next_block(payloads).expect("ok").transition;
    assert_eq!(t.map(|t| t.to), Some(RoundId::Finalization));

    let tx_hash = TxHash::from_bytes([3; 32]);
    let outcome = setup
        .next_block(vec![
            // not the keeper
            setup.payload(
                0,
                PayloadData::Finalization {
                    tx_hash: Some(tx_hash),
                },
            ),
            setup.payload(
                1,
                PayloadData::Finalization {
                    tx_hash: Some(tx_hash),
                },
            ),
        ])
        .expect("ok");
    assert_eq!(outcome.accepted, 1);
    assert_eq!(outcome.rejected, 1);
    assert_eq!(
        outcome.transition.map(|t| t.to),
        Some(RoundId::ValidateTransaction)
    );

    let payloads = setup.all(PayloadData::Validate {
        is_correct: Some(true),
    });
    let t = setup.next_block(payloads).expect("ok").transition;
    assert_eq!(t.map(|t| t.to), Some(RoundId::Randomness));

    let data = setup.app.sync_data();
    assert_eq!(data.period_count().expect("set"), 1);
    assert_eq!(data.final_tx_hash().expect("set"), tx_hash);
    assert_eq!(data.version(), DataVersion::new(6));
    assert_eq!(setup.app.round_count(), RoundCount::new(6));
    assert_eq!(
        setup.app.previous_round(),
        Some(RoundId::ValidateTransaction)
    );
    assert!(setup.app.history().get(DataVersion::new(3)).is_some());
}

#[test_log::test]
fn background_preempts_foreground_on_shared_block() {
    let mut setup = Setup::new(4);
    setup.register();
    let payloads = setup.all(setup.randomness());
    setup.next_block(payloads).expect("ok");
    assert_eq!(setup.app.current_round(), RoundId::SelectKeeper);

    let mut payloads = setup.all(PayloadData::SelectKeeper {
        keeper: setup.keeper(),
    });
    payloads.extend((0..3).map(|peer| setup.payload(peer, termination())));

    let transition = setup
        .next_block(payloads)
        .expect("ok")
        .transition
        .expect("transitioned");

    assert_eq!(transition.from, RoundId::Termination);
    assert_eq!(transition.event, Event::Terminate);
    assert_eq!(transition.to, RoundId::Terminated);
    assert!(transition.preempted);

    let data = setup.app.sync_data();
    assert!(data.termination_majority_reached().expect("set"));
    assert_eq!(
        data.most_voted_tx_hash().expect("set"),
        TxHash::from_bytes([5; 32])
    );
    // the foreground decision was discarded
    assert_eq!(data.previous_keeper_address().expect("decodes"), None);
    assert_eq!(setup.app.previous_round(), Some(RoundId::SelectKeeper));
    assert!(setup.app.is_finished());
    assert!(setup.app.background_round().is_none());

    // terminated application ignores further blocks
    let payloads = setup.all(setup.randomness());
    let outcome = setup.next_block(payloads).expect("ok");
    assert_eq!(outcome.transition, None);
    assert_eq!(outcome.accepted, 0);
}

#[test_log::test]
fn termination_votes_survive_foreground_transitions() {
    let mut setup = Setup::new(4);
    setup.register();

    let mut payloads = setup.all(setup.randomness());
    payloads.extend((0..2).map(|peer| setup.payload(peer, termination())));
    let t = setup.next_block(payloads).expect("ok").transition;
    assert_eq!(t.map(|t| t.to), Some(RoundId::SelectKeeper));

    let payloads = vec![setup.payload(3, termination())];
    let t = setup
        .next_block(payloads)
        .expect("ok")
        .transition
        .expect("terminated");
    assert_eq!(t.to, RoundId::Terminated);
}

#[test_log::test]
fn round_timeout_follows_table() {
    let mut setup = Setup::new(4);
    setup.register();
    let payloads = setup.all(setup.randomness());
    setup.next_block(payloads).expect("ok");
    assert_eq!(setup.app.current_round(), RoundId::SelectKeeper);

    let mut last = None;
    for _ in 0..10 {
        last = setup.next_block(vec![]).expect("ok").transition;
    }
    let t = last.expect("timed out");
    assert_eq!(t.event, Event::RoundTimeout);
    assert_eq!(t.to, RoundId::Randomness);
}

#[test_log::test]
fn out_of_order_block_is_fatal() {
    let mut setup = Setup::new(4);
    let first = Block::new_next(None, vec![]);
    let second = Block::new_next(Some(&first), vec![]);

    assert_matches!(
        setup.app.process_block(&second),
        Err(FatalError::BlockOutOfOrder { .. })
    );
    setup.app.process_block(&first).expect("in order");
    assert_matches!(
        setup.app.process_block(&first),
        Err(FatalError::BlockOutOfOrder { .. })
    );
}

#[test_log::test]
fn oversized_configuration_is_rejected_at_startup() {
    let participants: PeerSet = (0..300u16)
        .map(|i| {
            let mut bytes = [0; 32];
            bytes[..2].copy_from_slice(&i.to_be_bytes());
            PeerPubkey::from_bytes(bytes)
        })
        .collect();

    assert_matches!(
        Application::new(AppParams::builder().participants(participants).build()).err(),
        Some(FatalError::Configuration {
            source: ConfigurationError::TooManyParticipants { len: 300, .. }
        })
    );
}

#[test_log::test]
fn restore_resumes_at_checkpointed_round() {
    let mut setup = Setup::new(4);
    setup.register();
    let payloads = setup.all(setup.randomness());
    setup.next_block(payloads).expect("ok");

    let checkpoint = setup.app.checkpoint();
    assert_eq!(checkpoint.round, RoundId::SelectKeeper);

    let mut restored =
        Application::restore(setup.app.params().clone(), checkpoint.clone()).expect("restores");
    assert_eq!(restored.current_round(), RoundId::SelectKeeper);
    assert_eq!(restored.sync_data(), setup.app.sync_data());
    assert_eq!(restored.round_count(), setup.app.round_count());

    // both continue identically
    let payloads = setup.all(PayloadData::SelectKeeper {
        keeper: setup.keeper(),
    });
    let block = Block::new_next(setup.last_block.as_ref(), payloads);
    let a = setup.app.process_block(&block).expect("ok");
    let b = restored.process_block(&block).expect("ok");
    assert_eq!(a, b);
    assert_eq!(restored.sync_data(), setup.app.sync_data());
}
