use agora_core::payload::PayloadData;
use agora_core::peer::PeerSeckey;
use assert_matches::assert_matches;

use super::*;
use crate::error::{ConfigurationError, FatalError, InvalidPayloadError, ProtocolError};
use crate::sync_data::keys;

struct Setup {
    seckeys: Vec<PeerSeckey>,
    participants: PeerSet,
}

impl Setup {
    fn new(n: usize) -> Self {
        let seckeys: Vec<_> = (0..n).map(|_| PeerSeckey::generate()).collect();
        let participants = seckeys.iter().map(|s| s.pubkey()).collect();
        Self {
            seckeys,
            participants,
        }
    }

    fn round(&self, id: RoundId) -> ThresholdRound {
        ThresholdRound::builder()
            .id(id)
            .round_count(RoundCount::new(1))
            .participants(self.participants.clone())
            .start_height(BlockHeight::new(10))
            .build()
            .expect("valid round")
    }

    fn keeper_vote(&self, peer: usize, value: u8) -> Signed<PayloadRaw> {
        vote(
            self.seckeys[peer],
            PayloadData::SelectKeeper {
                keeper: PeerPubkey::from_bytes([value; 32]),
            },
        )
    }
}

fn vote(seckey: PeerSeckey, data: PayloadData) -> Signed<PayloadRaw> {
    Payload {
        sender: seckey.pubkey(),
        round_count: RoundCount::new(1),
        data,
    }
    .sign(seckey)
}

fn agreed_keeper(res: Option<(SynchronizedData, Event)>) -> (PeerPubkey, Event) {
    let (data, event) = res.expect("concluded");
    (
        data.most_voted_keeper_address().expect("keeper set"),
        event,
    )
}

const X: u8 = 1;
const Y: u8 = 2;
const Z: u8 = 3;

#[test_log::test]
fn three_of_four_agree() {
    let setup = Setup::new(4);
    let mut round = setup.round(RoundId::SelectKeeper);
    assert_eq!(round.threshold(), 3);

    for (peer, value) in [(0, X), (1, X), (2, X), (3, Y)] {
        round
            .process_signed(&setup.keeper_vote(peer, value))
            .expect("valid payload");
    }

    assert!(round.threshold_reached().expect("no violation"));
    let res = round
        .end_block(&SynchronizedData::new(), BlockHeight::new(11), 100)
        .expect("no violation");
    assert_eq!(
        agreed_keeper(res),
        (PeerPubkey::from_bytes([X; 32]), Event::Done)
    );
    assert_eq!(round.state(), RoundState::Concluded);
}

#[test_log::test]
fn split_vote_keeps_collecting() {
    let setup = Setup::new(4);
    let mut round = setup.round(RoundId::SelectKeeper);

    for (peer, value) in [(0, X), (1, Y), (2, Z), (3, X)] {
        round
            .process_signed(&setup.keeper_vote(peer, value))
            .expect("valid payload");
    }

    assert!(!round.threshold_reached().expect("no violation"));
    assert!(
        round
            .end_block(&SynchronizedData::new(), BlockHeight::new(11), 100)
            .expect("no violation")
            .is_none()
    );
    assert_eq!(round.state(), RoundState::Collecting);
    assert_eq!(round.most_voted().map(|(_, count)| count), Some(2));
}

#[test_log::test]
fn non_participant_rejected() {
    let setup = Setup::new(4);
    let mut round = setup.round(RoundId::SelectKeeper);
    let outsider = PeerSeckey::generate();

    let res = round.process_signed(&vote(
        outsider,
        PayloadData::SelectKeeper {
            keeper: PeerPubkey::from_bytes([X; 32]),
        },
    ));

    assert_matches!(
        res,
        Err(ProtocolError::UnauthorizedSender { sender }) if sender == outsider.pubkey()
    );
    assert!(round.collection().is_empty());
    assert!(round.tally().is_empty());
}

#[test_log::test]
fn decision_does_not_depend_on_order() {
    let setup = Setup::new(4);
    let votes = [(0, X), (1, Y), (2, X), (3, X)];

    let mut results = vec![];
    // all rotations and the reversal
    for shift in 0..votes.len() {
        for reverse in [false, true] {
            let mut ordered = votes.to_vec();
            ordered.rotate_left(shift);
            if reverse {
                ordered.reverse();
            }

            let mut round = setup.round(RoundId::SelectKeeper);
            for (peer, value) in ordered {
                round
                    .process_signed(&setup.keeper_vote(peer, value))
                    .expect("valid payload");
            }
            let (data, event) = round
                .end_block(&SynchronizedData::new(), BlockHeight::new(11), 100)
                .expect("no violation")
                .expect("concluded");
            results.push((data, event));
        }
    }

    assert!(results.windows(2).all(|w| w[0] == w[1]));
}

#[test_log::test]
fn more_distinct_votes_keep_threshold() {
    let setup = Setup::new(7);
    let mut round = setup.round(RoundId::SelectKeeper);
    assert_eq!(round.threshold(), 5);

    for peer in 0..5 {
        round
            .process_signed(&setup.keeper_vote(peer, X))
            .expect("valid payload");
    }
    assert!(round.threshold_reached().expect("no violation"));

    round
        .process_signed(&setup.keeper_vote(5, Y))
        .expect("valid payload");
    assert!(round.threshold_reached().expect("no violation"));
    round
        .process_signed(&setup.keeper_vote(6, Z))
        .expect("valid payload");
    assert!(round.threshold_reached().expect("no violation"));

    let res = round
        .end_block(&SynchronizedData::new(), BlockHeight::new(11), 100)
        .expect("no violation");
    assert_eq!(agreed_keeper(res).0, PeerPubkey::from_bytes([X; 32]));
}

#[test_log::test]
fn resubmission_replaces_earlier_payload() {
    let setup = Setup::new(4);
    let mut round = setup.round(RoundId::SelectKeeper);

    for (peer, value) in [(0, X), (1, X), (2, Y), (2, X)] {
        round
            .process_signed(&setup.keeper_vote(peer, value))
            .expect("valid payload");
    }

    assert_eq!(round.collection().len(), 3);
    let res = round
        .end_block(&SynchronizedData::new(), BlockHeight::new(11), 100)
        .expect("no violation");
    assert_eq!(agreed_keeper(res).0, PeerPubkey::from_bytes([X; 32]));
}

#[test_log::test]
fn second_submission_is_the_one_counted() {
    let setup = Setup::new(4);
    let mut round = setup.round(RoundId::SelectKeeper);

    // peer 3 moves its vote away from X, leaving X one short
    for (peer, value) in [(0, X), (1, X), (3, X), (3, Y)] {
        round
            .process_signed(&setup.keeper_vote(peer, value))
            .expect("valid payload");
    }

    assert!(!round.threshold_reached().expect("no violation"));
    assert_eq!(round.tally().len(), 2);
}

#[test_log::test]
fn rejects_invalid_payloads() {
    let setup = Setup::new(4);
    let mut round = setup.round(RoundId::SelectKeeper);

    // wrong type
    assert_matches!(
        round.process_signed(&vote(setup.seckeys[0], PayloadData::Registration)),
        Err(ProtocolError::InvalidPayload {
            source: InvalidPayloadError::WrongType { .. }
        })
    );

    // stale round count
    let stale = Payload {
        sender: setup.seckeys[0].pubkey(),
        round_count: RoundCount::new(0),
        data: PayloadData::SelectKeeper {
            keeper: PeerPubkey::from_bytes([X; 32]),
        },
    };
    assert_matches!(
        round.process_signed(&stale.sign(setup.seckeys[0])),
        Err(ProtocolError::InvalidPayload {
            source: InvalidPayloadError::Stale { .. }
        })
    );

    // signed by another peer than the sender
    let forged = Payload {
        sender: setup.seckeys[0].pubkey(),
        round_count: RoundCount::new(1),
        data: PayloadData::SelectKeeper {
            keeper: PeerPubkey::from_bytes([X; 32]),
        },
    };
    assert_matches!(
        round.process_signed(&forged.sign(setup.seckeys[1])),
        Err(ProtocolError::InvalidPayload {
            source: InvalidPayloadError::Open { .. }
        })
    );

    assert!(round.collection().is_empty());
}

#[test_log::test]
fn concluded_round_rejects_late_payloads() {
    let setup = Setup::new(1);
    let mut round = setup.round(RoundId::SelectKeeper);
    round
        .process_signed(&setup.keeper_vote(0, X))
        .expect("valid payload");
    assert!(
        round
            .end_block(&SynchronizedData::new(), BlockHeight::new(11), 100)
            .expect("no violation")
            .is_some()
    );

    assert_matches!(
        round.process_signed(&setup.keeper_vote(0, Y)),
        Err(ProtocolError::InvalidPayload {
            source: InvalidPayloadError::Concluded { .. }
        })
    );
    assert!(
        round
            .end_block(&SynchronizedData::new(), BlockHeight::new(12), 100)
            .expect("no violation")
            .is_none()
    );
}

#[test]
fn zero_participants_is_a_configuration_error() {
    assert!(
        ThresholdRound::builder()
            .id(RoundId::Randomness)
            .round_count(RoundCount::new(1))
            .participants(PeerSet::new())
            .start_height(BlockHeight::new(1))
            .build()
            .is_err()
    );
}

#[test]
fn oversized_participant_set_is_a_configuration_error() {
    let participants: PeerSet = (0..=255u8)
        .map(|i| PeerPubkey::from_bytes([i; 32]))
        .collect();
    assert_eq!(participants.len(), 256);

    assert_matches!(
        ThresholdRound::builder()
            .id(RoundId::CollectSignature)
            .round_count(RoundCount::new(1))
            .participants(participants)
            .start_height(BlockHeight::new(1))
            .build(),
        Err(ConfigurationError::TooManyParticipants { len: 256, max: 255, .. })
    );
}

#[test]
fn two_winners_is_an_invariant_violation() {
    let a = Fingerprint::from_bytes([1; 32]);
    let b = Fingerprint::from_bytes([2; 32]);

    assert_matches!(
        unique_winner(RoundId::SelectKeeper, &[(a, 2), (b, 1)], 2),
        Ok(Some(fp)) if fp == a
    );
    assert_matches!(unique_winner(RoundId::SelectKeeper, &[(a, 1), (b, 1)], 2), Ok(None));
    assert_matches!(
        unique_winner(RoundId::SelectKeeper, &[(a, 2), (b, 2)], 2),
        Err(FatalError::ConsensusInvariantViolation { .. })
    );
}

#[test_log::test]
fn randomness_without_majority() {
    let setup = Setup::new(4);
    let mut round = setup.round(RoundId::Randomness);

    for peer in 0..4 {
        let value = if peer < 2 { 1 } else { 2 };
        round
            .process_signed(&vote(
                setup.seckeys[peer],
                PayloadData::Randomness {
                    round: 5,
                    randomness: agora_core::payload::Randomness::from_bytes([value; 32]),
                },
            ))
            .expect("valid payload");
    }

    let data = SynchronizedData::new();
    let (next, event) = round
        .end_block(&data, BlockHeight::new(11), 100)
        .expect("no violation")
        .expect("concluded");
    assert_eq!(event, Event::NoMajority);
    assert_eq!(next.version(), data.version().next_expect());
    assert!(next.is_empty());
}

#[test_log::test]
fn round_timeout_is_measured_in_blocks() {
    let setup = Setup::new(4);
    let mut round = setup.round(RoundId::SelectKeeper);
    let data = SynchronizedData::new();

    assert!(
        round
            .end_block(&data, BlockHeight::new(14), 5)
            .expect("no violation")
            .is_none()
    );
    let (_, event) = round
        .end_block(&data, BlockHeight::new(15), 5)
        .expect("no violation")
        .expect("timed out");
    assert_eq!(event, Event::RoundTimeout);
}

#[test_log::test]
fn signatures_collected_from_threshold_of_peers() {
    let setup = Setup::new(4);
    let mut round = setup.round(RoundId::CollectSignature);

    for peer in 0..3 {
        round
            .process_signed(&vote(
                setup.seckeys[peer],
                PayloadData::Signature {
                    signature: agora_core::Signature::from_bytes([peer as u8; 64]),
                },
            ))
            .expect("valid payload");
    }

    let (data, event) = round
        .end_block(&SynchronizedData::new(), BlockHeight::new(11), 100)
        .expect("no violation")
        .expect("concluded");
    assert_eq!(event, Event::Done);
    let signatures = data.participant_to_signature().expect("set");
    assert_eq!(signatures.len(), 3);
    assert_eq!(
        signatures[&setup.seckeys[2].pubkey()],
        agora_core::Signature::from_bytes([2; 64])
    );
}

#[test_log::test]
fn only_keeper_may_finalize() {
    let setup = Setup::new(4);
    let keeper = setup.seckeys[1];
    let data = SynchronizedData::new().update(
        crate::sync_data::SyncDataUpdate::new()
            .set(keys::MOST_VOTED_KEEPER_ADDRESS, &keeper.pubkey()),
    );

    let mut round = ThresholdRound::builder()
        .id(RoundId::Finalization)
        .round_count(RoundCount::new(1))
        .participants(setup.participants.clone())
        .maybe_keeper(RoundId::Finalization.keeper(&data).expect("keeper set"))
        .start_height(BlockHeight::new(10))
        .build()
        .expect("valid round");

    let tx_hash = agora_core::payload::TxHash::from_bytes([9; 32]);
    assert_matches!(
        round.process_signed(&vote(
            setup.seckeys[0],
            PayloadData::Finalization {
                tx_hash: Some(tx_hash)
            }
        )),
        Err(ProtocolError::InvalidPayload {
            source: InvalidPayloadError::NotKeeper { .. }
        })
    );
    round
        .process_signed(&vote(
            keeper,
            PayloadData::Finalization {
                tx_hash: Some(tx_hash),
            },
        ))
        .expect("keeper payload");

    let (next, event) = round
        .end_block(&data, BlockHeight::new(11), 100)
        .expect("no violation")
        .expect("concluded");
    assert_eq!(event, Event::Done);
    assert_eq!(next.final_tx_hash().expect("set"), tx_hash);
}
