//! The closed set of rounds making up the bundled application
use std::collections::BTreeMap;
use std::fmt;

use agora_core::Signature;
use agora_core::payload::{Payload, PayloadData, TransactionType};
use agora_core::peer::PeerPubkey;
use agora_core::peer_set::PeerSet;
use bincode::{Decode, Encode};
use serde::Serialize;
use snafu::ResultExt as _;

use crate::error::{FatalResult, SyncDataSnafu, UnexpectedDecisionSnafu, UnexpectedPayloadSnafu};
use crate::event::Event;
use crate::sync_data::{SyncDataUpdate, SynchronizedData, keys};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode, Serialize)]
pub enum RoundId {
    RegistrationStartup,
    Randomness,
    SelectKeeper,
    CollectSignature,
    Finalization,
    ValidateTransaction,
    /// Runs in the background of every other round
    Termination,
    Terminated,
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RoundId::RegistrationStartup => "registration_startup",
            RoundId::Randomness => "randomness",
            RoundId::SelectKeeper => "select_keeper",
            RoundId::CollectSignature => "collect_signature",
            RoundId::Finalization => "finalization",
            RoundId::ValidateTransaction => "validate_transaction",
            RoundId::Termination => "termination",
            RoundId::Terminated => "terminated",
        })
    }
}

/// How a round decides it has collected enough
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionStrategy {
    /// Threshold of participants submitted the same value
    SameUntilThreshold,
    /// Every participant submitted the same value
    SameUntilAll,
    /// Threshold of participants submitted anything
    DifferentUntilThreshold,
    /// The agreed keeper submitted
    OnlyKeeperSends,
    /// Accepts nothing, never concludes
    Terminal,
}

/// What [`crate::round::ThresholdRound::end_block`] decided on
#[derive(Debug, Clone, Copy)]
pub enum Decision<'a> {
    /// One value, the one agreed on
    Agreed(&'a Payload),
    /// All the payloads collected, by sender
    Collected(&'a BTreeMap<PeerPubkey, Payload>),
    /// Every participant voted, and no value has the threshold
    NoMajority,
    Timeout,
}

impl RoundId {
    pub const ALL: &[RoundId] = &[
        RoundId::RegistrationStartup,
        RoundId::Randomness,
        RoundId::SelectKeeper,
        RoundId::CollectSignature,
        RoundId::Finalization,
        RoundId::ValidateTransaction,
        RoundId::Termination,
        RoundId::Terminated,
    ];

    pub fn allowed_tx_type(self) -> Option<TransactionType> {
        Some(match self {
            RoundId::RegistrationStartup => TransactionType::Registration,
            RoundId::Randomness => TransactionType::Randomness,
            RoundId::SelectKeeper => TransactionType::SelectKeeper,
            RoundId::CollectSignature => TransactionType::Signature,
            RoundId::Finalization => TransactionType::Finalization,
            RoundId::ValidateTransaction => TransactionType::Validate,
            RoundId::Termination => TransactionType::Termination,
            RoundId::Terminated => return None,
        })
    }

    pub fn strategy(self) -> CollectionStrategy {
        match self {
            RoundId::RegistrationStartup => CollectionStrategy::SameUntilAll,
            RoundId::Randomness
            | RoundId::SelectKeeper
            | RoundId::ValidateTransaction
            | RoundId::Termination => CollectionStrategy::SameUntilThreshold,
            RoundId::CollectSignature => CollectionStrategy::DifferentUntilThreshold,
            RoundId::Finalization => CollectionStrategy::OnlyKeeperSends,
            RoundId::Terminated => CollectionStrategy::Terminal,
        }
    }

    /// Every event this round can conclude with
    pub fn events(self) -> &'static [Event] {
        match self {
            RoundId::RegistrationStartup => &[Event::Done],
            RoundId::Randomness => &[Event::Done, Event::NoMajority, Event::RoundTimeout],
            RoundId::SelectKeeper => &[Event::Done, Event::RoundTimeout],
            RoundId::CollectSignature => &[Event::Done, Event::RoundTimeout],
            RoundId::Finalization => &[
                Event::Done,
                Event::FinalizationFailed,
                Event::RoundTimeout,
            ],
            RoundId::ValidateTransaction => &[Event::Done, Event::Negative, Event::RoundTimeout],
            RoundId::Termination => &[Event::Terminate],
            RoundId::Terminated => &[],
        }
    }

    pub fn emits(self, event: Event) -> bool {
        self.events().contains(&event)
    }

    pub fn is_terminal(self) -> bool {
        self.strategy() == CollectionStrategy::Terminal
    }

    pub fn is_background(self) -> bool {
        self == RoundId::Termination
    }

    /// Participants a round of this kind is instantiated with
    ///
    /// Registration runs before the participant set is agreed on, so it takes
    /// the configured one.
    pub fn participants(
        self,
        data: &SynchronizedData,
        configured: &PeerSet,
    ) -> FatalResult<PeerSet> {
        match self {
            RoundId::RegistrationStartup => Ok(configured.clone()),
            _ => Ok(data
                .get_or(keys::PARTICIPANTS, configured.clone())
                .context(SyncDataSnafu { round: self })?),
        }
    }

    /// Keeper allowed to submit, for [`CollectionStrategy::OnlyKeeperSends`]
    pub fn keeper(self, data: &SynchronizedData) -> FatalResult<Option<PeerPubkey>> {
        if self.strategy() != CollectionStrategy::OnlyKeeperSends {
            return Ok(None);
        }
        Ok(Some(
            data.most_voted_keeper_address()
                .context(SyncDataSnafu { round: self })?,
        ))
    }

    /// Compute the next snapshot and the event for a decision
    pub fn conclude(
        self,
        decision: Decision<'_>,
        data: &SynchronizedData,
    ) -> FatalResult<(SynchronizedData, Event)> {
        let agreed = match decision {
            Decision::NoMajority => return Ok((data.carry_over(), Event::NoMajority)),
            Decision::Timeout => return Ok((data.carry_over(), Event::RoundTimeout)),
            Decision::Collected(collected) => return self.conclude_collected(collected, data),
            Decision::Agreed(payload) => payload,
        };

        let update = SyncDataUpdate::new();

        Ok(match (self, &agreed.data) {
            (RoundId::Randomness, PayloadData::Randomness { round, randomness }) => (
                data.update(
                    update
                        .set(keys::MOST_VOTED_RANDOMNESS, randomness)
                        .set(keys::MOST_VOTED_RANDOMNESS_ROUND, round),
                ),
                Event::Done,
            ),
            (RoundId::SelectKeeper, PayloadData::SelectKeeper { keeper }) => (
                data.update(update.set(keys::MOST_VOTED_KEEPER_ADDRESS, keeper)),
                Event::Done,
            ),
            (RoundId::Finalization, PayloadData::Finalization { tx_hash }) => match tx_hash {
                Some(tx_hash) => (
                    data.update(update.set(keys::FINAL_TX_HASH, tx_hash)),
                    Event::Done,
                ),
                None => (data.carry_over(), Event::FinalizationFailed),
            },
            (RoundId::ValidateTransaction, PayloadData::Validate { is_correct }) => {
                if *is_correct == Some(true) {
                    let period_count = data
                        .period_count()
                        .context(SyncDataSnafu { round: self })?;
                    (
                        data.update(update.set(keys::PERIOD_COUNT, &(period_count + 1))),
                        Event::Done,
                    )
                } else {
                    (data.carry_over(), Event::Negative)
                }
            }
            (RoundId::Termination, PayloadData::Termination { termination_tx }) => (
                data.update(
                    update
                        .set(keys::TERMINATION_MAJORITY_REACHED, &true)
                        .set(keys::MOST_VOTED_TX_HASH, termination_tx),
                ),
                Event::Terminate,
            ),
            (round, data) => {
                return UnexpectedPayloadSnafu {
                    round,
                    received: data.transaction_type(),
                }
                .fail();
            }
        })
    }

    fn conclude_collected(
        self,
        collected: &BTreeMap<PeerPubkey, Payload>,
        data: &SynchronizedData,
    ) -> FatalResult<(SynchronizedData, Event)> {
        match self {
            RoundId::RegistrationStartup => {
                let participants: PeerSet = collected.keys().copied().collect();
                Ok((
                    data.update(SyncDataUpdate::new().set(keys::PARTICIPANTS, &participants)),
                    Event::Done,
                ))
            }
            RoundId::CollectSignature => {
                let mut signatures: BTreeMap<PeerPubkey, Signature> = BTreeMap::new();
                for (sender, payload) in collected {
                    let PayloadData::Signature { signature } = payload.data else {
                        return UnexpectedPayloadSnafu {
                            round: self,
                            received: payload.transaction_type(),
                        }
                        .fail();
                    };
                    signatures.insert(*sender, signature);
                }
                Ok((
                    data.update(
                        SyncDataUpdate::new().set(keys::PARTICIPANT_TO_SIGNATURE, &signatures),
                    ),
                    Event::Done,
                ))
            }
            round => UnexpectedDecisionSnafu { round }.fail(),
        }
    }
}
