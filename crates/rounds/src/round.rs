//! Threshold round: collects payloads until enough peers agree
#[cfg(test)]
mod tests;

use std::collections::BTreeMap;

use agora_core::block::BlockHeight;
use agora_core::num_peers::NumPeers;
use agora_core::payload::{Fingerprint, Payload, PayloadRaw, RoundCount};
use agora_core::peer::PeerPubkey;
use agora_core::peer_set::PeerSet;
use agora_core::signed::Signed;
use tracing::{debug, instrument};

use crate::LOG_TARGET;
use crate::error::{
    ConcludedSnafu, ConfigurationResult, ConsensusInvariantViolationSnafu, FatalResult,
    InvalidPayloadError, NoParticipantsSnafu, NotKeeperSnafu, ProtocolResult, StaleSnafu,
    TooManyParticipantsSnafu, UnauthorizedSenderSnafu, WrongTypeSnafu,
};
use crate::event::Event;
use crate::kind::{CollectionStrategy, Decision, RoundId};
use crate::sync_data::SynchronizedData;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    Collecting,
    Concluded,
}

#[derive(Debug, Clone)]
pub struct ThresholdRound {
    id: RoundId,
    round_count: RoundCount,
    /// Background rounds outlive the foreground round they were started in
    accept_any_round_count: bool,
    participants: PeerSet,
    threshold: usize,
    keeper: Option<PeerPubkey>,
    collection: BTreeMap<PeerPubkey, Payload>,
    /// Fingerprints in the order they were first seen, for tie breaking
    first_seen: Vec<Fingerprint>,
    start_height: BlockHeight,
    state: RoundState,
}

#[bon::bon]
impl ThresholdRound {
    #[builder]
    pub fn new(
        id: RoundId,
        round_count: RoundCount,
        participants: PeerSet,
        keeper: Option<PeerPubkey>,
        start_height: BlockHeight,
        #[builder(default)] accept_any_round_count: bool,
    ) -> ConfigurationResult<Self> {
        if participants.is_empty() && !id.is_terminal() {
            return NoParticipantsSnafu { round: id }.fail();
        }
        let Some(supermajority) = participants.threshold() else {
            return TooManyParticipantsSnafu {
                round: id,
                len: participants.len(),
                max: NumPeers::MAX,
            }
            .fail();
        };

        let threshold = match id.strategy() {
            CollectionStrategy::SameUntilAll => participants.len(),
            CollectionStrategy::OnlyKeeperSends => 1,
            CollectionStrategy::SameUntilThreshold
            | CollectionStrategy::DifferentUntilThreshold
            | CollectionStrategy::Terminal => supermajority,
        };

        Ok(Self {
            id,
            round_count,
            accept_any_round_count,
            participants,
            threshold,
            keeper,
            collection: BTreeMap::new(),
            first_seen: vec![],
            start_height,
            state: RoundState::Collecting,
        })
    }
}

impl ThresholdRound {
    pub fn id(&self) -> RoundId {
        self.id
    }

    pub fn round_count(&self) -> RoundCount {
        self.round_count
    }

    pub fn state(&self) -> RoundState {
        self.state
    }

    pub fn participants(&self) -> &PeerSet {
        &self.participants
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn start_height(&self) -> BlockHeight {
        self.start_height
    }

    pub fn collection(&self) -> &BTreeMap<PeerPubkey, Payload> {
        &self.collection
    }

    /// Number of senders per fingerprint, in first-seen order
    pub fn tally(&self) -> Vec<(Fingerprint, usize)> {
        let mut counts: BTreeMap<Fingerprint, usize> = BTreeMap::new();
        for payload in self.collection.values() {
            *counts.entry(payload.fingerprint()).or_default() += 1;
        }

        self.first_seen
            .iter()
            .filter_map(|fp| counts.get(fp).map(|count| (*fp, *count)))
            .collect()
    }

    /// Fingerprint with the most senders, earliest seen on a tie
    pub fn most_voted(&self) -> Option<(Fingerprint, usize)> {
        // `max_by_key` returns the last maximum, so iterate in reverse
        self.tally()
            .into_iter()
            .rev()
            .max_by_key(|(_, count)| *count)
    }

    pub fn threshold_reached(&self) -> FatalResult<bool> {
        Ok(match self.id.strategy() {
            CollectionStrategy::DifferentUntilThreshold => self.threshold <= self.collection.len(),
            CollectionStrategy::SameUntilAll
            | CollectionStrategy::SameUntilThreshold
            | CollectionStrategy::OnlyKeeperSends => {
                unique_winner(self.id, &self.tally(), self.threshold)?.is_some()
            }
            CollectionStrategy::Terminal => false,
        })
    }

    pub fn process_signed(&mut self, signed: &Signed<PayloadRaw>) -> ProtocolResult<()> {
        let payload = signed.open().map_err(InvalidPayloadError::from)?;
        self.process_payload(payload)
    }

    /// Add a payload to the round
    ///
    /// A sender that already submitted has its earlier payload replaced.
    pub fn process_payload(&mut self, payload: Payload) -> ProtocolResult<()> {
        if self.state == RoundState::Concluded {
            return Err(ConcludedSnafu { round: self.id }.build().into());
        }

        if !self.participants.contains(&payload.sender) {
            return UnauthorizedSenderSnafu {
                sender: payload.sender,
            }
            .fail();
        }

        if self.id.allowed_tx_type() != Some(payload.transaction_type()) {
            return Err(WrongTypeSnafu {
                round: self.id,
                received: payload.transaction_type(),
            }
            .build()
            .into());
        }

        if !self.accept_any_round_count && payload.round_count != self.round_count {
            return Err(StaleSnafu {
                expected: self.round_count,
                received: payload.round_count,
            }
            .build()
            .into());
        }

        if self.keeper.is_some_and(|keeper| keeper != payload.sender) {
            return Err(NotKeeperSnafu {
                round: self.id,
                sender: payload.sender,
            }
            .build()
            .into());
        }

        let fingerprint = payload.fingerprint();
        if !self.first_seen.contains(&fingerprint) {
            self.first_seen.push(fingerprint);
        }

        if let Some(prev) = self.collection.insert(payload.sender, payload) {
            debug!(
                target: LOG_TARGET,
                round = %self.id,
                sender = %prev.sender.to_short(),
                "Replaced earlier payload"
            );
        }

        Ok(())
    }

    /// Decide the round after all payloads of a block were processed
    ///
    /// Returns `None` while still collecting.
    #[instrument(skip_all, fields(round = %self.id, height = %height))]
    pub fn end_block(
        &mut self,
        data: &SynchronizedData,
        height: BlockHeight,
        round_timeout: u64,
    ) -> FatalResult<Option<(SynchronizedData, Event)>> {
        if self.state == RoundState::Concluded {
            return Ok(None);
        }

        let Some(decision) = self.decide(height, round_timeout)? else {
            return Ok(None);
        };

        let res = self.id.conclude(decision, data)?;
        self.state = RoundState::Concluded;

        debug!(
            target: LOG_TARGET,
            event = %res.1,
            version = %res.0.version(),
            num_payloads = self.collection.len(),
            "Round concluded"
        );
        Ok(Some(res))
    }

    fn decide(&self, height: BlockHeight, round_timeout: u64) -> FatalResult<Option<Decision<'_>>> {
        match self.id.strategy() {
            CollectionStrategy::Terminal => return Ok(None),
            CollectionStrategy::DifferentUntilThreshold => {
                if self.threshold <= self.collection.len() {
                    return Ok(Some(Decision::Collected(&self.collection)));
                }
            }
            CollectionStrategy::SameUntilAll => {
                if unique_winner(self.id, &self.tally(), self.threshold)?.is_some() {
                    return Ok(Some(Decision::Collected(&self.collection)));
                }
            }
            CollectionStrategy::SameUntilThreshold | CollectionStrategy::OnlyKeeperSends => {
                if let Some(fingerprint) = unique_winner(self.id, &self.tally(), self.threshold)? {
                    let payload = self
                        .collection
                        .values()
                        .find(|p| p.fingerprint() == fingerprint)
                        .expect("Winner must have a payload");
                    return Ok(Some(Decision::Agreed(payload)));
                }

                if self.id.emits(Event::NoMajority)
                    && self.collection.len() == self.participants.len()
                {
                    return Ok(Some(Decision::NoMajority));
                }
            }
        }

        if self.id.emits(Event::RoundTimeout)
            && round_timeout <= height.saturating_sub(self.start_height)
        {
            return Ok(Some(Decision::Timeout));
        }

        Ok(None)
    }
}

/// The single fingerprint at or above `threshold`, if any
///
/// Two of them would mean two conflicting decisions, which no honest
/// threshold allows.
fn unique_winner(
    round: RoundId,
    tally: &[(Fingerprint, usize)],
    threshold: usize,
) -> FatalResult<Option<Fingerprint>> {
    let mut reached = tally
        .iter()
        .filter(|(_, count)| threshold <= *count)
        .map(|(fp, _)| *fp);

    let Some(first) = reached.next() else {
        return Ok(None);
    };

    if let Some(second) = reached.next() {
        return ConsensusInvariantViolationSnafu {
            round,
            first,
            second,
        }
        .fail();
    }

    Ok(Some(first))
}
