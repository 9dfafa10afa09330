use agora_core::block::BlockHeight;
use agora_core::payload::{Fingerprint, PayloadOpenError, RoundCount, TransactionType};
use agora_core::peer::PeerPubkey;
use snafu::Snafu;

use crate::event::Event;
use crate::kind::RoundId;
use crate::sync_data::SyncDataError;

/// A payload that can't be counted
///
/// Always recoverable: the payload is dropped and the round carries on.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum InvalidPayloadError {
    #[snafu(transparent)]
    Open { source: PayloadOpenError },
    #[snafu(display("Round {round} does not accept {received} payloads"))]
    WrongType {
        round: RoundId,
        received: TransactionType,
    },
    #[snafu(display("Stale payload - expected: {expected}, received: {received}"))]
    Stale {
        expected: RoundCount,
        received: RoundCount,
    },
    #[snafu(display("Round {round} already concluded"))]
    Concluded { round: RoundId },
    #[snafu(display("Only the keeper may submit in {round}"))]
    NotKeeper { round: RoundId, sender: PeerPubkey },
}

/// Rejection of a single submitted payload
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProtocolError {
    #[snafu(transparent)]
    InvalidPayload { source: InvalidPayloadError },
    #[snafu(display("Sender {sender} is not a participant"))]
    UnauthorizedSender { sender: PeerPubkey },
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Problems with how the application was put together
///
/// Detected at construction time, before any block is processed.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigurationError {
    #[snafu(display("Round {round} has no known participants"))]
    NoParticipants { round: RoundId },
    #[snafu(display("Round {round} has {len} participants, at most {max} are supported"))]
    TooManyParticipants {
        round: RoundId,
        len: usize,
        max: usize,
    },
    #[snafu(display("No transition from {round} on {event}"))]
    UnknownTransition { round: RoundId, event: Event },
    #[snafu(display("Round {round} is not a background round"))]
    NotBackground { round: RoundId },
    #[snafu(display("Terminal round {round} has outgoing transitions"))]
    TerminalWithEdges { round: RoundId },
    #[snafu(display("Duplicate transition from {round} on {event}"))]
    DuplicateTransition { round: RoundId, event: Event },
}

pub type ConfigurationResult<T> = Result<T, ConfigurationError>;

/// Errors after which a peer can't safely continue
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum FatalError {
    #[snafu(display(
        "Consensus invariant violated in {round}: both {first} and {second} reached threshold"
    ))]
    ConsensusInvariantViolation {
        round: RoundId,
        first: Fingerprint,
        second: Fingerprint,
    },
    #[snafu(display("Block out of order - expected: {expected}, received: {received}"))]
    BlockOutOfOrder {
        expected: BlockHeight,
        received: BlockHeight,
    },
    #[snafu(display("Round {round} could not read agreed state"))]
    SyncData {
        round: RoundId,
        source: SyncDataError,
    },
    #[snafu(display("Round {round} agreed on a {received} payload"))]
    UnexpectedPayload {
        round: RoundId,
        received: TransactionType,
    },
    #[snafu(display("Round {round} can't conclude with collected payloads"))]
    UnexpectedDecision { round: RoundId },
    #[snafu(transparent)]
    Configuration { source: ConfigurationError },
}

pub type FatalResult<T> = Result<T, FatalError>;
