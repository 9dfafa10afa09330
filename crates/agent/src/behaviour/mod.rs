//! Per-round peer logic
//!
//! Every non-terminal round has exactly one behaviour, which is started when
//! the round starts and torn down when it ends.
mod finalize;
mod healthcheck;
mod randomness;
mod registration;
mod select_keeper;
mod signature;
mod termination;
mod validate;


use std::fmt;
use std::time::Duration;

use agora_rounds::kind::RoundId;
use agora_rounds::sync_data::SyncDataError;
pub use finalize::{EXEC_TRANSACTION, SAFE_CONTRACT};
use futures::FutureExt as _;
use futures::future::BoxFuture;
pub use select_keeper::select_keeper;
pub use signature::{SafeTx, safe_tx};
use snafu::Snafu;

use crate::ctx::BehaviourCtx;

#[derive(Debug, Snafu)]
pub enum BehaviourError {
    #[snafu(display("Healthcheck did not pass within {timeout:?}"))]
    HealthcheckTimeout { timeout: Duration },
    #[snafu(transparent)]
    SyncData { source: SyncDataError },
}

impl BehaviourError {
    /// Errors the peer can't recover from by waiting for the next round
    pub fn is_fatal(&self) -> bool {
        matches!(self, BehaviourError::HealthcheckTimeout { .. })
    }
}

pub type BehaviourResult<T> = Result<T, BehaviourError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BehaviourId {
    /// Runs once at startup, before any round
    Healthcheck,
    Registration,
    Randomness,
    SelectKeeper,
    Signature,
    Finalize,
    ValidateTransaction,
    Termination,
}

impl fmt::Display for BehaviourId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BehaviourId::Healthcheck => "healthcheck",
            BehaviourId::Registration => "registration",
            BehaviourId::Randomness => "randomness",
            BehaviourId::SelectKeeper => "select_keeper",
            BehaviourId::Signature => "signature",
            BehaviourId::Finalize => "finalize",
            BehaviourId::ValidateTransaction => "validate_transaction",
            BehaviourId::Termination => "termination",
        })
    }
}

impl BehaviourId {
    pub const ALL: &[BehaviourId] = &[
        BehaviourId::Healthcheck,
        BehaviourId::Registration,
        BehaviourId::Randomness,
        BehaviourId::SelectKeeper,
        BehaviourId::Signature,
        BehaviourId::Finalize,
        BehaviourId::ValidateTransaction,
        BehaviourId::Termination,
    ];

    pub fn matching_round(self) -> Option<RoundId> {
        Some(match self {
            BehaviourId::Healthcheck => return None,
            BehaviourId::Registration => RoundId::RegistrationStartup,
            BehaviourId::Randomness => RoundId::Randomness,
            BehaviourId::SelectKeeper => RoundId::SelectKeeper,
            BehaviourId::Signature => RoundId::CollectSignature,
            BehaviourId::Finalize => RoundId::Finalization,
            BehaviourId::ValidateTransaction => RoundId::ValidateTransaction,
            BehaviourId::Termination => RoundId::Termination,
        })
    }

    pub fn for_round(round: RoundId) -> Option<BehaviourId> {
        Self::ALL
            .iter()
            .copied()
            .find(|b| b.matching_round() == Some(round))
    }

    pub fn run(self, ctx: BehaviourCtx) -> BoxFuture<'static, BehaviourResult<()>> {
        match self {
            BehaviourId::Healthcheck => healthcheck::run(ctx).boxed(),
            BehaviourId::Registration => registration::run(ctx).boxed(),
            BehaviourId::Randomness => randomness::run(ctx).boxed(),
            BehaviourId::SelectKeeper => select_keeper::run(ctx).boxed(),
            BehaviourId::Signature => signature::run(ctx).boxed(),
            BehaviourId::Finalize => finalize::run(ctx).boxed(),
            BehaviourId::ValidateTransaction => validate::run(ctx).boxed(),
            BehaviourId::Termination => termination::run(ctx).boxed(),
        }
    }
}
