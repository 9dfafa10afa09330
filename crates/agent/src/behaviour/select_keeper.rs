use agora_core::payload::{PayloadData, Randomness};
use agora_core::peer::PeerPubkey;
use agora_core::peer_set::PeerSet;
use num_bigint::BigUint;
use tracing::debug;

use super::BehaviourResult;
use crate::LOG_TARGET;
use crate::ctx::BehaviourCtx;

/// Deterministically pick the keeper for `randomness`
///
/// The previous keeper is skipped, unless it's the only participant left.
pub fn select_keeper(
    participants: &PeerSet,
    randomness: Randomness,
    previous: Option<PeerPubkey>,
) -> Option<PeerPubkey> {
    let mut candidates: Vec<PeerPubkey> = participants
        .as_slice()
        .iter()
        .copied()
        .filter(|p| Some(*p) != previous)
        .collect();
    if candidates.is_empty() {
        candidates = participants.as_slice().to_vec();
    }
    if candidates.is_empty() {
        return None;
    }

    let hash = blake3::hash(randomness.as_slice());
    let idx = BigUint::from_bytes_be(hash.as_bytes()) % BigUint::from(candidates.len());
    candidates.get(usize::try_from(&idx).ok()?).copied()
}

pub(super) async fn run(ctx: BehaviourCtx) -> BehaviourResult<()> {
    let data = ctx.sync_data();
    let participants = data.participants()?;
    let randomness = data.most_voted_randomness()?;
    let previous = data.previous_keeper_address()?;

    let Some(keeper) = select_keeper(&participants, randomness, previous) else {
        ctx.wait_until_round_end(None).await;
        return Ok(());
    };
    debug!(target: LOG_TARGET, keeper = %keeper.to_short(), "Selected keeper");

    ctx.submit_and_wait(PayloadData::SelectKeeper { keeper }).await;
    Ok(())
}
