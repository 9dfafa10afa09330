use agora_core::payload::{PayloadData, Randomness};
use agora_core::peer::PeerPubkey;
use agora_core::signed::{Hashable, Signable};
use agora_rounds::sync_data::{SyncDataResult, SynchronizedData};
use bincode::Encode;

use super::BehaviourResult;
use crate::ctx::BehaviourCtx;

/// The transaction the peers jointly authorize in every period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode)]
pub struct SafeTx {
    pub period_count: u64,
    pub keeper: PeerPubkey,
    pub randomness: Randomness,
}

impl Hashable for SafeTx {}

impl Signable for SafeTx {
    const TAG: [u8; 4] = *b"stx_";
}

pub fn safe_tx(data: &SynchronizedData) -> SyncDataResult<SafeTx> {
    Ok(SafeTx {
        period_count: data.period_count()?,
        keeper: data.most_voted_keeper_address()?,
        randomness: data.most_voted_randomness()?,
    })
}

pub(super) async fn run(ctx: BehaviourCtx) -> BehaviourResult<()> {
    let tx = safe_tx(&ctx.sync_data())?;
    let signature = tx.sign_with(ctx.seckey());

    ctx.submit_and_wait(PayloadData::Signature { signature })
        .await;
    Ok(())
}
