use agora_core::payload::PayloadData;

use super::BehaviourResult;
use crate::ctx::BehaviourCtx;

pub(super) async fn run(ctx: BehaviourCtx) -> BehaviourResult<()> {
    ctx.submit_and_wait(PayloadData::Registration).await;
    Ok(())
}
