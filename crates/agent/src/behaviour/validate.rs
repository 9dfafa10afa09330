use agora_core::payload::PayloadData;
use agora_util_error::fmt::FmtCompact as _;
use tracing::debug;

use super::BehaviourResult;
use crate::LOG_TARGET;
use crate::ctx::BehaviourCtx;

pub(super) async fn run(ctx: BehaviourCtx) -> BehaviourResult<()> {
    let tx_hash = ctx.sync_data().final_tx_hash()?;

    let mut is_correct = None;
    for attempt in 1..=ctx.params().retry_attempts() {
        match ctx.wait_for_receipt(tx_hash).await {
            Ok(Some(receipt)) => {
                is_correct = Some(receipt.success && receipt.tx_hash == tx_hash);
                break;
            }
            Ok(None) => {
                debug!(target: LOG_TARGET, %tx_hash, attempt, "No receipt yet");
            }
            Err(err) => {
                debug!(
                    target: LOG_TARGET,
                    %tx_hash,
                    attempt,
                    err = %err.fmt_compact(),
                    "Receipt query failed"
                );
            }
        }
        ctx.sleep(ctx.params().sleep_time()).await;
    }

    ctx.submit_and_wait(PayloadData::Validate { is_correct })
        .await;
    Ok(())
}
