use agora_core::bincode::STD_BINCODE_CONFIG;
use agora_core::payload::PayloadData;
use agora_util_bincode::encode_infallible;
use agora_util_error::fmt::FmtCompact as _;
use tracing::{info, warn};

use super::{BehaviourResult, safe_tx};
use crate::LOG_TARGET;
use crate::ctx::BehaviourCtx;

pub const SAFE_CONTRACT: &str = "safe";
pub const EXEC_TRANSACTION: &str = "exec_transaction";

/// Keeper sends the jointly signed transaction, everyone else just waits
pub(super) async fn run(ctx: BehaviourCtx) -> BehaviourResult<()> {
    let data = ctx.sync_data();
    let keeper = data.most_voted_keeper_address()?;
    if keeper != ctx.self_pubkey() {
        ctx.wait_until_round_end(None).await;
        return Ok(());
    }

    let tx = safe_tx(&data)?;
    let signatures = data.participant_to_signature()?;
    let args = encode_infallible(&(tx, signatures), STD_BINCODE_CONFIG);

    let tx_hash = match ctx
        .build_and_send(SAFE_CONTRACT, EXEC_TRANSACTION, args)
        .await
    {
        Ok(tx_hash) => {
            info!(target: LOG_TARGET, %tx_hash, period = tx.period_count, "Sent transaction");
            Some(tx_hash)
        }
        Err(err) => {
            warn!(
                target: LOG_TARGET,
                err = %err.fmt_compact(),
                "Failed to send transaction"
            );
            None
        }
    };

    ctx.submit_and_wait(PayloadData::Finalization { tx_hash })
        .await;
    Ok(())
}
