use agora_core::bincode::STD_BINCODE_CONFIG;
use agora_core::payload::{PayloadData, TxHash};
use agora_rounds::sync_data::SynchronizedData;
use agora_util_bincode::decode_whole;
use agora_util_error::fmt::FmtCompact as _;
use tracing::{debug, info};

use super::BehaviourResult;
use crate::LOG_TARGET;
use crate::ctx::BehaviourCtx;
use crate::external::{SERVICE_REGISTRY, TERMINATION_SIGNAL};

fn majority_reached(data: &SynchronizedData) -> bool {
    data.termination_majority_reached().unwrap_or(false)
}

/// Background watcher voting to terminate once the registry says so
pub(super) async fn run(ctx: BehaviourCtx) -> BehaviourResult<()> {
    loop {
        if majority_reached(&ctx.sync_data()) {
            return Ok(());
        }

        let signal = match ctx
            .read(SERVICE_REGISTRY, TERMINATION_SIGNAL, vec![])
            .await
        {
            Ok(bytes) => match decode_whole::<Option<TxHash>, _>(&bytes, STD_BINCODE_CONFIG) {
                Ok(signal) => signal,
                Err(err) => {
                    debug!(
                        target: LOG_TARGET,
                        err = %err.fmt_compact(),
                        "Invalid termination signal"
                    );
                    None
                }
            },
            Err(err) => {
                debug!(
                    target: LOG_TARGET,
                    err = %err.fmt_compact(),
                    "Termination signal read failed"
                );
                None
            }
        };

        let Some(termination_tx) = signal else {
            ctx.sleep(ctx.params().sleep_time()).await;
            continue;
        };

        info!(target: LOG_TARGET, %termination_tx, "Termination requested");
        if let Err(err) = ctx
            .send_a2a_transaction(PayloadData::Termination { termination_tx })
            .await
        {
            debug!(target: LOG_TARGET, err = %err.fmt_compact(), "Submission failed");
        }
        if ctx
            .wait_for_condition(majority_reached, Some(ctx.params().inclusion_timeout()))
            .await
        {
            return Ok(());
        }
    }
}
