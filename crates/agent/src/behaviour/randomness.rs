use std::time::Duration;

use agora_core::payload::PayloadData;
use agora_util_error::fmt::FmtCompact as _;
use backon::{ConstantBuilder, Retryable as _};
use tracing::{debug, warn};

use super::BehaviourResult;
use crate::LOG_TARGET;
use crate::ctx::BehaviourCtx;
use crate::external::ExternalError;

pub(super) async fn run(ctx: BehaviourCtx) -> BehaviourResult<()> {
    let observation = { || ctx.fetch_randomness() }
        .retry(
            ConstantBuilder::default()
                .with_delay(ctx.params().sleep_time())
                .with_max_times(ctx.params().retry_attempts()),
        )
        .notify(|err: &ExternalError, dur: Duration| {
            debug!(
                target: LOG_TARGET,
                dur_millis = %dur.as_millis(),
                err = %err.fmt_compact(),
                "Retrying randomness fetch"
            );
        })
        .await;

    match observation {
        Ok(observation) => {
            ctx.submit_and_wait(PayloadData::Randomness {
                round: observation.round,
                randomness: observation.randomness,
            })
            .await;
        }
        Err(err) => {
            // Without a value to vote for, let the round time out
            warn!(
                target: LOG_TARGET,
                err = %err.fmt_compact(),
                "Could not fetch randomness"
            );
            ctx.wait_until_round_end(None).await;
        }
    }
    Ok(())
}
