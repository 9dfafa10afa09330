use std::time::Duration;

use agora_core::block::BlockHeight;
use agora_gateway::GatewayError;
use agora_util_error::fmt::FmtCompact as _;
use backon::{FibonacciBuilder, Retryable as _};
use snafu::{ResultExt as _, Snafu};
use tracing::{debug, info};

use super::{BehaviourError, BehaviourResult};
use crate::LOG_TARGET;
use crate::ctx::BehaviourCtx;

const HEALTHCHECK_BACKOFF: FibonacciBuilder = FibonacciBuilder::new()
    .without_max_times()
    .with_max_delay(Duration::from_secs(5));

#[derive(Debug, Snafu)]
enum Unhealthy {
    #[snafu(display("Status unavailable"))]
    Status { source: GatewayError },
    #[snafu(display("Engine is syncing"))]
    Syncing,
    #[snafu(display("Engine at {remote} is behind local state at {local}"))]
    Behind {
        local: BlockHeight,
        remote: BlockHeight,
    },
}

/// Wait for the consensus engine to be caught up with the local state
pub(super) async fn run(ctx: BehaviourCtx) -> BehaviourResult<()> {
    let local = ctx.round_info().height;
    let timeout = ctx.params().healthcheck_timeout();

    let check = {
        || async {
            let status = ctx.gateway().get_status().await.context(StatusSnafu)?;
            if status.syncing {
                return SyncingSnafu.fail();
            }
            if status.height < local {
                return BehindSnafu {
                    local,
                    remote: status.height,
                }
                .fail();
            }
            Ok(status)
        }
    }
    .retry(HEALTHCHECK_BACKOFF.with_min_delay(ctx.params().sleep_time()))
    .notify(|err: &Unhealthy, dur: Duration| {
        debug!(
            target: LOG_TARGET,
            dur_millis = %dur.as_millis(),
            err = %err.fmt_compact(),
            "Consensus engine not healthy yet"
        );
    });

    let Ok(Ok(status)) = tokio::time::timeout(timeout, check).await else {
        return Err(BehaviourError::HealthcheckTimeout { timeout });
    };

    info!(
        target: LOG_TARGET,
        %local,
        remote = %status.height,
        "Consensus engine healthy"
    );
    Ok(())
}
