//! All peers of a service in one process, on a loopback gateway
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr as _;
use std::sync::Arc;
use std::time::Duration;

use agora_agent::external::Externals;
use agora_agent::mock::{MockChain, MockRandomness};
use agora_agent::params::BehaviourParams;
use agora_agent::{Agent, AgentReport};
use agora_checkpoint::CheckpointStore;
use agora_core::block::BlockHeight;
use agora_core::num_peers::NumPeers;
use agora_core::payload::TxHash;
use agora_core::peer::PeerSeckey;
use agora_core::peer_set::PeerSet;
use agora_gateway::LoopbackGateway;
use agora_rounds::app::AppCheckpoint;
use agora_rounds::params::AppParams;
use agora_rounds::sync_data::DataVersion;
use agora_util_error::WhateverResult;
use agora_util_error::fmt::FmtCompact as _;
use n0_future::task::AbortOnDropHandle;
use snafu::{OptionExt as _, ResultExt as _, whatever};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::opts::RunOpts;
use crate::summary::RunSummary;

const LOG_TARGET: &str = "agora::local";
const SECRETS_FILE: &str = "peers.txt";

async fn load_or_generate_secrets(
    data_dir: Option<&Path>,
    num_peers: usize,
) -> WhateverResult<Vec<PeerSeckey>> {
    let Some(data_dir) = data_dir else {
        return Ok((0..num_peers).map(|_| PeerSeckey::generate()).collect());
    };
    let path = data_dir.join(SECRETS_FILE);

    if tokio::fs::try_exists(&path)
        .await
        .whatever_context("Failed to check secrets file")?
    {
        let content = tokio::fs::read_to_string(&path)
            .await
            .whatever_context("Failed to read secrets file")?;
        let secrets = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(PeerSeckey::from_str)
            .collect::<Result<Vec<_>, _>>()
            .whatever_context("Invalid secret")?;
        if secrets.len() != num_peers {
            whatever!(
                "Data dir has {} peers, but {num_peers} were requested",
                secrets.len()
            );
        }
        return Ok(secrets);
    }

    let secrets: Vec<_> = (0..num_peers).map(|_| PeerSeckey::generate()).collect();
    let content: String = secrets.iter().map(|s| format!("{s}\n")).collect();
    tokio::fs::write(&path, content)
        .await
        .whatever_context("Failed to write secrets file")?;
    Ok(secrets)
}

fn beacon_seed(participants: &PeerSet) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    for peer in participants.as_slice() {
        hasher.update(peer.as_slice());
    }
    *hasher.finalize().as_bytes()
}

/// Latest checkpoint every peer has
async fn common_checkpoint(
    stores: &[Arc<CheckpointStore>],
) -> WhateverResult<Option<AppCheckpoint>> {
    let mut common: Option<BTreeSet<DataVersion>> = None;
    for store in stores {
        let versions: BTreeSet<_> = store
            .versions()
            .await
            .whatever_context("Failed to list checkpoints")?
            .into_iter()
            .collect();
        common = Some(match common {
            Some(common) => common.intersection(&versions).copied().collect(),
            None => versions,
        });
    }
    let Some(version) = common.and_then(|c| c.last().copied()) else {
        return Ok(None);
    };
    let Some(store) = stores.first() else {
        return Ok(None);
    };
    store
        .load(version)
        .await
        .whatever_context("Failed to load checkpoint")
}

pub async fn run_local(data_dir: Option<PathBuf>, opts: &RunOpts) -> WhateverResult<RunSummary> {
    if opts.peers == 0 {
        whatever!("At least one peer is required");
    }
    if NumPeers::MAX < opts.peers {
        whatever!("At most {} peers are supported", NumPeers::MAX);
    }
    if let Some(data_dir) = data_dir.as_ref() {
        tokio::fs::create_dir_all(data_dir)
            .await
            .whatever_context("Failed to create/open data dir")?;
    }

    let secrets = load_or_generate_secrets(data_dir.as_deref(), opts.peers).await?;
    let participants: PeerSet = secrets.iter().map(|s| s.pubkey()).collect();
    let app_params = AppParams::builder()
        .participants(participants.clone())
        .round_timeout(opts.round_timeout_blocks)
        .history_len(opts.history_len)
        .build();
    let behaviour_params = BehaviourParams::builder()
        .sleep_time(Duration::from_millis(opts.sleep_ms))
        .retry_attempts(opts.retry_attempts)
        .submit_attempts(opts.submit_attempts)
        .inclusion_timeout(Duration::from_millis(opts.inclusion_timeout_ms))
        .healthcheck_timeout(Duration::from_secs(opts.healthcheck_timeout_secs))
        .build();

    let mut stores = vec![];
    if let Some(data_dir) = data_dir.as_ref() {
        for idx in 0..opts.peers {
            stores.push(Arc::new(
                CheckpointStore::open(data_dir.join(format!("peer-{idx}.redb")))
                    .await
                    .whatever_context("Failed to open checkpoint store")?,
            ));
        }
    }
    let restore = common_checkpoint(&stores).await?;
    let start_height = restore.as_ref().map(|c| c.height).unwrap_or(BlockHeight::ZERO);
    if let Some(checkpoint) = restore.as_ref() {
        info!(
            target: LOG_TARGET,
            version = %checkpoint.sync_data.version(),
            round = %checkpoint.round,
            height = %checkpoint.height,
            "Resuming from checkpoint"
        );
    }

    let gateway = Arc::new(LoopbackGateway::new_at(start_height));
    let chain = Arc::new(MockChain::new());
    let randomness = Arc::new(MockRandomness::new(beacon_seed(&participants)));
    let externals = Externals {
        chain: chain.clone(),
        randomness: randomness.clone(),
    };
    let (stop_tx, stop_rx) = watch::channel(false);

    let mut agents = vec![];
    for (idx, seckey) in secrets.iter().enumerate() {
        agents.push(
            Agent::builder()
                .seckey(*seckey)
                .app_params(app_params.clone())
                .gateway(gateway.clone())
                .externals(externals.clone())
                .behaviour_params(behaviour_params.clone())
                .maybe_restore(restore.clone())
                .maybe_checkpoints(stores.get(idx).cloned())
                .keep_checkpoints(opts.keep_checkpoints)
                .stop_rx(stop_rx.clone())
                .build()
                .whatever_context("Failed to create agent")?,
        );
    }
    let mut sync_data_rx = agents
        .first()
        .whatever_context("No agents")?
        .subscribe_sync_data();

    let _gateway_task = AbortOnDropHandle::new(tokio::spawn({
        let gateway = gateway.clone();
        let interval = opts.block_interval();
        async move { gateway.run(interval).await }
    }));
    let _beacon_task = AbortOnDropHandle::new(tokio::spawn({
        let randomness = randomness.clone();
        let interval = opts.beacon_interval();
        async move {
            let mut interval = tokio::time::interval(interval);
            interval.tick().await;
            loop {
                interval.tick().await;
                randomness.advance();
            }
        }
    }));
    let _termination_task = AbortOnDropHandle::new(tokio::spawn({
        let chain = chain.clone();
        let periods = opts.periods;
        async move {
            if sync_data_rx
                .wait_for(|data| periods <= data.period_count().unwrap_or_default())
                .await
                .is_ok()
            {
                info!(target: LOG_TARGET, periods, "Signalling termination");
                chain.set_termination_signal(TxHash::from(blake3::hash(b"terminate")));
            }
        }
    }));
    let _ctrl_c_task = AbortOnDropHandle::new(tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!(target: LOG_TARGET, "Interrupted, stopping peers");
                stop_tx.send_replace(true);
            }
            Err(err) => {
                warn!(target: LOG_TARGET, err = %err.fmt_compact(), "Can't listen for ctrl-c");
            }
        }
    }));

    let handles: Vec<_> = agents
        .into_iter()
        .map(|agent| AbortOnDropHandle::new(tokio::spawn(agent.run())))
        .collect();

    let mut reports: Vec<AgentReport> = vec![];
    for handle in handles {
        reports.push(
            handle
                .await
                .whatever_context("Agent task panicked")?
                .whatever_context("Agent failed")?,
        );
    }

    Ok(RunSummary::new(&reports, chain.sent_transactions().len()))
}
