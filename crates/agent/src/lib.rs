// SPDX-License-Identifier: MIT

//! Peer-side driver of an agora application
//!
//! A peer runs a single [`Agent`] task. It applies committed blocks to its
//! [`Application`], and for every round it enters starts the matching
//! behaviour, which submits this peer's contribution to the round through
//! the consensus gateway.
pub mod behaviour;
pub mod ctx;
pub mod dispatcher;
pub mod external;
pub mod mock;
pub mod params;
pub mod state;

use std::future;
use std::sync::Arc;

use agora_checkpoint::CheckpointStore;
use agora_core::block::{Block, BlockHeight};
use agora_core::peer::{PeerPubkey, PeerSeckey};
use agora_gateway::{ConsensusGateway, GatewayError};
use agora_rounds::app::{AppCheckpoint, Application, Transition};
use agora_rounds::error::FatalError;
use agora_rounds::kind::RoundId;
use agora_rounds::params::AppParams;
use agora_rounds::sync_data::{DataVersion, SynchronizedData};
use agora_util_error::fmt::FmtCompact as _;
use behaviour::{BehaviourError, BehaviourId, BehaviourResult};
use ctx::{BehaviourCtx, RoundInfo};
use dispatcher::Dispatcher;
use external::Externals;
use futures::future::BoxFuture;
use params::BehaviourParams;
use snafu::{ResultExt as _, Snafu};
use state::{BehaviourState, InstanceId};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, instrument, warn};

const LOG_TARGET: &str = "agora::agent";

pub const DEFAULT_KEEP_CHECKPOINTS: usize = 16;

#[derive(Debug, Snafu)]
pub enum AgentError {
    #[snafu(transparent)]
    Fatal { source: FatalError },
    #[snafu(display("No behaviour for round {round}"))]
    MissingBehaviour { round: RoundId },
    #[snafu(display("Startup failed"))]
    Startup { source: BehaviourError },
    #[snafu(display("Behaviour {behaviour} failed"))]
    Behaviour {
        behaviour: BehaviourId,
        source: BehaviourError,
    },
    #[snafu(display("Gateway failed"))]
    Gateway { source: GatewayError },
}

pub type AgentResult<T> = Result<T, AgentError>;

#[derive(Debug, Clone)]
pub struct AgentReport {
    pub peer: PeerPubkey,
    pub last: AppCheckpoint,
    pub finished: bool,
    pub blocks_processed: u64,
    pub transitions: u64,
    pub dropped_responses: u64,
}

struct Running {
    ctx: BehaviourCtx,
    fut: BoxFuture<'static, BehaviourResult<()>>,
}

async fn poll_running(running: &mut Option<Running>) -> BehaviourResult<()> {
    match running {
        Some(running) => (&mut running.fut).await,
        None => future::pending().await,
    }
}

async fn wait_stop(stop_rx: &mut Option<watch::Receiver<bool>>) {
    match stop_rx {
        Some(stop_rx) => {
            let closed = stop_rx.wait_for(|stop| *stop).await.is_err();
            if closed {
                // Nobody can ask us to stop anymore
                future::pending::<()>().await;
            }
        }
        None => future::pending().await,
    }
}

pub struct Agent {
    seckey: PeerSeckey,
    app: Application,
    gateway: Arc<dyn ConsensusGateway>,
    externals: Externals,
    params: Arc<BehaviourParams>,
    checkpoints: Option<Arc<CheckpointStore>>,
    keep_checkpoints: usize,
    stop_rx: Option<watch::Receiver<bool>>,

    round_tx: watch::Sender<RoundInfo>,
    sync_data_tx: watch::Sender<SynchronizedData>,
    transitions_tx: broadcast::Sender<Transition>,

    next_instance: InstanceId,
    blocks_processed: u64,
    transitions: u64,
}

#[bon::bon]
impl Agent {
    #[builder]
    pub fn new(
        seckey: PeerSeckey,
        app_params: AppParams,
        gateway: Arc<dyn ConsensusGateway>,
        externals: Externals,
        #[builder(default)] behaviour_params: BehaviourParams,
        /// Resume from this instead of starting from scratch
        restore: Option<AppCheckpoint>,
        /// Where to save a checkpoint after every round transition
        checkpoints: Option<Arc<CheckpointStore>>,
        #[builder(default = DEFAULT_KEEP_CHECKPOINTS)] keep_checkpoints: usize,
        /// Stop once `true` is sent
        stop_rx: Option<watch::Receiver<bool>>,
    ) -> AgentResult<Self> {
        for round in RoundId::ALL {
            if !round.is_terminal() && BehaviourId::for_round(*round).is_none() {
                return MissingBehaviourSnafu { round: *round }.fail();
            }
        }

        let app = match restore {
            Some(checkpoint) => Application::restore(app_params, checkpoint)?,
            None => Application::new(app_params)?,
        };

        let (round_tx, _) = watch::channel(Self::round_info_of(&app));
        let (sync_data_tx, _) = watch::channel(app.sync_data().clone());
        let (transitions_tx, _) = broadcast::channel(1024);

        Ok(Self {
            seckey,
            app,
            gateway,
            externals,
            params: Arc::new(behaviour_params),
            checkpoints,
            keep_checkpoints: keep_checkpoints.max(1),
            stop_rx,
            round_tx,
            sync_data_tx,
            transitions_tx,
            next_instance: InstanceId::ZERO,
            blocks_processed: 0,
            transitions: 0,
        })
    }
}

impl Agent {
    fn round_info_of(app: &Application) -> RoundInfo {
        RoundInfo {
            round: app.current_round(),
            round_count: app.round_count(),
            version: app.sync_data().version(),
            height: app.height(),
            finished: app.is_finished(),
        }
    }

    pub fn pubkey(&self) -> PeerPubkey {
        self.seckey.pubkey()
    }

    pub fn app(&self) -> &Application {
        &self.app
    }

    pub fn subscribe_round(&self) -> watch::Receiver<RoundInfo> {
        self.round_tx.subscribe()
    }

    pub fn subscribe_sync_data(&self) -> watch::Receiver<SynchronizedData> {
        self.sync_data_tx.subscribe()
    }

    pub fn subscribe_transitions(&self) -> broadcast::Receiver<Transition> {
        self.transitions_tx.subscribe()
    }

    fn start_behaviour(&mut self, behaviour: BehaviourId, dispatcher: &Dispatcher) -> Running {
        let instance = self.next_instance;
        self.next_instance = instance.next_expect();

        let ctx = BehaviourCtx::builder()
            .behaviour(behaviour)
            .instance(instance)
            .seckey(self.seckey)
            .params(self.params.clone())
            .gateway(self.gateway.clone())
            .dispatcher(dispatcher.clone())
            .round_rx(self.round_tx.subscribe())
            .sync_data_rx(self.sync_data_tx.subscribe())
            .build();
        ctx.set_state(BehaviourState::Running);
        debug!(
            target: LOG_TARGET,
            %behaviour,
            %instance,
            round_count = %ctx.round_count(),
            "Starting behaviour"
        );
        Running {
            fut: behaviour.run(ctx.clone()),
            ctx,
        }
    }

    fn start_for_round(&mut self, round: RoundId, dispatcher: &Dispatcher) -> Option<Running> {
        BehaviourId::for_round(round).map(|behaviour| self.start_behaviour(behaviour, dispatcher))
    }

    fn teardown(running: &mut Option<Running>, dispatcher: &Dispatcher) {
        let Some(running) = running.take() else {
            return;
        };
        let released = dispatcher.release(running.ctx.instance());
        debug!(
            target: LOG_TARGET,
            behaviour = %running.ctx.behaviour(),
            instance = %running.ctx.instance(),
            state = %running.ctx.state(),
            released,
            "Tearing down behaviour"
        );
    }

    fn finish(running: &mut Option<Running>, res: BehaviourResult<()>) -> AgentResult<()> {
        let Some(done) = running.take() else {
            return Ok(());
        };
        let behaviour = done.ctx.behaviour();
        done.ctx.set_state(BehaviourState::Done);
        match res {
            Ok(()) => {
                debug!(target: LOG_TARGET, %behaviour, "Behaviour done");
                Ok(())
            }
            Err(err) if err.is_fatal() => Err(err).context(BehaviourSnafu { behaviour }),
            Err(err) => {
                // The round will time out without our contribution
                warn!(
                    target: LOG_TARGET,
                    %behaviour,
                    err = %err.fmt_compact(),
                    "Behaviour failed"
                );
                Ok(())
            }
        }
    }

    fn publish(&self) {
        self.round_tx.send_replace(Self::round_info_of(&self.app));
        let data = self.app.sync_data();
        self.sync_data_tx.send_if_modified(|cur| {
            if cur.version() != data.version() {
                *cur = data.clone();
                true
            } else {
                false
            }
        });
    }

    async fn save_checkpoint(&self) {
        let Some(store) = self.checkpoints.as_ref() else {
            return;
        };
        let checkpoint = self.app.checkpoint();
        let version = checkpoint.sync_data.version();
        if let Err(err) = store.save(&checkpoint).await {
            warn!(
                target: LOG_TARGET,
                %version,
                err = %err.fmt_compact(),
                "Failed to save checkpoint"
            );
            return;
        }
        let keep = u64::try_from(self.keep_checkpoints).unwrap_or(u64::MAX);
        if let Some(below) = version.to_number().checked_sub(keep) {
            if let Err(err) = store.prune_below(DataVersion::new(below + 1)).await {
                warn!(
                    target: LOG_TARGET,
                    %version,
                    err = %err.fmt_compact(),
                    "Failed to prune checkpoints"
                );
            }
        }
    }

    #[instrument(skip_all, fields(height = %block.height))]
    async fn apply_block(
        &mut self,
        block: &Block,
        dispatcher: &Dispatcher,
        foreground: &mut Option<Running>,
        background: &mut Option<Running>,
    ) -> AgentResult<()> {
        let outcome = self.app.process_block(block)?;
        self.blocks_processed += 1;
        self.publish();

        let Some(transition) = outcome.transition else {
            return Ok(());
        };
        self.transitions += 1;
        debug!(
            target: LOG_TARGET,
            peer = %self.pubkey().to_short(),
            to = %transition.to,
            version = %transition.version,
            "Restarting behaviours after transition"
        );
        // No subscribers is fine
        let _ = self.transitions_tx.send(transition);
        self.save_checkpoint().await;

        Self::teardown(foreground, dispatcher);
        if self.app.is_finished() {
            Self::teardown(background, dispatcher);
            return Ok(());
        }
        *foreground = self.start_for_round(self.app.current_round(), dispatcher);
        if background.is_none() {
            if let Some(round) = self.app.background_round().map(|r| r.id()) {
                *background = self.start_for_round(round, dispatcher);
            }
        }
        Ok(())
    }

    fn report(&self, dispatcher: &Dispatcher) -> AgentReport {
        AgentReport {
            peer: self.pubkey(),
            last: self.app.checkpoint(),
            finished: self.app.is_finished(),
            blocks_processed: self.blocks_processed,
            transitions: self.transitions,
            dropped_responses: dispatcher.num_dropped(),
        }
    }

    /// Run until the application terminates, or a stop is requested
    pub async fn run(mut self) -> AgentResult<AgentReport> {
        let (dispatcher, mut responses_rx) = Dispatcher::new(self.externals.clone());
        let gateway = self.gateway.clone();
        let mut stop_rx = self.stop_rx.take();

        info!(
            target: LOG_TARGET,
            peer = %self.pubkey().to_short(),
            round = %self.app.current_round(),
            height = %self.app.height(),
            "Starting agent"
        );

        let healthcheck = self.start_behaviour(BehaviourId::Healthcheck, &dispatcher);
        healthcheck.fut.await.context(StartupSnafu)?;
        healthcheck.ctx.set_state(BehaviourState::Done);

        let mut foreground = if self.app.is_finished() {
            None
        } else {
            self.start_for_round(self.app.current_round(), &dispatcher)
        };
        let mut background = match self.app.background_round().map(|r| r.id()) {
            Some(round) if !self.app.is_finished() => self.start_for_round(round, &dispatcher),
            _ => None,
        };
        let mut next_height: BlockHeight = self.app.height().next_expect();

        while !self.app.is_finished() {
            tokio::select! {
                Some((nonce, response)) = responses_rx.recv() => {
                    dispatcher.deliver(nonce, response);
                }
                res = gateway.wait_block(next_height) => {
                    let block = match res {
                        Ok(block) => block,
                        Err(GatewayError::Timeout) => {
                            debug!(target: LOG_TARGET, %next_height, "Timeout waiting for block");
                            continue;
                        }
                        Err(err) => return Err(err).context(GatewaySnafu),
                    };
                    self.apply_block(&block, &dispatcher, &mut foreground, &mut background).await?;
                    next_height = next_height.next_expect();
                }
                res = poll_running(&mut foreground) => {
                    Self::finish(&mut foreground, res)?;
                }
                res = poll_running(&mut background) => {
                    Self::finish(&mut background, res)?;
                }
                () = wait_stop(&mut stop_rx) => {
                    info!(target: LOG_TARGET, height = %self.app.height(), "Stop requested");
                    break;
                }
            }
        }

        Self::teardown(&mut foreground, &dispatcher);
        Self::teardown(&mut background, &dispatcher);

        let report = self.report(&dispatcher);
        info!(
            target: LOG_TARGET,
            finished = report.finished,
            height = %report.last.height,
            blocks = report.blocks_processed,
            transitions = report.transitions,
            "Agent stopped"
        );
        Ok(report)
    }
}
