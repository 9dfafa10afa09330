//! The application: current round, background round and agreed state
#[cfg(test)]
mod tests;

use agora_core::block::{Block, BlockHeight};
use agora_core::payload::{PayloadRaw, RoundCount};
use agora_core::signed::Signed;
use agora_util_error::fmt::FmtCompact as _;
use agora_util_fmt_opt::AsFmtOption as _;
use bincode::{Decode, Encode};
use tracing::{debug, info, instrument};

use crate::LOG_TARGET;
use crate::error::{BlockOutOfOrderSnafu, FatalResult, InvalidPayloadError, ProtocolResult};
use crate::event::Event;
use crate::kind::RoundId;
use crate::params::AppParams;
use crate::round::ThresholdRound;
use crate::sync_data::{DataVersion, SyncDataHistory, SynchronizedData};
use crate::transition::TransitionTable;

/// Everything needed to resume an [`Application`]
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct AppCheckpoint {
    pub sync_data: SynchronizedData,
    /// Round to resume in
    pub round: RoundId,
    pub previous: Option<RoundId>,
    pub round_count: RoundCount,
    /// Height of the block that produced `sync_data`
    pub height: BlockHeight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: RoundId,
    pub event: Event,
    pub to: RoundId,
    pub version: DataVersion,
    pub round_count: RoundCount,
    /// The event came from the background round
    pub preempted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockOutcome {
    pub height: BlockHeight,
    pub accepted: usize,
    pub rejected: usize,
    pub transition: Option<Transition>,
}

pub struct Application {
    params: AppParams,
    table: TransitionTable,
    current: ThresholdRound,
    previous: Option<RoundId>,
    background: Option<ThresholdRound>,
    sync_data: SynchronizedData,
    history: SyncDataHistory,
    round_count: RoundCount,
    /// Last applied block
    height: BlockHeight,
}

impl Application {
    pub fn new(params: AppParams) -> FatalResult<Self> {
        Self::with_table(params, TransitionTable::app()?)
    }

    pub fn with_table(params: AppParams, table: TransitionTable) -> FatalResult<Self> {
        let checkpoint = AppCheckpoint {
            sync_data: SynchronizedData::new(),
            round: table.initial(),
            previous: None,
            round_count: RoundCount::ZERO,
            height: BlockHeight::ZERO,
        };
        Self::restore_with_table(params, table, checkpoint)
    }

    /// Resume from a checkpoint, at the round following it
    pub fn restore(params: AppParams, checkpoint: AppCheckpoint) -> FatalResult<Self> {
        Self::restore_with_table(params, TransitionTable::app()?, checkpoint)
    }

    fn restore_with_table(
        params: AppParams,
        table: TransitionTable,
        checkpoint: AppCheckpoint,
    ) -> FatalResult<Self> {
        let current = instantiate(
            &params,
            &checkpoint.sync_data,
            checkpoint.round,
            checkpoint.round_count,
            checkpoint.height,
        )?;
        let history = SyncDataHistory::new(checkpoint.sync_data.clone(), params.history_len());

        let mut slf = Self {
            params,
            table,
            current,
            previous: checkpoint.previous,
            background: None,
            sync_data: checkpoint.sync_data,
            history,
            round_count: checkpoint.round_count,
            height: checkpoint.height,
        };
        slf.refresh_background()?;

        info!(
            target: LOG_TARGET,
            round = %slf.current.id(),
            version = %slf.sync_data.version(),
            height = %slf.height,
            "Application started"
        );
        Ok(slf)
    }

    pub fn params(&self) -> &AppParams {
        &self.params
    }

    pub fn current_round(&self) -> RoundId {
        self.current.id()
    }

    pub fn current(&self) -> &ThresholdRound {
        &self.current
    }

    pub fn previous_round(&self) -> Option<RoundId> {
        self.previous
    }

    pub fn background_round(&self) -> Option<&ThresholdRound> {
        self.background.as_ref()
    }

    pub fn sync_data(&self) -> &SynchronizedData {
        &self.sync_data
    }

    pub fn history(&self) -> &SyncDataHistory {
        &self.history
    }

    pub fn round_count(&self) -> RoundCount {
        self.round_count
    }

    /// Height of the last applied block
    pub fn height(&self) -> BlockHeight {
        self.height
    }

    pub fn is_finished(&self) -> bool {
        self.current.id().is_terminal()
    }

    pub fn checkpoint(&self) -> AppCheckpoint {
        AppCheckpoint {
            sync_data: self.sync_data.clone(),
            round: self.current.id(),
            previous: self.previous,
            round_count: self.round_count,
            height: self.height,
        }
    }

    /// Apply the next committed block
    ///
    /// Invalid payloads are dropped and counted, only errors that make it
    /// unsafe to continue are returned.
    #[instrument(skip_all, fields(height = %block.height, round = %self.current.id()))]
    pub fn process_block(&mut self, block: &Block) -> FatalResult<BlockOutcome> {
        let expected = self.height.next_expect();
        if block.height != expected {
            return BlockOutOfOrderSnafu {
                expected,
                received: block.height,
            }
            .fail();
        }
        self.height = block.height;

        let mut outcome = BlockOutcome {
            height: block.height,
            accepted: 0,
            rejected: 0,
            transition: None,
        };

        if self.is_finished() {
            return Ok(outcome);
        }

        for signed in &block.payloads {
            match self.route_payload(signed) {
                Ok(()) => outcome.accepted += 1,
                Err(err) => {
                    outcome.rejected += 1;
                    debug!(
                        target: LOG_TARGET,
                        err = %err.fmt_compact(),
                        "Rejected payload"
                    );
                }
            }
        }

        let round_timeout = self.params.round_timeout();
        // Both see the same snapshot; the background decision wins
        let background = match self.background.as_mut() {
            Some(bg) => bg
                .end_block(&self.sync_data, block.height, round_timeout)?
                .map(|res| (bg.id(), res)),
            None => None,
        };
        let foreground = self
            .current
            .end_block(&self.sync_data, block.height, round_timeout)?;

        outcome.transition = match (background, foreground) {
            (Some((bg_round, (data, event))), foreground) => {
                if let Some((_, fg_event)) = foreground {
                    debug!(
                        target: LOG_TARGET,
                        %fg_event,
                        bg_event = %event,
                        "Background event preempts foreground decision"
                    );
                }
                Some(self.apply_transition(bg_round, data, event, true)?)
            }
            (None, Some((data, event))) => {
                Some(self.apply_transition(self.current.id(), data, event, false)?)
            }
            (None, None) => None,
        };

        Ok(outcome)
    }

    fn route_payload(&mut self, signed: &Signed<PayloadRaw>) -> ProtocolResult<()> {
        let payload = signed.open().map_err(InvalidPayloadError::from)?;

        match self.background.as_mut() {
            Some(bg) if bg.id().allowed_tx_type() == Some(payload.transaction_type()) => {
                bg.process_payload(payload)
            }
            _ => self.current.process_payload(payload),
        }
    }

    fn apply_transition(
        &mut self,
        from: RoundId,
        data: SynchronizedData,
        event: Event,
        preempted: bool,
    ) -> FatalResult<Transition> {
        let to = self.table.process_event(from, event)?;
        let round_count = self.round_count.next_expect();

        let current = instantiate(&self.params, &data, to, round_count, self.height)?;

        self.history.push(data.clone());
        self.sync_data = data;
        self.round_count = round_count;
        self.previous = Some(self.current.id());
        self.current = current;

        if preempted {
            self.background = None;
        } else {
            self.refresh_background()?;
        }

        let transition = Transition {
            from,
            event,
            to,
            version: self.sync_data.version(),
            round_count,
            preempted,
        };
        info!(
            target: LOG_TARGET,
            %from,
            %event,
            %to,
            version = %transition.version,
            round_count = %round_count,
            previous = %self.previous.fmt_option(),
            preempted,
            "Round transition"
        );
        Ok(transition)
    }

    /// (Re)create the background round if the participant set changed
    ///
    /// Votes collected so far survive foreground transitions.
    fn refresh_background(&mut self) -> FatalResult<()> {
        let Some(bg_round) = self.table.background_round() else {
            return Ok(());
        };
        if self.is_finished() {
            self.background = None;
            return Ok(());
        }

        let participants = bg_round.participants(&self.sync_data, self.params.participants())?;
        if self
            .background
            .as_ref()
            .is_some_and(|bg| *bg.participants() == participants)
        {
            return Ok(());
        }

        self.background = Some(
            ThresholdRound::builder()
                .id(bg_round)
                .round_count(self.round_count)
                .participants(participants)
                .start_height(self.height)
                .accept_any_round_count(true)
                .build()?,
        );
        Ok(())
    }
}

fn instantiate(
    params: &AppParams,
    data: &SynchronizedData,
    id: RoundId,
    round_count: RoundCount,
    height: BlockHeight,
) -> FatalResult<ThresholdRound> {
    Ok(ThresholdRound::builder()
        .id(id)
        .round_count(round_count)
        .participants(id.participants(data, params.participants())?)
        .maybe_keeper(id.keeper(data)?)
        .start_height(height)
        .build()?)
}
