//! Static round-transition graph
#[cfg(test)]
mod tests;

use std::collections::{BTreeMap, BTreeSet};

use snafu::OptionExt as _;

use crate::error::{
    ConfigurationResult, DuplicateTransitionSnafu, NotBackgroundSnafu,
    TerminalWithEdgesSnafu, UnknownTransitionSnafu,
};
use crate::event::Event;
use crate::kind::RoundId;

/// Edges of the bundled application
pub const APP_TRANSITIONS: &[(RoundId, Event, RoundId)] = &[
    (RoundId::RegistrationStartup, Event::Done, RoundId::Randomness),
    (RoundId::Randomness, Event::Done, RoundId::SelectKeeper),
    (RoundId::Randomness, Event::NoMajority, RoundId::Randomness),
    (RoundId::Randomness, Event::RoundTimeout, RoundId::Randomness),
    (RoundId::SelectKeeper, Event::Done, RoundId::CollectSignature),
    (RoundId::SelectKeeper, Event::RoundTimeout, RoundId::Randomness),
    (RoundId::CollectSignature, Event::Done, RoundId::Finalization),
    (RoundId::CollectSignature, Event::RoundTimeout, RoundId::Randomness),
    (RoundId::Finalization, Event::Done, RoundId::ValidateTransaction),
    (RoundId::Finalization, Event::FinalizationFailed, RoundId::SelectKeeper),
    (RoundId::Finalization, Event::RoundTimeout, RoundId::SelectKeeper),
    (RoundId::ValidateTransaction, Event::Done, RoundId::Randomness),
    (RoundId::ValidateTransaction, Event::Negative, RoundId::SelectKeeper),
    (RoundId::ValidateTransaction, Event::RoundTimeout, RoundId::SelectKeeper),
];

/// Background round of the bundled application and where it leads
pub const APP_BACKGROUND: (RoundId, Event, RoundId) =
    (RoundId::Termination, Event::Terminate, RoundId::Terminated);

/// Validated `(round, event) -> round` table
#[derive(Debug, Clone)]
pub struct TransitionTable {
    initial: RoundId,
    edges: BTreeMap<(RoundId, Event), RoundId>,
    background: Option<(RoundId, Event, RoundId)>,
}

impl TransitionTable {
    /// Build and validate a table
    ///
    /// Every round reachable from `initial` must have an edge for every event
    /// it can emit, and terminal rounds must have none.
    pub fn new(
        initial: RoundId,
        edges: &[(RoundId, Event, RoundId)],
        background: Option<(RoundId, Event, RoundId)>,
    ) -> ConfigurationResult<Self> {
        let mut map = BTreeMap::new();
        for (from, event, to) in edges {
            if from.is_terminal() {
                return TerminalWithEdgesSnafu { round: *from }.fail();
            }
            if map.insert((*from, *event), *to).is_some() {
                return DuplicateTransitionSnafu {
                    round: *from,
                    event: *event,
                }
                .fail();
            }
        }

        if let Some((round, event, _)) = background {
            if !round.is_background() {
                return NotBackgroundSnafu { round }.fail();
            }
            if !round.emits(event) {
                return UnknownTransitionSnafu { round, event }.fail();
            }
        }

        let slf = Self {
            initial,
            edges: map,
            background,
        };

        let mut visited = BTreeSet::new();
        let mut pending = vec![initial];
        if let Some((_, _, to)) = background {
            pending.push(to);
        }

        while let Some(round) = pending.pop() {
            if !visited.insert(round) {
                continue;
            }
            for event in round.events() {
                let next = slf
                    .edges
                    .get(&(round, *event))
                    .copied()
                    .context(UnknownTransitionSnafu {
                        round,
                        event: *event,
                    })?;
                pending.push(next);
            }
        }

        Ok(slf)
    }

    /// The table of the bundled application
    pub fn app() -> ConfigurationResult<Self> {
        Self::new(
            RoundId::RegistrationStartup,
            APP_TRANSITIONS,
            Some(APP_BACKGROUND),
        )
    }

    pub fn initial(&self) -> RoundId {
        self.initial
    }

    pub fn background_round(&self) -> Option<RoundId> {
        self.background.map(|(round, _, _)| round)
    }

    /// Round to move to after `round` concluded with `event`
    pub fn process_event(&self, round: RoundId, event: Event) -> ConfigurationResult<RoundId> {
        if let Some((bg_round, bg_event, to)) = self.background {
            if bg_round == round && bg_event == event {
                return Ok(to);
            }
        }

        self.edges
            .get(&(round, event))
            .copied()
            .context(UnknownTransitionSnafu { round, event })
    }
}
