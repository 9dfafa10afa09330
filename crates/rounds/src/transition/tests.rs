use assert_matches::assert_matches;

use super::*;
use crate::error::ConfigurationError;

#[test]
fn app_table_is_valid() {
    let table = TransitionTable::app().expect("valid");

    assert_eq!(table.initial(), RoundId::RegistrationStartup);
    assert_eq!(table.background_round(), Some(RoundId::Termination));
    assert_eq!(
        table
            .process_event(RoundId::ValidateTransaction, Event::Done)
            .expect("edge"),
        RoundId::Randomness
    );
    assert_eq!(
        table
            .process_event(RoundId::Termination, Event::Terminate)
            .expect("edge"),
        RoundId::Terminated
    );
}

#[test]
fn missing_edge_is_rejected_before_start() {
    let edges: Vec<_> = APP_TRANSITIONS
        .iter()
        .copied()
        .filter(|(from, event, _)| {
            !(*from == RoundId::Finalization && *event == Event::RoundTimeout)
        })
        .collect();

    assert_matches!(
        TransitionTable::new(RoundId::RegistrationStartup, &edges, Some(APP_BACKGROUND)),
        Err(ConfigurationError::UnknownTransition {
            round: RoundId::Finalization,
            event: Event::RoundTimeout
        })
    );
}

#[test]
fn unreachable_rounds_need_no_edges() {
    // a table where only registration and randomness are reachable
    let table = TransitionTable::new(
        RoundId::RegistrationStartup,
        &[
            (RoundId::RegistrationStartup, Event::Done, RoundId::Randomness),
            (RoundId::Randomness, Event::Done, RoundId::Terminated),
            (RoundId::Randomness, Event::NoMajority, RoundId::Randomness),
            (RoundId::Randomness, Event::RoundTimeout, RoundId::Terminated),
        ],
        None,
    )
    .expect("valid");

    assert_matches!(
        table.process_event(RoundId::SelectKeeper, Event::Done),
        Err(ConfigurationError::UnknownTransition { .. })
    );
}

#[test]
fn malformed_tables() {
    assert_matches!(
        TransitionTable::new(
            RoundId::RegistrationStartup,
            &[
                (RoundId::RegistrationStartup, Event::Done, RoundId::Terminated),
                (RoundId::RegistrationStartup, Event::Done, RoundId::Randomness),
            ],
            None,
        ),
        Err(ConfigurationError::DuplicateTransition { .. })
    );
    assert_matches!(
        TransitionTable::new(
            RoundId::RegistrationStartup,
            &[
                (RoundId::RegistrationStartup, Event::Done, RoundId::Terminated),
                (RoundId::Terminated, Event::Done, RoundId::Randomness),
            ],
            None,
        ),
        Err(ConfigurationError::TerminalWithEdges { .. })
    );
    assert_matches!(
        TransitionTable::new(
            RoundId::RegistrationStartup,
            &[(RoundId::RegistrationStartup, Event::Done, RoundId::Terminated)],
            Some((RoundId::Randomness, Event::Done, RoundId::Terminated)),
        ),
        Err(ConfigurationError::NotBackground { .. })
    );
}
