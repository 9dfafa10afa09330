use bincode::{Decode, Encode};
use serde::Serialize;

/// Outcome of a concluded round, selecting the next one
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode, Serialize)]
pub enum Event {
    Done,
    NoMajority,
    RoundTimeout,
    FinalizationFailed,
    Negative,
    Terminate,
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Event::Done => "done",
            Event::NoMajority => "no_majority",
            Event::RoundTimeout => "round_timeout",
            Event::FinalizationFailed => "finalization_failed",
            Event::Negative => "negative",
            Event::Terminate => "terminate",
        })
    }
}
