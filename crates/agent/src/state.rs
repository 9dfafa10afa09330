use std::fmt;

use agora_util_array_type::array_type_fixed_size_define;

array_type_fixed_size_define! {
    /// One instantiation of a behaviour
    ///
    /// A fresh id is assigned every time a behaviour is (re)started, so
    /// responses addressed to a torn-down instance can be told apart.
    #[derive(Clone, Copy, Hash)]
    pub struct InstanceId(u64);
}

array_type_fixed_size_define! {
    /// Identifies a single outstanding external request
    #[derive(Clone, Copy, Hash)]
    pub struct RequestNonce(u64);
}

/// What a suspended behaviour is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suspension {
    Message { nonce: RequestNonce },
    Timer,
    RoundEnd,
    Condition,
}

impl fmt::Display for Suspension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Suspension::Message { nonce } => write!(f, "message#{nonce}"),
            Suspension::Timer => f.write_str("timer"),
            Suspension::RoundEnd => f.write_str("round-end"),
            Suspension::Condition => f.write_str("condition"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BehaviourState {
    Ready,
    Running,
    Suspended(Suspension),
    Done,
}

impl BehaviourState {
    pub fn is_done(self) -> bool {
        self == BehaviourState::Done
    }
}

impl fmt::Display for BehaviourState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BehaviourState::Ready => f.write_str("ready"),
            BehaviourState::Running => f.write_str("running"),
            BehaviourState::Suspended(s) => write!(f, "suspended({s})"),
            BehaviourState::Done => f.write_str("done"),
        }
    }
}
