use agora_core::peer_set::PeerSet;

pub const DEFAULT_ROUND_TIMEOUT_BLOCKS: u64 = 30;
pub const DEFAULT_HISTORY_LEN: usize = 64;

/// Parameters every peer must agree on out of band
#[derive(Debug, Clone)]
pub struct AppParams {
    participants: PeerSet,
    round_timeout: u64,
    history_len: usize,
}

#[bon::bon]
impl AppParams {
    #[builder]
    pub fn new(
        /// Configured set of peers, before registration narrows it down
        participants: PeerSet,
        /// Blocks after which a round without a decision times out
        #[builder(default = DEFAULT_ROUND_TIMEOUT_BLOCKS)]
        round_timeout: u64,
        /// Number of past snapshots kept in memory
        #[builder(default = DEFAULT_HISTORY_LEN)]
        history_len: usize,
    ) -> Self {
        Self {
            participants,
            round_timeout,
            history_len,
        }
    }
}

impl AppParams {
    pub fn participants(&self) -> &PeerSet {
        &self.participants
    }

    pub fn round_timeout(&self) -> u64 {
        self.round_timeout
    }

    pub fn history_len(&self) -> usize {
        self.history_len
    }
}
