use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Opts {
    /// Keep peer secrets and checkpoints here, and resume from them
    #[arg(long, env = "AGORA_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print a new peer secret key
    GenSecret,
    /// Run a local set of peers until they agree to terminate
    Run(RunOpts),
}

#[derive(Debug, Args, Clone)]
pub struct RunOpts {
    #[arg(long, env = "AGORA_PEERS", default_value = "4")]
    pub peers: usize,

    #[arg(long, env = "AGORA_BLOCK_INTERVAL_MS", default_value = "100")]
    pub block_interval_ms: u64,

    /// Blocks a round may take before it times out
    #[arg(long, env = "AGORA_ROUND_TIMEOUT_BLOCKS", default_value = "30")]
    pub round_timeout_blocks: u64,

    #[arg(long, env = "AGORA_HISTORY_LEN", default_value = "64")]
    pub history_len: usize,

    #[arg(long, env = "AGORA_SLEEP_MS", default_value = "250")]
    pub sleep_ms: u64,

    #[arg(long, env = "AGORA_RETRY_ATTEMPTS", default_value = "5")]
    pub retry_attempts: usize,

    #[arg(long, env = "AGORA_SUBMIT_ATTEMPTS", default_value = "3")]
    pub submit_attempts: usize,

    #[arg(long, env = "AGORA_INCLUSION_TIMEOUT_MS", default_value = "2000")]
    pub inclusion_timeout_ms: u64,

    #[arg(long, env = "AGORA_HEALTHCHECK_TIMEOUT_SECS", default_value = "30")]
    pub healthcheck_timeout_secs: u64,

    /// Completed periods after which the registry asks for termination
    #[arg(long, env = "AGORA_PERIODS", default_value = "3")]
    pub periods: u64,

    /// Move the randomness beacon to its next round this often
    #[arg(long, env = "AGORA_BEACON_INTERVAL_MS", default_value = "5000")]
    pub beacon_interval_ms: u64,

    /// Checkpoints kept per peer
    #[arg(long, env = "AGORA_KEEP_CHECKPOINTS", default_value = "16")]
    pub keep_checkpoints: usize,

    /// Print the final state of every peer as JSON
    #[arg(long, env = "AGORA_JSON", default_value = "false")]
    pub json: bool,
}

impl RunOpts {
    pub fn block_interval(&self) -> Duration {
        Duration::from_millis(self.block_interval_ms)
    }

    pub fn beacon_interval(&self) -> Duration {
        Duration::from_millis(self.beacon_interval_ms)
    }
}
