//! Final state of a local run, as printed at the end
use std::collections::BTreeMap;

use agora_agent::AgentReport;
use agora_core::block::BlockHeight;
use agora_core::payload::RoundCount;
use agora_core::peer::PeerPubkey;
use agora_rounds::kind::RoundId;
use agora_rounds::sync_data::DataVersion;
use data_encoding::HEXLOWER;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct PeerSummary {
    pub peer: PeerPubkey,
    pub finished: bool,
    pub round: RoundId,
    pub round_count: RoundCount,
    pub version: DataVersion,
    pub height: BlockHeight,
    pub period_count: u64,
    pub blocks_processed: u64,
    pub transitions: u64,
    pub dropped_responses: u64,
    /// Synchronized data, values hex-encoded
    pub state: BTreeMap<String, String>,
}

impl From<&AgentReport> for PeerSummary {
    fn from(report: &AgentReport) -> Self {
        let data = &report.last.sync_data;
        Self {
            peer: report.peer,
            finished: report.finished,
            round: report.last.round,
            round_count: report.last.round_count,
            version: data.version(),
            height: report.last.height,
            period_count: data.period_count().unwrap_or_default(),
            blocks_processed: report.blocks_processed,
            transitions: report.transitions,
            dropped_responses: report.dropped_responses,
            state: data
                .iter_raw()
                .map(|(k, v)| (k.to_owned(), HEXLOWER.encode(v)))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Every peer ended with the same synchronized data
    pub agreed: bool,
    pub sent_transactions: usize,
    pub peers: Vec<PeerSummary>,
}

impl RunSummary {
    pub fn new(reports: &[AgentReport], sent_transactions: usize) -> Self {
        let agreed = reports
            .windows(2)
            .all(|w| w[0].last.sync_data == w[1].last.sync_data);
        Self {
            agreed,
            sent_transactions,
            peers: reports.iter().map(PeerSummary::from).collect(),
        }
    }
}
