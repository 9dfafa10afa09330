// SPDX-License-Identifier: MIT

mod local;
mod logging;
pub mod opts;
pub mod summary;

use agora_core::peer::PeerSeckey;
use agora_util_error::WhateverResult;
use clap::Parser as _;
pub use local::run_local;
use opts::{Commands, Opts};
use snafu::ResultExt as _;

pub struct Agora;

#[bon::bon]
impl Agora {
    #[builder(finish_fn = run, start_fn = builder)]
    pub async fn build(
        /// Parsed from the command line if not set
        opts: Option<Opts>,
    ) -> WhateverResult<()> {
        logging::init_logging()?;

        let opts = opts.unwrap_or_else(Opts::parse);

        match opts.command {
            Commands::GenSecret => {
                let seckey = PeerSeckey::generate();
                eprintln!("PeerId: {}", seckey.pubkey());
                println!("{seckey}");
            }
            Commands::Run(run_opts) => {
                let summary = run_local(opts.data_dir, &run_opts).await?;
                if run_opts.json {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&summary)
                            .whatever_context("Failed to encode summary")?
                    );
                } else {
                    for peer in &summary.peers {
                        eprintln!(
                            "{} round={} periods={} height={} finished={}",
                            peer.peer.to_short(),
                            peer.round,
                            peer.period_count,
                            peer.height,
                            peer.finished
                        );
                    }
                    eprintln!(
                        "agreed={} sent_transactions={}",
                        summary.agreed, summary.sent_transactions
                    );
                }
            }
        }
        Ok(())
    }
}
