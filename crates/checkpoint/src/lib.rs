// SPDX-License-Identifier: MIT

//! Checkpoints of the agreed application state
//!
//! A checkpoint is written after every round transition. Restarting a peer
//! resumes at the round following its latest one.

pub mod error;
mod tables;

#[cfg(test)]
mod tests;

use std::path::PathBuf;

use agora_rounds::app::AppCheckpoint;
use agora_rounds::sync_data::DataVersion;
use agora_util_error::fmt::FmtCompact as _;
use error::{
    CheckpointResult, CommitSnafu, DatabaseSnafu, InvalidPathSnafu, JoinSnafu, TransactionSnafu,
};
use redb_bincode::{ReadTransaction, WriteTransaction};
use snafu::{OptionExt as _, ResultExt as _};
use tracing::{debug, instrument, warn};

use crate::tables::checkpoints;

const LOG_TARGET: &str = "agora::checkpoint";

#[derive(Debug)]
pub struct CheckpointStore {
    inner: redb_bincode::Database,
    ephemeral: bool,
}

impl CheckpointStore {
    pub async fn new_in_memory() -> CheckpointResult<CheckpointStore> {
        debug!(target: LOG_TARGET, "Opening in-memory checkpoint store");
        let inner = redb::Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .context(DatabaseSnafu)?;
        Self::open_inner(inner, true).await
    }

    pub async fn open(path: impl Into<PathBuf>) -> CheckpointResult<CheckpointStore> {
        let path = path.into();
        tokio::fs::create_dir_all(path.parent().context(InvalidPathSnafu)?).await?;
        debug!(target: LOG_TARGET, path = %path.display(), "Opening checkpoint store…");

        let inner = tokio::task::spawn_blocking(move || {
            let mut db = redb::Database::create(path)?;
            let _ = db.compact().inspect_err(|err| {
                warn!(target: LOG_TARGET, err = %err.fmt_compact(), "Failed to compact database");
            });
            Ok(db)
        })
        .await
        .context(JoinSnafu)?
        .context(DatabaseSnafu)?;

        Self::open_inner(inner, false).await
    }

    #[instrument(skip_all)]
    async fn open_inner(inner: redb::Database, ephemeral: bool) -> CheckpointResult<Self> {
        let slf = Self {
            inner: redb_bincode::Database::from(inner),
            ephemeral,
        };

        // Make sure tables exist, so read transactions can open them
        slf.write_with(|dbtx| {
            dbtx.open_table(&checkpoints::TABLE)?;
            Ok(())
        })
        .await?;

        Ok(slf)
    }

    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }

    async fn write_with<T>(
        &self,
        f: impl FnOnce(&'_ WriteTransaction) -> CheckpointResult<T>,
    ) -> CheckpointResult<T> {
        tokio::task::block_in_place(|| {
            let dbtx = self.inner.begin_write().context(TransactionSnafu)?;
            let res = f(&dbtx)?;
            dbtx.commit().context(CommitSnafu)?;

            Ok(res)
        })
    }

    async fn read_with<T>(
        &self,
        f: impl FnOnce(&'_ ReadTransaction) -> CheckpointResult<T>,
    ) -> CheckpointResult<T> {
        tokio::task::block_in_place(|| {
            let dbtx = self.inner.begin_read().context(TransactionSnafu)?;

            f(&dbtx)
        })
    }

    /// Store a checkpoint, replacing any existing one of the same version
    pub async fn save(&self, checkpoint: &AppCheckpoint) -> CheckpointResult<()> {
        let version = checkpoint.sync_data.version();
        self.write_with(|dbtx| {
            let mut tbl = dbtx.open_table(&checkpoints::TABLE)?;
            tbl.insert(&version, checkpoint)?;
            Ok(())
        })
        .await?;

        debug!(
            target: LOG_TARGET,
            %version,
            round = %checkpoint.round,
            height = %checkpoint.height,
            "Saved checkpoint"
        );
        Ok(())
    }

    pub async fn load(&self, version: DataVersion) -> CheckpointResult<Option<AppCheckpoint>> {
        self.read_with(|dbtx| {
            let tbl = dbtx.open_table(&checkpoints::TABLE)?;
            Ok(tbl.get(&version)?.map(|v| v.value()))
        })
        .await
    }

    pub async fn load_latest(&self) -> CheckpointResult<Option<AppCheckpoint>> {
        self.read_with(|dbtx| {
            let tbl = dbtx.open_table(&checkpoints::TABLE)?;
            Ok(tbl
                .range(..)?
                .next_back()
                .transpose()?
                .map(|(_k, v)| v.value()))
        })
        .await
    }

    /// All stored versions, ascending
    pub async fn versions(&self) -> CheckpointResult<Vec<DataVersion>> {
        self.read_with(|dbtx| {
            let tbl = dbtx.open_table(&checkpoints::TABLE)?;
            tbl.range(..)?
                .map(|kv| {
                    let (k, _v) = kv?;
                    Ok(k.value())
                })
                .collect()
        })
        .await
    }

    /// Delete all checkpoints older than `version`, returning how many
    pub async fn prune_below(&self, version: DataVersion) -> CheckpointResult<usize> {
        self.write_with(|dbtx| {
            let mut tbl = dbtx.open_table(&checkpoints::TABLE)?;

            let old = tbl
                .range(..version)?
                .map(|kv| {
                    let (k, _v) = kv?;
                    Ok(k.value())
                })
                .collect::<CheckpointResult<Vec<_>>>()?;

            for k in &old {
                tbl.remove(k)?;
            }
            Ok(old.len())
        })
        .await
    }
}
