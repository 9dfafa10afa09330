use agora_core::block::BlockHeight;
use agora_core::payload::RoundCount;
use agora_rounds::kind::RoundId;
use agora_rounds::sync_data::{SyncDataUpdate, SynchronizedData, keys};

use super::*;

fn checkpoints(n: u64) -> Vec<AppCheckpoint> {
    let mut data = SynchronizedData::new();
    let mut res = vec![];
    for i in 1..=n {
        data = data.update(SyncDataUpdate::new().set(keys::PERIOD_COUNT, &i));
        res.push(AppCheckpoint {
            sync_data: data.clone(),
            round: RoundId::Randomness,
            previous: Some(RoundId::ValidateTransaction),
            round_count: RoundCount::new(i * 6),
            height: BlockHeight::new(i * 10),
        });
    }
    res
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn save_and_load() -> CheckpointResult<()> {
    let store = CheckpointStore::new_in_memory().await?;
    assert!(store.is_ephemeral());
    assert_eq!(store.load_latest().await?, None);

    let all = checkpoints(3);
    for checkpoint in &all {
        store.save(checkpoint).await?;
    }

    assert_eq!(store.load_latest().await?.as_ref(), all.last());
    assert_eq!(
        store.load(DataVersion::new(2)).await?.as_ref(),
        Some(&all[1])
    );
    assert_eq!(store.load(DataVersion::new(7)).await?, None);
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn prune_keeps_newer_versions() -> CheckpointResult<()> {
    let store = CheckpointStore::new_in_memory().await?;
    for checkpoint in &checkpoints(5) {
        store.save(checkpoint).await?;
    }

    assert_eq!(store.prune_below(DataVersion::new(4)).await?, 3);
    assert_eq!(
        store.versions().await?,
        vec![DataVersion::new(4), DataVersion::new(5)]
    );
    assert_eq!(store.prune_below(DataVersion::new(4)).await?, 0);
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn survives_reopen() -> CheckpointResult<()> {
    let dir = std::env::temp_dir().join(format!(
        "agora-checkpoint-test-{}-{}",
        std::process::id(),
        unique_suffix()
    ));
    let path = dir.join("checkpoints.redb");

    let all = checkpoints(2);
    {
        let store = CheckpointStore::open(&path).await?;
        assert!(!store.is_ephemeral());
        for checkpoint in &all {
            store.save(checkpoint).await?;
        }
    }

    let store = CheckpointStore::open(&path).await?;
    assert_eq!(store.load_latest().await?.as_ref(), all.last());

    drop(store);
    let _ = std::fs::remove_dir_all(dir);
    Ok(())
}

fn unique_suffix() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}
