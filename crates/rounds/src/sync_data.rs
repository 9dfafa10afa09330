//! Versioned key-value snapshot of the agreed application state

use std::collections::BTreeMap;
use std::sync::Arc;

use agora_core::Signature;
use agora_core::bincode::STD_BINCODE_CONFIG;
use agora_core::peer::PeerPubkey;
use agora_core::peer_set::PeerSet;
use agora_core::payload::{Randomness, TxHash};
use agora_util_array_type::{array_type_fixed_size_define, array_type_fixed_size_impl_serde};
use agora_util_bincode::{decode_whole, encode_infallible};
use bincode::{Decode, Encode};
use snafu::{ResultExt as _, Snafu};

array_type_fixed_size_define! {
    /// Version of a [`SynchronizedData`] snapshot
    ///
    /// Every applied round conclusion bumps it by exactly one.
    #[derive(Encode, Decode, Clone, Copy, Hash)]
    pub struct DataVersion(u64);
}
array_type_fixed_size_impl_serde!(DataVersion);

/// Keys of the values written by the bundled rounds
pub mod keys {
    pub const PARTICIPANTS: &str = "participants";
    pub const MOST_VOTED_RANDOMNESS: &str = "most_voted_randomness";
    pub const MOST_VOTED_RANDOMNESS_ROUND: &str = "most_voted_randomness_round";
    pub const MOST_VOTED_KEEPER_ADDRESS: &str = "most_voted_keeper_address";
    pub const PARTICIPANT_TO_SIGNATURE: &str = "participant_to_signature";
    pub const FINAL_TX_HASH: &str = "final_tx_hash";
    pub const PERIOD_COUNT: &str = "period_count";
    pub const TERMINATION_MAJORITY_REACHED: &str = "termination_majority_reached";
    pub const MOST_VOTED_TX_HASH: &str = "most_voted_tx_hash";
}

#[derive(Debug, Snafu)]
pub enum SyncDataError {
    #[snafu(display("Key not found: {key}"))]
    KeyNotFound { key: String },
    #[snafu(display("Value of {key} does not decode"))]
    ValueDecode {
        key: String,
        source: bincode::error::DecodeError,
    },
}

pub type SyncDataResult<T> = Result<T, SyncDataError>;

/// Immutable snapshot of the agreed application state
///
/// Cloning is cheap, and [`SynchronizedData::update`] never touches the
/// receiver: it returns a new snapshot with the next [`DataVersion`].
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct SynchronizedData {
    version: DataVersion,
    db: Arc<BTreeMap<String, Arc<[u8]>>>,
}

impl Default for SynchronizedData {
    fn default() -> Self {
        Self::new()
    }
}

impl SynchronizedData {
    pub fn new() -> Self {
        Self {
            version: DataVersion::ZERO,
            db: Arc::new(BTreeMap::new()),
        }
    }

    pub fn version(&self) -> DataVersion {
        self.version
    }

    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.db.contains_key(key)
    }

    pub fn iter_raw(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.db.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    pub fn get_opt<T>(&self, key: &str) -> SyncDataResult<Option<T>>
    where
        T: Decode<()>,
    {
        self.db
            .get(key)
            .map(|raw| decode_whole(raw, STD_BINCODE_CONFIG))
            .transpose()
            .context(ValueDecodeSnafu { key })
    }

    pub fn get<T>(&self, key: &str) -> SyncDataResult<T>
    where
        T: Decode<()>,
    {
        self.get_opt(key)?
            .ok_or_else(|| KeyNotFoundSnafu { key }.build())
    }

    /// Like [`Self::get`], but a key that was never written reads as
    /// `default`
    pub fn get_or<T>(&self, key: &str, default: T) -> SyncDataResult<T>
    where
        T: Decode<()>,
    {
        Ok(self.get_opt(key)?.unwrap_or(default))
    }

    pub fn update(&self, update: SyncDataUpdate) -> Self {
        let mut db = BTreeMap::clone(&self.db);

        for (key, value) in update.deltas {
            match value {
                Some(value) => {
                    db.insert(key, value);
                }
                None => {
                    db.remove(&key);
                }
            }
        }

        Self {
            version: self.version.next_expect(),
            db: Arc::new(db),
        }
    }

    /// Same content, next version
    pub fn carry_over(&self) -> Self {
        Self {
            version: self.version.next_expect(),
            db: self.db.clone(),
        }
    }
}

/// Typed views of the values written by the bundled rounds
impl SynchronizedData {
    pub fn participants(&self) -> SyncDataResult<PeerSet> {
        self.get(keys::PARTICIPANTS)
    }

    pub fn most_voted_randomness(&self) -> SyncDataResult<Randomness> {
        self.get(keys::MOST_VOTED_RANDOMNESS)
    }

    pub fn most_voted_randomness_round(&self) -> SyncDataResult<u64> {
        self.get(keys::MOST_VOTED_RANDOMNESS_ROUND)
    }

    pub fn most_voted_keeper_address(&self) -> SyncDataResult<PeerPubkey> {
        self.get(keys::MOST_VOTED_KEEPER_ADDRESS)
    }

    /// `None` before the first keeper was ever selected
    pub fn previous_keeper_address(&self) -> SyncDataResult<Option<PeerPubkey>> {
        self.get_opt(keys::MOST_VOTED_KEEPER_ADDRESS)
    }

    pub fn participant_to_signature(&self) -> SyncDataResult<BTreeMap<PeerPubkey, Signature>> {
        self.get(keys::PARTICIPANT_TO_SIGNATURE)
    }

    pub fn final_tx_hash(&self) -> SyncDataResult<TxHash> {
        self.get(keys::FINAL_TX_HASH)
    }

    pub fn period_count(&self) -> SyncDataResult<u64> {
        self.get_or(keys::PERIOD_COUNT, 0)
    }

    pub fn termination_majority_reached(&self) -> SyncDataResult<bool> {
        self.get_or(keys::TERMINATION_MAJORITY_REACHED, false)
    }

    pub fn most_voted_tx_hash(&self) -> SyncDataResult<TxHash> {
        self.get(keys::MOST_VOTED_TX_HASH)
    }
}

/// Set of changes to apply with [`SynchronizedData::update`]
#[derive(Debug, Default)]
pub struct SyncDataUpdate {
    deltas: Vec<(String, Option<Arc<[u8]>>)>,
}

impl SyncDataUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T>(mut self, key: &str, value: &T) -> Self
    where
        T: Encode,
    {
        self.deltas.push((
            key.to_owned(),
            Some(encode_infallible(value, STD_BINCODE_CONFIG).into()),
        ));
        self
    }

    pub fn remove(mut self, key: &str) -> Self {
        self.deltas.push((key.to_owned(), None));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }
}

/// Published snapshots, addressable by version
#[derive(Debug, Clone)]
pub struct SyncDataHistory {
    snapshots: BTreeMap<DataVersion, SynchronizedData>,
    max_len: usize,
}

impl SyncDataHistory {
    pub fn new(initial: SynchronizedData, max_len: usize) -> Self {
        let mut slf = Self {
            snapshots: BTreeMap::new(),
            max_len: max_len.max(1),
        };
        slf.push(initial);
        slf
    }

    pub fn push(&mut self, snapshot: SynchronizedData) {
        self.snapshots.insert(snapshot.version(), snapshot);

        while self.max_len < self.snapshots.len() {
            self.snapshots.pop_first();
        }
    }

    pub fn get(&self, version: DataVersion) -> Option<&SynchronizedData> {
        self.snapshots.get(&version)
    }

    pub fn latest(&self) -> Option<&SynchronizedData> {
        self.snapshots.last_key_value().map(|(_, v)| v)
    }

    pub fn versions(&self) -> impl Iterator<Item = DataVersion> + '_ {
        self.snapshots.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
