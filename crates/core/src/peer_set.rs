
use std::ops;

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::num_peers::{NumPeers, ToNumPeers};
use crate::peer::PeerPubkey;

/// Sorted set of peers
///
/// Kept as a sorted `Vec` so the encoding (and everything hashed over it) is
/// the same on every peer.
#[derive(Debug, Clone, Encode, Decode, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSet(Vec<PeerPubkey>);

impl ops::Deref for PeerSet {
    type Target = [PeerPubkey];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PeerSet {
    pub fn new() -> Self {
        Self(vec![])
    }

    pub fn as_slice(&self) -> &[PeerPubkey] {
        &self.0
    }

    pub fn contains(&self, peer_pubkey: &PeerPubkey) -> bool {
        self.0.binary_search(peer_pubkey).is_ok()
    }

    pub fn insert(&mut self, peer_pubkey: PeerPubkey) -> bool {
        if self.contains(&peer_pubkey) {
            return false;
        }
        self.0.push(peer_pubkey);
        self.0.sort_unstable();
        true
    }

    pub fn remove(&mut self, peer_pubkey: PeerPubkey) -> bool {
        if let Ok(index) = self.0.binary_search(&peer_pubkey) {
            self.0.remove(index);
            true
        } else {
            false
        }
    }

    /// Number of agreeing peers required out of this set
    ///
    /// `None` if the set is larger than [`NumPeers::MAX`].
    pub fn threshold(&self) -> Option<usize> {
        self.try_to_num_peers().map(NumPeers::threshold)
    }
}

impl ToNumPeers for PeerSet {
    fn try_to_num_peers(&self) -> Option<NumPeers> {
        self.0.try_to_num_peers()
    }
}

impl FromIterator<PeerPubkey> for PeerSet {
    fn from_iter<T: IntoIterator<Item = PeerPubkey>>(iter: T) -> Self {
        let mut items = Vec::from_iter(iter);
        items.sort_unstable();
        items.dedup();
        Self(items)
    }
}

impl IntoIterator for PeerSet {
    type Item = PeerPubkey;

    type IntoIter = <Vec<PeerPubkey> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a PeerSet {
    type Item = &'a PeerPubkey;

    type IntoIter = <&'a [PeerPubkey] as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.0.as_slice().iter()
    }
}
