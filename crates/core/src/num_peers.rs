use core::fmt;

use bincode::{Decode, Encode};
use derive_more::From;

#[derive(Debug, Clone, Copy, From, PartialEq, Eq, PartialOrd, Ord, Encode, Decode)]
pub struct NumPeers(u8);

impl fmt::Display for NumPeers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl NumPeers {
    /// Largest peer set a [`NumPeers`] can describe
    pub const MAX: usize = u8::MAX as usize;

    /// Total number of peers
    pub fn total(self) -> usize {
        self.0.into()
    }

    /// Max number of faulty peers
    pub fn max_faulty(self) -> usize {
        self.total().saturating_sub(1) / 3
    }

    /// Number of identical submissions needed to conclude a round
    ///
    /// Always more than two thirds of [`Self::total`].
    pub fn threshold(self) -> usize {
        self.total() - self.max_faulty()
    }
}

pub trait ToNumPeers {
    /// `None` if there are more than [`NumPeers::MAX`] peers
    fn try_to_num_peers(&self) -> Option<NumPeers>;
}

impl<T> ToNumPeers for [T] {
    fn try_to_num_peers(&self) -> Option<NumPeers> {
        u8::try_from(self.len()).ok().map(NumPeers::from)
    }
}

#[test]
fn num_peers_sanity() {
    use convi::CastFrom;
    for (n, f, t) in [(1, 0, 1), (2, 0, 2), (3, 0, 3), (4, 1, 3), (7, 2, 5), (10, 3, 7)] {
        let num = NumPeers::from(n);
        assert_eq!(usize::cast_from(n), num.total());
        assert_eq!(f, num.max_faulty());
        assert_eq!(t, num.threshold());
        // two thresholds always overlap in at least one peer
        assert!(num.total() < 2 * num.threshold());
    }
}

#[test]
fn num_peers_rejects_oversized_slices() {
    assert_eq!(
        vec![(); NumPeers::MAX].try_to_num_peers(),
        Some(NumPeers::from(u8::MAX))
    );
    assert_eq!(vec![(); NumPeers::MAX + 1].try_to_num_peers(), None);
}
