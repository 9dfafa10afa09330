use agora_util_array_type::{
    array_type_define, array_type_fixed_size_define, array_type_fixed_size_impl_serde,
    array_type_impl_debug_as_display, array_type_impl_hex_str, array_type_impl_serde,
    array_type_impl_zero_default,
};
use bincode::{Decode, Encode};

use crate::payload::PayloadRaw;
use crate::signed::{Hashable, Signed};

array_type_fixed_size_define! {
    /// Height of a committed block
    ///
    /// Acts as the logical clock of the whole service. The first block has
    /// height 1, so [`BlockHeight::ZERO`] means "nothing committed yet".
    #[derive(Encode, Decode, Clone, Copy, Hash)]
    pub struct BlockHeight(u64);
}
array_type_fixed_size_impl_serde!(BlockHeight);

array_type_define! {
    #[derive(Encode, Decode, Copy, Clone, Hash)]
    pub struct BlockHash[32];
}
array_type_impl_zero_default!(BlockHash);
array_type_impl_hex_str!(BlockHash);
array_type_impl_serde!(BlockHash);
array_type_impl_debug_as_display!(BlockHash);

impl From<blake3::Hash> for BlockHash {
    fn from(value: blake3::Hash) -> Self {
        Self(*value.as_bytes())
    }
}

/// Totally ordered batch of payloads, identical on every peer
#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct Block {
    pub height: BlockHeight,
    pub prev_hash: BlockHash,
    pub payloads: Vec<Signed<PayloadRaw>>,
}

impl Hashable for Block {}

impl Block {
    pub fn block_hash(&self) -> BlockHash {
        self.hash().into()
    }

    /// Build the block following `prev` (or the first one if `None`)
    pub fn new_next(prev: Option<&Block>, payloads: Vec<Signed<PayloadRaw>>) -> Self {
        match prev {
            Some(prev) => Self {
                height: prev.height.next_expect(),
                prev_hash: prev.block_hash(),
                payloads,
            },
            None => Self {
                height: BlockHeight::new(1),
                prev_hash: BlockHash::ZERO,
                payloads,
            },
        }
    }
}

#[test]
fn block_chain_sanity() {
    let first = Block::new_next(None, vec![]);
    let second = Block::new_next(Some(&first), vec![]);

    assert_eq!(first.height, BlockHeight::new(1));
    assert_eq!(second.height, BlockHeight::new(2));
    assert_eq!(second.prev_hash, first.block_hash());
    assert_ne!(first.block_hash(), second.block_hash());
}
