// SPDX-License-Identifier: MIT

//! Core types shared by every agora peer
//!
//! Identities, signing, the payload model and the shape of committed blocks.
//! Everything here has a canonical bincode encoding, since peers compare
//! hashes of it.
use ::bincode::{Decode, Encode};
use agora_util_array_type::{
    array_type_define, array_type_impl_debug_as_display, array_type_impl_hex_str,
    array_type_impl_serde, array_type_impl_zero_default,
};

pub mod bincode;
pub mod block;
pub mod num_peers;
pub mod payload;
pub mod peer;
pub mod peer_set;
pub mod signed;

array_type_define! {
    #[derive(Encode, Decode, Copy, Clone, Hash)]
    pub struct Signature[64];
}
array_type_impl_zero_default!(Signature);
array_type_impl_hex_str!(Signature);
array_type_impl_serde!(Signature);
array_type_impl_debug_as_display!(Signature);

impl From<Signature> for ed25519_dalek::Signature {
    fn from(value: Signature) -> Self {
        ed25519_dalek::Signature::from_bytes(&value.0)
    }
}
impl From<ed25519_dalek::Signature> for Signature {
    fn from(value: ed25519_dalek::Signature) -> Self {
        Self(value.to_bytes())
    }
}
