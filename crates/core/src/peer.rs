use core::fmt;

use agora_util_array_type::{
    array_type_define, array_type_impl_debug_as_display, array_type_impl_hex_str,
    array_type_impl_serde, array_type_impl_zero_default,
};
use bincode::{Decode, Encode};
use snafu::Snafu;

array_type_define! {
    /// Identity of a peer (agent) taking part in the service
    #[derive(Encode, Decode, Clone, Copy, Hash)]
    pub struct PeerPubkey[32];
}

impl PeerPubkey {
    pub fn to_short(self) -> PeerPubkeyShort {
        PeerPubkeyShort(self)
    }
}

/// Abbreviated [`PeerPubkey`] for log lines
pub struct PeerPubkeyShort(PeerPubkey);

impl fmt::Display for PeerPubkeyShort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "{}…{}",
            data_encoding::HEXLOWER.encode_display(&self.0.as_slice()[0..3]),
            data_encoding::HEXLOWER.encode_display(&self.0.as_slice()[29..32])
        ))
    }
}

array_type_impl_zero_default!(PeerPubkey);
array_type_impl_hex_str!(PeerPubkey);
array_type_impl_serde!(PeerPubkey);
array_type_impl_debug_as_display!(PeerPubkey);

#[derive(Debug, Snafu)]
pub struct InvalidPubkeyError;

impl TryFrom<PeerPubkey> for ed25519_dalek::VerifyingKey {
    type Error = InvalidPubkeyError;

    fn try_from(value: PeerPubkey) -> Result<Self, Self::Error> {
        ed25519_dalek::VerifyingKey::from_bytes(&value.0).map_err(|_| InvalidPubkeyError)
    }
}

array_type_define! {
    #[derive(Clone, Copy)]
    pub struct PeerSeckey[32];
}

impl PeerSeckey {
    pub fn generate() -> Self {
        Self(ed25519_dalek::SigningKey::generate(&mut rand::thread_rng()).to_bytes())
    }

    pub fn pubkey(self) -> PeerPubkey {
        PeerPubkey(
            ed25519_dalek::SigningKey::from(self)
                .verifying_key()
                .to_bytes(),
        )
    }
}

impl From<PeerSeckey> for ed25519_dalek::SigningKey {
    fn from(value: PeerSeckey) -> Self {
        ed25519_dalek::SigningKey::from_bytes(&value.0)
    }
}

array_type_impl_hex_str!(PeerSeckey);

impl fmt::Debug for PeerSeckey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PeerSeckey(…)")
    }
}
