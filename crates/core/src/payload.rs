//! Payloads: typed, signed proposals peers submit into a round

use std::fmt;
use std::sync::Arc;

use agora_util_array_type::{
    array_type_define, array_type_fixed_size_define, array_type_fixed_size_impl_serde,
    array_type_impl_debug_as_display, array_type_impl_hex_str, array_type_impl_serde,
    array_type_impl_zero_default,
};
use agora_util_bincode::{decode_whole, encode_infallible};
use bincode::{Decode, Encode};
use serde::Serialize;
use snafu::{ResultExt as _, Snafu};

use crate::Signature;
use crate::bincode::STD_BINCODE_CONFIG;
use crate::peer::{PeerPubkey, PeerSeckey};
use crate::signed::{Hashable, InvalidSignatureError, Signable, Signed};

array_type_fixed_size_define! {
    /// Number of round transitions since the application started
    ///
    /// Every payload carries the count it was produced for, so late payloads
    /// can't leak into a later instance of the same round kind.
    #[derive(Encode, Decode, Clone, Copy, Hash)]
    pub struct RoundCount(u64);
}
array_type_fixed_size_impl_serde!(RoundCount);

array_type_define! {
    /// Hash of a transaction on the external chain
    #[derive(Encode, Decode, Clone, Copy, Hash)]
    pub struct TxHash[32];
}
array_type_impl_zero_default!(TxHash);
array_type_impl_hex_str!(TxHash);
array_type_impl_serde!(TxHash);
array_type_impl_debug_as_display!(TxHash);

impl From<blake3::Hash> for TxHash {
    fn from(value: blake3::Hash) -> Self {
        Self(*value.as_bytes())
    }
}

array_type_define! {
    /// Value returned by a randomness beacon
    #[derive(Encode, Decode, Clone, Copy, Hash)]
    pub struct Randomness[32];
}
array_type_impl_zero_default!(Randomness);
array_type_impl_hex_str!(Randomness);
array_type_impl_serde!(Randomness);
array_type_impl_debug_as_display!(Randomness);

array_type_define! {
    /// Hash of the semantic content of a payload
    ///
    /// Two payloads with same [`Fingerprint`] vote for the same value,
    /// regardless of who sent them.
    #[derive(Encode, Decode, Clone, Copy, Hash)]
    pub struct Fingerprint[32];
}
array_type_impl_hex_str!(Fingerprint);
array_type_impl_debug_as_display!(Fingerprint);

impl From<blake3::Hash> for Fingerprint {
    fn from(value: blake3::Hash) -> Self {
        Self(*value.as_bytes())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode, Serialize)]
pub enum TransactionType {
    Registration,
    Randomness,
    SelectKeeper,
    Signature,
    Finalization,
    Validate,
    Termination,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransactionType::Registration => "registration",
            TransactionType::Randomness => "randomness",
            TransactionType::SelectKeeper => "select_keeper",
            TransactionType::Signature => "signature",
            TransactionType::Finalization => "finalization",
            TransactionType::Validate => "validate",
            TransactionType::Termination => "termination",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum PayloadData {
    Registration,
    Randomness {
        /// Beacon round the value was observed at
        round: u64,
        randomness: Randomness,
    },
    SelectKeeper {
        keeper: PeerPubkey,
    },
    Signature {
        signature: Signature,
    },
    Finalization {
        /// `None` if the keeper failed to send the transaction
        tx_hash: Option<TxHash>,
    },
    Validate {
        /// `None` if the receipt could not be obtained
        is_correct: Option<bool>,
    },
    Termination {
        termination_tx: TxHash,
    },
}

impl PayloadData {
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            PayloadData::Registration => TransactionType::Registration,
            PayloadData::Randomness { .. } => TransactionType::Randomness,
            PayloadData::SelectKeeper { .. } => TransactionType::SelectKeeper,
            PayloadData::Signature { .. } => TransactionType::Signature,
            PayloadData::Finalization { .. } => TransactionType::Finalization,
            PayloadData::Validate { .. } => TransactionType::Validate,
            PayloadData::Termination { .. } => TransactionType::Termination,
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.hash().into()
    }
}

impl Hashable for PayloadData {}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Payload {
    pub sender: PeerPubkey,
    pub round_count: RoundCount,
    pub data: PayloadData,
}

impl Payload {
    pub fn transaction_type(&self) -> TransactionType {
        self.data.transaction_type()
    }

    /// See [`Fingerprint`]
    pub fn fingerprint(&self) -> Fingerprint {
        self.data.fingerprint()
    }

    pub fn encode_to_raw(&self) -> PayloadRaw {
        PayloadRaw(encode_infallible(self, STD_BINCODE_CONFIG).into())
    }

    pub fn sign(&self, seckey: PeerSeckey) -> Signed<PayloadRaw> {
        Signed::new_sign(self.encode_to_raw(), seckey)
    }
}

/// Encoded [`Payload`] as it travels through the consensus gateway
///
/// Kept opaque until a round looks at it, so a malformed payload from a
/// faulty peer is only rejected, never breaks decoding of a whole block.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct PayloadRaw(Arc<[u8]>);

impl PayloadRaw {
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn decode_payload(&self) -> Result<Payload, bincode::error::DecodeError> {
        decode_whole(&self.0, STD_BINCODE_CONFIG)
    }
}

impl From<Vec<u8>> for PayloadRaw {
    fn from(value: Vec<u8>) -> Self {
        Self(value.into())
    }
}

impl Hashable for PayloadRaw {}
impl Signable for PayloadRaw {
    const TAG: [u8; 4] = *b"pyld";
}

#[derive(Debug, Snafu)]
pub enum PayloadOpenError {
    #[snafu(display("Payload does not decode"))]
    Decode { source: bincode::error::DecodeError },
    #[snafu(display("Payload not signed by its sender"))]
    Signature { source: InvalidSignatureError },
}

impl Signed<PayloadRaw> {
    /// Decode the payload and check it was signed by the sender it names
    pub fn open(&self) -> Result<Payload, PayloadOpenError> {
        let payload = self.inner.decode_payload().context(DecodeSnafu)?;
        self.verify_sig_peer_pubkey(payload.sender)
            .context(SignatureSnafu)?;
        Ok(payload)
    }
}
