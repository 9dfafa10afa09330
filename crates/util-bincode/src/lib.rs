// SPDX-License-Identifier: MIT

pub use bincode;
use bincode::config::Config;
use bincode::{de, enc, error};

/// Decode `D` from `src`, failing if any bytes are left over
///
/// Everything agreed on by peers is decoded with this, so two different
/// byte strings never decode into the same value.
pub fn decode_whole<D: de::Decode<()>, C: Config>(
    src: &[u8],
    config: C,
) -> Result<D, error::DecodeError> {
    let (t, consumed) = bincode::decode_from_slice(src, config)?;

    if consumed != src.len() {
        return Err(error::DecodeError::Other("leftover bytes"));
    }

    Ok(t)
}

/// Encode a value that is known to always be encodable
pub fn encode_infallible<E: enc::Encode, C: Config>(value: &E, config: C) -> Vec<u8> {
    bincode::encode_to_vec(value, config).expect("Encoding to a Vec can't fail")
}

#[test]
fn decode_whole_rejects_leftover() {
    let config = bincode::config::standard();
    let mut bytes = encode_infallible(&7u32, config);
    assert_eq!(decode_whole::<u32, _>(&bytes, config).ok(), Some(7));
    bytes.push(0);
    assert!(decode_whole::<u32, _>(&bytes, config).is_err());
}
