// SPDX-License-Identifier: MIT

//! Macros for byte-array and fixed-size number newtypes
//!
//! Numbers are stored big-endian, so the bincode encoding of e.g. a version
//! or a block height sorts the same way the number does. This matters for
//! database keys.

pub use {data_encoding, serde, serde_bytes};

#[macro_export]
macro_rules! array_type_define {
    (
        $(#[$outer:meta])*
        $v:vis struct $name:tt[$n:expr];
    ) => {

        $(#[$outer])*
        #[derive(PartialOrd, Ord, PartialEq, Eq)]
        $v struct $name([u8; $n]);

        impl $name {

            pub const LEN: usize = $n;
            pub const ZERO: Self = Self([0u8; $n]);
            pub const MIN: Self = Self([0u8; $n]);
            pub const MAX: Self = Self([0xffu8; $n]);

            pub fn as_slice(&self) -> &[u8] {
                self.0.as_slice()
            }

            pub const fn from_bytes(bytes: [u8; $n]) -> Self {
                Self(bytes)
            }

            pub const fn to_bytes(self) -> [u8; $n] {
                self.0
            }
        }
    }
}

#[macro_export]
macro_rules! array_type_impl_zero_default {
    ($name:tt) => {
        impl Default for $name {
            fn default() -> Self {
                Self([0; Self::LEN])
            }
        }
    };
}

#[macro_export]
macro_rules! array_type_impl_debug_as_display {
    ($name:tt) => {
        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                <Self as std::fmt::Display>::fmt(self, f)
            }
        }
    };
}

/// Lowercase hex `Display` and `FromStr`
#[macro_export]
macro_rules! array_type_impl_hex_str {
    (
        $name:tt
    ) => {
        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                $crate::data_encoding::HEXLOWER.encode_write(self.as_slice(), f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::data_encoding::DecodeError;

            fn from_str(s: &str) -> Result<$name, Self::Err> {
                let v = $crate::data_encoding::HEXLOWER_PERMISSIVE
                    .decode(s.trim_start_matches("0x").as_bytes())?;
                let a = v
                    .try_into()
                    .map_err(|_| $crate::data_encoding::DecodeError {
                        position: 0,
                        kind: $crate::data_encoding::DecodeKind::Length,
                    })?;
                Ok(Self(a))
            }
        }
    };
}

/// Hex string in human-readable formats, raw bytes otherwise
#[macro_export]
macro_rules! array_type_impl_serde {
    (
        $name:tt
    ) => {
        impl $crate::serde::Serialize for $name {
            fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
            where
                S: $crate::serde::Serializer,
            {
                if s.is_human_readable() {
                    s.serialize_str(&self.to_string())
                } else {
                    s.serialize_bytes(&self.0)
                }
            }
        }

        impl<'de> $crate::serde::de::Deserialize<'de> for $name {
            fn deserialize<D>(d: D) -> Result<Self, D::Error>
            where
                D: $crate::serde::Deserializer<'de>,
            {
                if d.is_human_readable() {
                    let str = <String as $crate::serde::Deserialize>::deserialize(d)?;
                    <Self as std::str::FromStr>::from_str(&str).map_err(|e| {
                        <D::Error as $crate::serde::de::Error>::custom(format!(
                            "Deserialization error: {e:#}"
                        ))
                    })
                } else {
                    let bytes =
                        <$crate::serde_bytes::ByteArray<{ $name::LEN }> as $crate::serde::Deserialize>::deserialize(d)?;
                    Ok(Self(bytes.into_array()))
                }
            }
        }
    };
}

#[macro_export]
macro_rules! array_type_fixed_size_define {
    (
        $(#[$outer:meta])*
        $v:vis struct $name:ident($t:ty);
    ) => {

        $crate::array_type_define! {
            $(#[$outer])*
            $v struct $name[std::mem::size_of::<$t>()];
        }
        $crate::array_type_impl_debug_as_display!($name);
        $crate::array_type_impl_zero_default!($name);

        impl $name {
            pub const fn new(t: $t) -> Self {
                Self(t.to_be_bytes())
            }

            pub const fn to_number(self) -> $t {
                <$t>::from_be_bytes(self.0)
            }
        }

        impl From<$t> for $name {
            fn from(value: $t) -> Self {
                Self(value.to_be_bytes())
            }
        }

        impl From<$name> for $t {
            fn from(value: $name) -> Self {
                <$t>::from_be_bytes(value.0)
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_fmt(format_args!("{}", <$t>::from(*self)))
            }
        }

        impl $name {
            pub fn next(self) -> Option<Self> {
                <$t>::from(self).checked_add(1).map(Self::from)
            }

            pub fn next_expect(self) -> Self {
                self.next().expect("Can't run out of numbers")
            }

            pub fn prev(self) -> Option<Self> {
                <$t>::from(self).checked_sub(1).map(Self::from)
            }

            pub fn checked_add(self, rhs: $t) -> Option<Self> {
                <$t>::from(self).checked_add(rhs).map(Self::from)
            }

            pub fn saturating_sub(self, rhs: Self) -> $t {
                <$t>::from(self).saturating_sub(<$t>::from(rhs))
            }
        }
    };
}

#[macro_export]
macro_rules! array_type_fixed_size_impl_serde {
    (
        $name:tt
    ) => {
        impl $crate::serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: $crate::serde::Serializer,
            {
                $crate::serde::Serialize::serialize(&self.to_number(), serializer)
            }
        }

        impl<'de> $crate::serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: $crate::serde::Deserializer<'de>,
            {
                Ok(Self::new($crate::serde::Deserialize::deserialize(
                    deserializer,
                )?))
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    array_type_define! {
        #[derive(Clone, Copy)]
        pub struct Demo[4];
    }
    array_type_impl_hex_str!(Demo);
    array_type_impl_debug_as_display!(Demo);

    array_type_fixed_size_define! {
        #[derive(Clone, Copy)]
        pub struct Seq(u64);
    }

    #[test]
    fn hex_roundtrip_accepts_prefix() {
        let v = Demo::from_bytes([0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(v.to_string(), "deadbeef");
        assert_eq!(Demo::from_str("0xDEADBEEF").ok(), Some(v));
        assert!(Demo::from_str("dead").is_err());
    }

    #[test]
    fn fixed_size_orders_like_number() {
        assert!(Seq::new(1) < Seq::new(256));
        assert_eq!(Seq::new(41).next_expect(), Seq::new(42));
        assert_eq!(Seq::ZERO.prev(), None);
    }
}
