// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::ParseError;

/// Amount of base tokens held by an output.
pub type BaseToken = u64;

/// Amount of mana, the resource burned to issue blocks.
pub type Mana = u64;

pub type SlotIndex = u32;

pub const HASH_LENGTH: usize = 32;

/// Hash the given bytes into a 32 byte digest.
pub fn digest(bytes: &[u8]) -> [u8; HASH_LENGTH] {
    Sha256::digest(bytes).into()
}

/// Hash the bcs encoding of a value.
pub fn bcs_digest<T: Serialize>(value: &T) -> [u8; HASH_LENGTH] {
    // bcs only fails on unsupported serde constructs, none of which appear in ledger types.
    let bytes = bcs::to_bytes(value).unwrap_or_default();
    digest(&bytes)
}

pub(crate) fn decode_hex<const N: usize>(s: &str) -> Result<[u8; N], ParseError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).map_err(|e| ParseError::Hex(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| ParseError::Length {
            expected: N,
            actual: b.len(),
        })
}

macro_rules! fixed_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; $len]);

        impl $name {
            pub const LENGTH: usize = $len;

            pub const fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub const fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                format!("0x{}", ::hex::encode(self.0))
            }

            pub fn random() -> Self {
                let mut bytes = [0u8; $len];
                ::rand::RngCore::fill_bytes(&mut ::rand::thread_rng(), &mut bytes);
                Self(bytes)
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::error::ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $crate::base_types::decode_hex::<$len>(s).map(Self)
            }
        }

        impl ::serde::Serialize for $name {
            fn serialize<S: ::serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                if serializer.is_human_readable() {
                    serializer.serialize_str(&self.to_hex())
                } else {
                    serializer.serialize_bytes(&self.0)
                }
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $name {
            fn deserialize<D: ::serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                use ::serde::de::Error as _;
                if deserializer.is_human_readable() {
                    let s = <String as ::serde::Deserialize>::deserialize(deserializer)?;
                    s.parse().map_err(D::Error::custom)
                } else {
                    let bytes = <Vec<u8> as ::serde::Deserialize>::deserialize(deserializer)?;
                    let bytes: [u8; $len] = bytes.try_into().map_err(|_| {
                        D::Error::custom(concat!("invalid ", stringify!($name), " length"))
                    })?;
                    Ok(Self(bytes))
                }
            }
        }
    };
}

pub(crate) use fixed_bytes;

fixed_bytes!(
    /// Ed25519 address: the hash of the public key that unlocks it.
    Address,
    32
);
fixed_bytes!(
    /// Identifier of an account, the entity blocks are issued and mana is allotted to.
    AccountId,
    32
);
fixed_bytes!(TransactionId, 32);
fixed_bytes!(BlockId, 32);

impl TransactionId {
    pub const EMPTY: TransactionId = TransactionId([0u8; 32]);
}

/// Identifies an output by the transaction that created it and its position in that
/// transaction's output list.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputId {
    transaction_id: TransactionId,
    index: u16,
}

impl OutputId {
    pub const LENGTH: usize = TransactionId::LENGTH + 2;

    pub fn new(transaction_id: TransactionId, index: u16) -> Self {
        Self {
            transaction_id,
            index,
        }
    }

    pub fn transaction_id(&self) -> &TransactionId {
        &self.transaction_id
    }

    pub fn index(&self) -> u16 {
        self.index
    }

    pub fn to_hex(&self) -> String {
        format!(
            "{}{}",
            self.transaction_id.to_hex(),
            hex::encode(self.index.to_le_bytes())
        )
    }
}

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutputId({})", self.to_hex())
    }
}

impl FromStr for OutputId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = decode_hex::<{ OutputId::LENGTH }>(s)?;
        let mut tx = [0u8; 32];
        tx.copy_from_slice(&bytes[..32]);
        let index = u16::from_le_bytes([bytes[32], bytes[33]]);
        Ok(Self::new(TransactionId::new(tx), index))
    }
}

impl Serialize for OutputId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            (self.transaction_id, self.index).serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for OutputId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(D::Error::custom)
        } else {
            let (transaction_id, index) = <(TransactionId, u16)>::deserialize(deserializer)?;
            Ok(Self::new(transaction_id, index))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_id_hex_layout() {
        let tx = TransactionId::new([7u8; 32]);
        let id = OutputId::new(tx, 258);
        let hex = id.to_hex();
        // 0x + 32 bytes of transaction id + little endian index
        assert_eq!(hex.len(), 2 + 2 * OutputId::LENGTH);
        assert!(hex.ends_with("0201"));
        assert_eq!(hex.parse::<OutputId>().unwrap(), id);
    }

    #[test]
    fn address_rejects_wrong_length() {
        let err = "0xabcd".parse::<Address>().unwrap_err();
        assert_eq!(
            err,
            ParseError::Length {
                expected: 32,
                actual: 2
            }
        );
    }

    #[test]
    fn ids_serialize_as_hex_in_json() {
        let id = BlockId::new([1u8; 32]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.to_hex()));
        let back: BlockId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
