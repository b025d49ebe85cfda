//! Strong types for fixed-size byte arrays
//!
//! Identifiers in SyncSpace are content hashes or Ed25519 public keys. Raw
//! `[u8; N]` arrays are easy to mix up, so each gets a semantic newtype with
//! hex formatting and hex-string serde (sidecar files are JSON).

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

macro_rules! byte_type {
    ($name:ident, $len:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            /// Inner bytes as a fixed-size reference.
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Lowercase hex rendering, the canonical string form of an id.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Parse from the canonical hex string form.
            pub fn from_hex(s: &str) -> Result<Self, HexParseError> {
                let bytes = hex::decode(s).map_err(|_| HexParseError::NotHex)?;
                let arr: [u8; $len] = bytes
                    .try_into()
                    .map_err(|_| HexParseError::BadLength { expected: $len })?;
                Ok(Self(arr))
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

        impl TryFrom<&[u8]> for $name {
            type Error = std::array::TryFromSliceError;
            fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
                Ok(Self(<[u8; $len]>::try_from(slice)?))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                for byte in &self.0 {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_hex(&s).map_err(D::Error::custom)
            }
        }
    };
}

/// Error from parsing a hex identifier string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HexParseError {
    #[error("not a hex string")]
    NotHex,

    #[error("wrong length, expected {expected} bytes")]
    BadLength { expected: usize },
}

byte_type!(Hash, 32, "32-byte BLAKE3 content hash");
byte_type!(PubKey, 32, "32-byte Ed25519 public key");
byte_type!(Signature, 64, "64-byte Ed25519 signature");

impl Hash {
    pub const ZERO: Hash = Hash([0u8; 32]);
}

/// Space identifier: hash of the signed space-create payload.
pub type SpaceId = Hash;

/// Change identifier: hash of the canonical change encoding.
pub type ChangeId = Hash;

/// Document identifier: the id of the document's root change.
pub type DocumentId = Hash;
