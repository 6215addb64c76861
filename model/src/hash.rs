use primitive_types::H256;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A 32-byte content hash: an order hash, a block hash, a transaction hash,
/// a Merkle root.
#[derive(Eq, PartialEq, Ord, PartialOrd, Clone, Copy, Default, Hash)]
pub struct Hash32(pub H256);

impl Hash32 {
    pub fn zero() -> Self {
        Hash32(H256::zero())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Hash32(H256(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl From<H256> for Hash32 {
    fn from(value: H256) -> Self {
        Hash32(value)
    }
}

impl From<Hash32> for H256 {
    fn from(value: Hash32) -> Self {
        value.0
    }
}

impl fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut bytes = [0u8; 2 + 32 * 2];
        bytes[..2].copy_from_slice(b"0x");
        hex::encode_to_slice(self.0.as_bytes(), &mut bytes[2..]).unwrap();
        write!(f, "{}", std::str::from_utf8(&bytes).unwrap())
    }
}

impl FromStr for Hash32 {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let mut value = H256::zero();
        hex::decode_to_slice(s, value.as_bytes_mut())?;
        Ok(Hash32(value))
    }
}

impl Serialize for Hash32 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Hash32 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct Visitor;
        impl<'de> de::Visitor<'de> for Visitor {
            type Value = Hash32;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "a 32 byte hash as a 0x-prefixed hex string")
            }

            fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Hash32::from_str(s)
                    .map_err(|err| de::Error::custom(format!("bad hash {:?}: {}", s, err)))
            }
        }
        deserializer.deserialize_str(Visitor)
    }
}
