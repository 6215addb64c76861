use primitive_types::H160;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// An EVM address: a maker, a token contract, a fee recipient, a proxy.
#[derive(Eq, PartialEq, Ord, PartialOrd, Clone, Copy, Default, Hash)]
pub struct Address(pub H160);

impl Address {
    pub fn zero() -> Self {
        Address(H160::zero())
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl From<H160> for Address {
    fn from(value: H160) -> Self {
        Address(value)
    }
}

impl From<Address> for H160 {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut bytes = [0u8; 2 + 20 * 2];
        bytes[..2].copy_from_slice(b"0x");
        hex::encode_to_slice(self.0.as_bytes(), &mut bytes[2..]).unwrap();
        write!(f, "{}", std::str::from_utf8(&bytes).unwrap())
    }
}

impl FromStr for Address {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let mut value = H160::zero();
        hex::decode_to_slice(s, value.as_bytes_mut())?;
        Ok(Address(value))
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct Visitor;
        impl<'de> de::Visitor<'de> for Visitor {
            type Value = Address;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "an address as a 0x-prefixed hex string")
            }

            fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Address::from_str(s)
                    .map_err(|err| de::Error::custom(format!("bad address {:?}: {}", s, err)))
            }
        }
        deserializer.deserialize_str(Visitor)
    }
}
