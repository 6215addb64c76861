use serde::{de, Deserialize, Serialize};
use std::fmt;

/// An opaque ECDSA signature over an order's content hash.
///
/// Signature construction and verification is the marketplace SDK's job, not
/// ours: we store whatever bytes the submitter sent and pass them through to
/// downstream consumers (the relay sink, a future matching engine) untouched.
#[derive(Eq, PartialEq, Clone, Default, Hash)]
pub struct Signature(pub Vec<u8>);

impl Signature {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Signature(0x{})", hex::encode(&self.0))
    }
}

impl Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(&self.0)))
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct Visitor;
        impl<'de> de::Visitor<'de> for Visitor {
            type Value = Signature;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "a signature as a 0x-prefixed hex string")
            }

            fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                let s = s.strip_prefix("0x").ok_or_else(|| {
                    de::Error::custom(format!(
                        "{:?} can't be decoded as a hex signature because it does not start with '0x'",
                        s
                    ))
                })?;
                let bytes = hex::decode(s).map_err(|err| {
                    de::Error::custom(format!("failed to decode {:?} as hex signature: {}", s, err))
                })?;
                Ok(Signature(bytes))
            }
        }
        deserializer.deserialize_str(Visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_json() {
        let signature = Signature(vec![0xab; 65]);
        let json = serde_json::to_string(&signature).unwrap();
        let parsed: Signature = serde_json::from_str(&json).unwrap();
        assert_eq!(signature, parsed);
    }

    #[test]
    fn rejects_missing_prefix() {
        assert!(serde_json::from_str::<Signature>("\"abcd\"").is_err());
    }
}
