use crate::StoreError;
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashSet;

/// A value the block-item store can persist: it carries a type tag that
/// survives serialization so a reader can tell what it deserialized before
/// trying to decode it (§4.1 "Serialization").
pub trait Tagged: Serialize + DeserializeOwned {
    const TAG: &'static str;
}

/// Every persisted value is wrapped in this envelope; `tag` is checked
/// against the registry before `payload` is ever handed to a concrete
/// deserializer (§4.1, §9 "Serialization of tagged records").
#[derive(Serialize, Deserialize)]
struct Envelope {
    tag: String,
    payload: Vec<u8>,
}

/// Maps known type tags to "yes, something registered this tag". A tag
/// becomes known the moment a [`Tagged`] value carrying it is first written
/// through [`crate::Batch::put`]; reading back a tag that was never written
/// that way - for example a hand-crafted record from a deserializer that was
/// never wired up - is a fatal deserialization error (§4.1, §9).
#[derive(Debug)]
pub struct TagRegistry {
    known: RwLock<HashSet<String>>,
}

impl TagRegistry {
    /// The registry every [`crate::BlockItemStore`] starts with: just the
    /// built-in [`BigInt`] tag (§9 "Default registry includes a big-integer
    /// tag"). Every other tag is learned as components write their own
    /// [`Tagged`] types.
    pub fn default_registry() -> Self {
        let mut known = HashSet::new();
        known.insert(BigInt::TAG.to_string());
        Self { known: RwLock::new(known) }
    }

    pub fn register(&self, tag: &str) {
        self.known.write().insert(tag.to_string());
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.known.read().contains(tag)
    }
}

impl Default for TagRegistry {
    fn default() -> Self {
        Self::default_registry()
    }
}

/// Wraps `value` in an [`Envelope`] under `tag`, without requiring `tag` to
/// match any [`Tagged`] impl - used internally by tests that want to exercise
/// the unknown-tag failure path, and by [`encode`] for real values.
pub fn encode_raw<T: Serialize>(tag: &str, value: &T) -> Result<Vec<u8>, StoreError> {
    let payload = postcard::to_allocvec(value)?;
    let envelope = Envelope { tag: tag.to_string(), payload };
    Ok(postcard::to_allocvec(&envelope)?)
}

pub(crate) fn encode<T: Tagged>(value: &T) -> Result<Vec<u8>, StoreError> {
    encode_raw(T::TAG, value)
}

/// Decodes `raw` as a `T`, failing if `raw`'s embedded tag was never
/// registered, or if it was registered under a different type.
pub(crate) fn decode<T: Tagged>(raw: &[u8], registry: &TagRegistry) -> Result<T, StoreError> {
    let envelope: Envelope = postcard::from_bytes(raw)?;
    if !registry.contains(&envelope.tag) {
        return Err(StoreError::UnknownTag(envelope.tag));
    }
    if envelope.tag != T::TAG {
        return Err(StoreError::TagMismatch { expected: T::TAG, found: envelope.tag });
    }
    Ok(postcard::from_bytes(&envelope.payload)?)
}

/// Arbitrary-precision integer tag, stored as a hex string (§9 "Default
/// registry includes a big-integer tag (hex string value)").
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BigInt(pub String);

impl Tagged for BigInt {
    const TAG: &'static str = "pisa.bigint";
}

impl From<alloy_primitives::U256> for BigInt {
    fn from(value: alloy_primitives::U256) -> Self {
        Self(format!("{value:#x}"))
    }
}

impl TryFrom<&BigInt> for alloy_primitives::U256 {
    type Error = alloy_primitives::ruint::ParseError;

    fn try_from(value: &BigInt) -> Result<Self, Self::Error> {
        alloy_primitives::U256::from_str_radix(value.0.trim_start_matches("0x"), 16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_int_round_trips_through_hex() {
        let value = alloy_primitives::U256::from(424_242u64);
        let big: BigInt = value.into();
        let back = alloy_primitives::U256::try_from(&big).unwrap();
        assert_eq!(back, value);
    }
}
