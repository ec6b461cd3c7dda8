use pisa_primitives::{BlockHash, BlockHeight};

/// Composes the on-disk key `{height}:{blockHash}:{itemKey}` (§4.1).
///
/// The height is encoded big-endian so that `sled`'s natural byte-order
/// iteration agrees with numeric height order, in case a future caller ever
/// needs to range-scan the tree directly instead of going through the
/// in-memory index.
pub(crate) fn make_key(height: BlockHeight, hash: BlockHash, item_key: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + 32 + 1 + item_key.len());
    key.extend_from_slice(&height.to_be_bytes());
    key.extend_from_slice(hash.as_slice());
    key.push(b':');
    key.extend_from_slice(item_key.as_bytes());
    key
}
