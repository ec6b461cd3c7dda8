use crate::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};

/// A single EVM log entry, as carried inside a [`crate::Block`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    /// Contract that emitted this log.
    pub address: Address,
    /// Indexed topics, in emission order. `topics[0]` is the event selector
    /// when the emitting contract follows the usual Solidity event ABI.
    pub topics: Vec<B256>,
    /// Non-indexed log data.
    pub data: Bytes,
}

/// Returns the set of addresses that emitted at least one of `logs`, for use
/// by callers that only care about presence, not content (e.g. dashboards).
pub fn logs_bloom_addresses<'a, It>(logs: It) -> Vec<Address>
where
    It: IntoIterator<Item = &'a Log>,
{
    let mut addresses = Vec::new();
    for log in logs {
        if !addresses.contains(&log.address) {
            addresses.push(log.address);
        }
    }
    addresses
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupes_addresses() {
        let a = Address::from([1u8; 20]);
        let b = Address::from([2u8; 20]);
        let logs = vec![
            Log { address: a, topics: vec![], data: Bytes::new() },
            Log { address: a, topics: vec![], data: Bytes::new() },
            Log { address: b, topics: vec![], data: Bytes::new() },
        ];
        assert_eq!(logs_bloom_addresses(&logs), vec![a, b]);
    }
}
