use crate::{Address, Log, B256};
use serde::{Deserialize, Serialize};

/// `(eventAddress, topics)` filter carried by an event-triggered appointment
/// (§3 "Appointment", mode `1`).
///
/// Addresses and topics are stored as fixed-size byte arrays rather than hex
/// strings, so the "case-insensitive" comparison the spec calls for (§4.5) is
/// automatically satisfied by byte equality - there is no separate casing to
/// normalize once a hex string has been parsed into bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    pub address: Address,
    pub topics: Vec<B256>,
}

impl EventFilter {
    /// The filter used by relay-mode appointments: the zero address with no
    /// topics (§6 "Modes").
    pub fn relay() -> Self {
        Self { address: Address::ZERO, topics: Vec::new() }
    }

    pub fn is_relay(&self) -> bool {
        self.address == Address::ZERO && self.topics.is_empty()
    }
}

/// Whether `log` satisfies `filter` (§4.5 "Log matching").
pub trait LogFilterMatch {
    fn matches(&self, filter: &EventFilter) -> bool;
}

impl LogFilterMatch for Log {
    fn matches(&self, filter: &EventFilter) -> bool {
        if self.address != filter.address {
            return false;
        }
        for (i, expected) in filter.topics.iter().enumerate() {
            match self.topics.get(i) {
                Some(actual) if actual == expected => {}
                _ => return false,
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Bytes;

    fn log(address: Address, topics: Vec<B256>) -> Log {
        Log { address, topics, data: Bytes::new() }
    }

    #[test]
    fn matches_prefix_of_topics() {
        let addr = Address::from([0xAB; 20]);
        let t0 = B256::from([1u8; 32]);
        let t1 = B256::from([2u8; 32]);
        let filter = EventFilter { address: addr, topics: vec![t0] };
        assert!(log(addr, vec![t0, t1]).matches(&filter));
    }

    #[test]
    fn rejects_wrong_address() {
        let addr = Address::from([0xAB; 20]);
        let other = Address::from([0xCD; 20]);
        let filter = EventFilter { address: addr, topics: vec![] };
        assert!(!log(other, vec![]).matches(&filter));
    }

    #[test]
    fn rejects_missing_topic() {
        let addr = Address::from([0xAB; 20]);
        let t0 = B256::from([1u8; 32]);
        let filter = EventFilter { address: addr, topics: vec![t0] };
        assert!(!log(addr, vec![]).matches(&filter));
    }

    #[test]
    fn relay_filter_is_well_known() {
        let filter = EventFilter::relay();
        assert!(filter.is_relay());
    }
}
