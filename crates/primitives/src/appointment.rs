use crate::{Address, Bytes, BlockHeight, EventFilter, B256, U256};
use serde::{Deserialize, Serialize};

/// Customer-chosen 32-byte appointment identifier (§3).
pub type AppointmentId = B256;

/// An Ethereum address belonging to the customer who purchased the
/// appointment. Kept as a distinct alias from [`crate::Address`] purely for
/// readability at call sites that key by customer.
pub type CustomerAddress = Address;

/// `mode=0` (relay) or `mode=1` (event-triggered), §3 and §6 "Modes".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum AppointmentMode {
    Relay = 0,
    Event = 1,
}

impl AppointmentMode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Relay),
            1 => Some(Self::Event),
            _ => None,
        }
    }
}

/// An immutable, customer-signed appointment (§3).
///
/// `Appointment` values themselves never change once constructed; replacement
/// (same `(customer_address, id)`, strictly greater `nonce`) is modeled as
/// the appointment store swapping one immutable value for another, not as
/// mutation of a single value in place.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub customer_address: CustomerAddress,
    pub id: AppointmentId,
    pub nonce: u64,
    pub start_block: BlockHeight,
    pub end_block: BlockHeight,
    pub contract_address: Address,
    pub calldata: Bytes,
    pub gas_limit: u64,
    pub challenge_period: u64,
    pub refund: U256,
    pub pre_condition: Bytes,
    pub post_condition: Bytes,
    pub payment_hash: B256,
    pub mode: AppointmentMode,
    pub event_address: Address,
    pub topics: Vec<B256>,
    /// 65-byte `r || s || v` ECDSA signature over the appointment digest,
    /// prehashed with the Ethereum personal-message prefix (§6).
    pub customer_sig: Bytes,
}

impl Appointment {
    /// The `(customerAddress, id)` pair that identifies this appointment for
    /// replacement and removal purposes (§3 "Identity for replacement").
    pub fn identity(&self) -> (CustomerAddress, AppointmentId) {
        (self.customer_address, self.id)
    }

    /// The log filter this appointment watches for, if any. Relay-mode
    /// appointments carry the well-known zero-address/empty-topics filter
    /// and are never actually matched against logs (§6 "Modes").
    pub fn event_filter(&self) -> EventFilter {
        EventFilter { address: self.event_address, topics: self.topics.clone() }
    }

    /// Whether this appointment's block window contains `height`
    /// (`startBlock <= height < endBlock`, §4.5 `getInitialState`).
    pub fn window_contains(&self, height: BlockHeight) -> bool {
        self.start_block <= height && height < self.end_block
    }

    /// True for the "backup shorthand" shape defined in §6: a appointment
    /// where `contractAddress == eventAddress == customerAddress`.
    pub fn is_backup(&self) -> bool {
        self.contract_address == self.customer_address && self.event_address == self.customer_address
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn appt(mode: AppointmentMode) -> Appointment {
        Appointment {
            customer_address: Address::ZERO,
            id: B256::ZERO,
            nonce: 0,
            start_block: 0,
            end_block: 10,
            contract_address: Address::ZERO,
            calldata: Bytes::new(),
            gas_limit: 0,
            challenge_period: 0,
            refund: U256::ZERO,
            pre_condition: Bytes::new(),
            post_condition: Bytes::new(),
            payment_hash: B256::ZERO,
            mode,
            event_address: Address::ZERO,
            topics: vec![],
            customer_sig: Bytes::new(),
        }
    }

    #[test]
    fn window_is_half_open() {
        let a = appt(AppointmentMode::Relay);
        assert!(a.window_contains(0));
        assert!(a.window_contains(9));
        assert!(!a.window_contains(10));
    }

    #[test]
    fn backup_shape_detected() {
        let addr = Address::from([7u8; 20]);
        let mut a = appt(AppointmentMode::Relay);
        a.customer_address = addr;
        a.contract_address = addr;
        a.event_address = addr;
        assert!(a.is_backup());
    }
}
