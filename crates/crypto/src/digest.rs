use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{keccak256, Address, B256};
use pisa_primitives::Appointment;

/// ABI-encodes `(bool[4] present, bytes32[4] topic)` for a filter's topic
/// list, with missing slots padded to `false`/the zero word (§6 "Appointment
/// digest"). The result is itself embedded as a `bytes` field in the outer
/// appointment tuple, exactly as the spec's `encodedTopics` field.
pub fn encode_topics(topics: &[B256]) -> Vec<u8> {
    let mut present = [false; 4];
    let mut slots = [B256::ZERO; 4];
    for (i, topic) in topics.iter().take(4).enumerate() {
        present[i] = true;
        slots[i] = *topic;
    }

    let present_tail = DynSolValue::FixedArray(present.iter().map(|b| DynSolValue::Bool(*b)).collect());
    let topic_tail = DynSolValue::FixedArray(slots.iter().map(|t| DynSolValue::FixedBytes(*t, 32)).collect());
    DynSolValue::Tuple(vec![present_tail, topic_tail]).abi_encode()
}

/// Computes the appointment digest (§6 "Appointment digest"): the
/// keccak-256 of the ABI-encoded appointment tuple concatenated with the
/// tower's on-chain contract address.
///
/// The customer and the tower must compute an identical digest from an
/// `Appointment` plus the tower's contract address; this is the round-trip
/// law in §8 ("for any request, the digest computed by the customer equals
/// the digest computed by the tower").
pub fn appointment_digest(appointment: &Appointment, tower_contract: Address) -> B256 {
    let encoded_topics = encode_topics(&appointment.topics);

    let tuple = DynSolValue::Tuple(vec![
        DynSolValue::Address(appointment.contract_address),
        DynSolValue::Address(appointment.customer_address),
        DynSolValue::Uint(alloy_primitives::U256::from(appointment.start_block), 256),
        DynSolValue::Uint(alloy_primitives::U256::from(appointment.end_block), 256),
        DynSolValue::Uint(alloy_primitives::U256::from(appointment.challenge_period), 256),
        DynSolValue::FixedBytes(appointment.id, 32),
        DynSolValue::Uint(alloy_primitives::U256::from(appointment.nonce), 256),
        DynSolValue::Bytes(appointment.calldata.to_vec()),
        DynSolValue::Uint(appointment.refund, 256),
        DynSolValue::Uint(alloy_primitives::U256::from(appointment.gas_limit), 256),
        DynSolValue::Uint(alloy_primitives::U256::from(appointment.mode.as_u8()), 256),
        DynSolValue::Address(appointment.event_address),
        DynSolValue::Bytes(encoded_topics),
        DynSolValue::Bytes(appointment.pre_condition.to_vec()),
        DynSolValue::Bytes(appointment.post_condition.to_vec()),
        DynSolValue::FixedBytes(appointment.payment_hash, 32),
    ]);

    let mut encoded = tuple.abi_encode();
    encoded.extend_from_slice(tower_contract.as_slice());
    keccak256(&encoded)
}
