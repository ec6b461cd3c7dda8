use crate::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// A mined transaction as observed inside a [`crate::Block`].
///
/// This is deliberately narrower than a full RLP-decodable Ethereum
/// transaction: PISA only ever needs to recognize "did signer `S` land a
/// transaction at nonce `N`", so only the fields the responder's reducer
/// inspects are kept.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: B256,
    pub nonce: u64,
    pub from: Address,
    pub to: Option<Address>,
    pub chain_id: u64,
    pub input: Bytes,
    pub value: U256,
    pub gas_limit: u64,
}
