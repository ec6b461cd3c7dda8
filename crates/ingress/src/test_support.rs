#![cfg(test)]

use crate::AppState;
use pisa_appointment_store::AppointmentStore;
use pisa_block_cache::BlockCache;
use pisa_primitives::{Address, Block, BlockHash};
use pisa_store::BlockItemStore;
use rand::rngs::OsRng;
use secp256k1::{Secp256k1, SecretKey};
use std::time::Duration;

/// Builds an `AppState` whose block cache has a single-block chain with
/// head height `head_height`, for tests that need `validate_appointment`'s
/// `startBlock` window check to have something to compare against.
pub(crate) async fn test_state(head_height: u64) -> (AppState, BlockItemStore) {
    let store = BlockItemStore::open_temporary().unwrap();
    let cache = BlockCache::new(store.clone(), 1_000, Duration::from_secs(1));
    let appointments = AppointmentStore::open(&store).unwrap();

    let block = Block::genesis(BlockHash::from([1u8; 32]), head_height);
    cache.add_block(block.clone()).await.unwrap();
    cache.set_head(block.hash).await.unwrap();

    let (tower_key, tower_address) = tower_keys();
    let state = AppState {
        appointments,
        cache,
        tower_key,
        tower_address,
        tower_contract: Address::from([0xAA; 20]),
        start_block_window: 20,
        auth_block_window: 200,
    };
    (state, store)
}

pub(crate) fn tower_keys() -> (SecretKey, Address) {
    let secp = Secp256k1::new();
    let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
    let uncompressed = public_key.serialize_uncompressed();
    let hash = alloy_primitives::keccak256(&uncompressed[1..]);
    (secret_key, Address::from_slice(&hash[12..]))
}
