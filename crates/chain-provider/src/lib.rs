//! The "chain provider" external collaborator (§1, §6).
//!
//! Per spec §1 this collaborator's internals are explicitly out of scope -
//! "a generic 'chain provider' is assumed" (§1 Non-goals). This crate
//! therefore defines only the trait the rest of PISA programs against
//! ([`ChainProvider`]) plus one concrete, intentionally thin adapter over
//! `ethers-providers` so the workspace has something runnable. Tests
//! elsewhere in the workspace exercise an in-memory fake rather than this
//! adapter.

mod error;
mod ethers_adapter;

pub use error::{classify_transport_error, ProviderError};
pub use ethers_adapter::EthersChainProvider;

use async_trait::async_trait;
use pisa_primitives::{Address, Block, BlockHash, BlockHeight, Bytes, B256};
use std::{pin::Pin};
use tokio_stream::Stream;

/// A locator for `getBlock` (§6): either the block's height or its hash.
/// The block processor uses both - heights when walking forward from the
/// provider's notified tip, hashes when fetching a parent it only knows by
/// hash (§4.3 step 5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockId {
    Number(BlockHeight),
    Hash(BlockHash),
}

impl From<BlockHeight> for BlockId {
    fn from(height: BlockHeight) -> Self {
        Self::Number(height)
    }
}

impl From<BlockHash> for BlockId {
    fn from(hash: BlockHash) -> Self {
        Self::Hash(hash)
    }
}

/// A stream of newly-observed chain heights, as delivered by the provider's
/// push subscription (§6 "subscribe to height notifications").
pub type BlockNumberStream = Pin<Box<dyn Stream<Item = BlockHeight> + Send>>;

/// The minimal surface the block processor (§4.3) and multi-responder
/// (§4.6) need from a ledger client (§6 "Chain provider").
#[async_trait]
pub trait ChainProvider: Send + Sync + std::fmt::Debug {
    /// Subscribes to height notifications. The returned stream yields a new
    /// item each time the provider observes a new chain tip; it has no
    /// defined behavior after the provider connection is lost other than
    /// eventually ending, which callers must treat as fatal (§7).
    fn subscribe_blocks(&self) -> BlockNumberStream;

    /// `getBlockNumber()` (§6): the provider's current view of chain height.
    async fn block_number(&self) -> Result<BlockHeight, ProviderError>;

    /// `getBlock(heightOrHash, includeTransactions) -> Block | null` (§6).
    /// Logs are always included, since every consumer of `Block` needs them
    /// (§3 "Block").
    async fn get_block(&self, id: BlockId) -> Result<Option<Block>, ProviderError>;

    /// `sendTransaction(signedBytes) -> txHash` (§6).
    async fn send_transaction(&self, signed_bytes: Bytes) -> Result<B256, ProviderError>;

    /// `getTransactionCount(address) -> nonce` (§6), used by the
    /// multi-responder at startup to learn its signer's current nonce.
    async fn transaction_count(&self, address: Address) -> Result<u64, ProviderError>;

    /// `resetEventsBlock(height)` (§6): rewinds the provider's height
    /// subscription so a reorg the block processor already absorbed is not
    /// silently skipped by the provider's own internal cursor.
    async fn reset_events_block(&self, height: BlockHeight) -> Result<(), ProviderError>;
}
