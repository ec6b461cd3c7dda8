//! The multi-responder (§4.6): the one component that actually speaks to
//! the chain on the tower's behalf. Owns a single signer's nonce space,
//! tracks every transaction it has ever broadcast through to confirmation
//! or abandonment, and bumps gas prices on anything that sits `Pending`
//! too long.
//!
//! Registered with the [`pisa_reducer::ReducerFramework`] like the watcher,
//! under the name `"responder"`. It is also the watcher's
//! [`pisa_watcher::ResponseDispatcher`]: `pisa-node` wires a
//! `MultiResponder` into a registered `WatcherComponent` at start-up, which
//! is the only place the two crates' types meet.

mod error;
mod gas;
mod nonce;
mod signer;

pub use error::ResponderError;
pub use gas::{FixedStepGasEstimator, GasEstimator, GasEstimatorError};
pub use signer::{LocalWalletSigner, SignerError, TransactionSigner, UnsignedTransaction};

use async_trait::async_trait;
use nonce::NonceAllocator;
use pisa_block_cache::BlockCache;
use pisa_chain_provider::ChainProvider;
use pisa_primitives::{
    Action, Address, Appointment, Block, BlockHeight, PendingTransactionAnchor, ResponderAnchorState,
    TransactionStatus, U256,
};
use pisa_reducer::{ComponentError, ReducerComponent};
use pisa_watcher::{DispatchError, ResponseDispatcher};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

pub const COMPONENT_NAME: &str = "responder";

/// The multi-responder's anchor state, wrapped with the head height it was
/// computed for (§4.4 gives `detectChanges` the current head but not the
/// previous one; stamping it into the state mirrors
/// [`pisa_watcher::WatcherComponent`]'s `WatcherAnchor`).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct ResponderAnchor {
    height: BlockHeight,
    table: ResponderAnchorState,
}

fn encode(anchor: &ResponderAnchor) -> Result<Vec<u8>, ComponentError> {
    postcard::to_allocvec(anchor).map_err(|e| Box::new(ResponderError::Serialize(e)) as ComponentError)
}

fn decode(bytes: &[u8]) -> Result<ResponderAnchor, ComponentError> {
    postcard::from_bytes(bytes).map_err(|e| Box::new(ResponderError::Serialize(e)) as ComponentError)
}

/// Whether, at `head`, a transaction mined at `mined_height` has
/// accumulated at least `threshold` confirmations. Counted exclusively of
/// the mining block itself (§8 scenario 6: mined at 50, threshold 4, still
/// `MINED` at 53, `CONFIRMED` at 54 - unlike the watcher's
/// `CONFIRMATIONS_BEFORE_RESPONSE` rule in §4.5, which counts the
/// triggering block inclusively).
fn crossed(head: BlockHeight, mined_height: BlockHeight, threshold: BlockHeight) -> bool {
    head.saturating_sub(mined_height) >= threshold
}

fn block_contains(block: &Block, from: Address, nonce: u64) -> bool {
    block.transactions.iter().any(|tx| tx.from == from && tx.nonce == nonce)
}

/// The multi-responder (§4.6). Generic over the chain provider it
/// broadcasts through, the wallet it signs with, and the gas-price
/// estimator it consults - every one of them an external collaborator
/// named but not specified by §1.
pub struct MultiResponder<P, S, G> {
    provider: Arc<P>,
    signer: Arc<S>,
    estimator: Arc<G>,
    cache: BlockCache,
    chain_id: u64,
    confirmations_before_retire: BlockHeight,
    stale_blocks: u64,
    max_broadcast_retries: u32,
    backoff_base: Duration,
    backoff_max: Duration,
    /// "One mutex per (chain, signer)" (§5): serializes nonce allocation so
    /// two concurrent `startResponse` calls never race for the same slot.
    allocator: AsyncMutex<NonceAllocator>,
    /// The live, O(1)-by-nonce pending-transaction table (§3
    /// "Pending-transaction table"), kept in lock-step with every `reduce`
    /// call so `apply_action` and `start_response` never need to
    /// deserialize a block-keyed anchor just to look up one row.
    live_table: parking_lot::Mutex<BTreeMap<u64, PendingTransactionAnchor>>,
    /// Freshly broadcast rows awaiting their first `reduce`/`initial_state`
    /// call, since broadcasting happens on `startResponse` - off the block
    /// event cycle - not inside the reducer framework itself.
    fresh: parking_lot::Mutex<Vec<PendingTransactionAnchor>>,
}

impl<P, S, G> std::fmt::Debug for MultiResponder<P, S, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiResponder")
            .field("chain_id", &self.chain_id)
            .field("confirmations_before_retire", &self.confirmations_before_retire)
            .field("stale_blocks", &self.stale_blocks)
            .field("pending", &self.live_table.lock().len())
            .finish()
    }
}

impl<P, S, G> MultiResponder<P, S, G>
where
    P: ChainProvider,
    S: TransactionSigner,
    G: GasEstimator,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<P>,
        signer: Arc<S>,
        estimator: Arc<G>,
        cache: BlockCache,
        chain_id: u64,
        starting_nonce: u64,
        confirmations_before_retire: BlockHeight,
        stale_blocks: u64,
        max_broadcast_retries: u32,
        backoff_base: Duration,
        backoff_max: Duration,
    ) -> Self {
        Self {
            provider,
            signer,
            estimator,
            cache,
            chain_id,
            confirmations_before_retire,
            stale_blocks,
            max_broadcast_retries,
            backoff_base,
            backoff_max,
            allocator: AsyncMutex::new(NonceAllocator::new(starting_nonce)),
            live_table: parking_lot::Mutex::new(BTreeMap::new()),
            fresh: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.live_table.lock().len()
    }

    fn merge_fresh(&self, table: &mut ResponderAnchorState) {
        for anchor in self.fresh.lock().drain(..) {
            table.insert(anchor.nonce, anchor);
        }
    }

    /// `reduce`'s per-row transition (§4.6): a `Pending` row is promoted to
    /// `Mined` the moment a transaction from this signer lands at its
    /// nonce; anything else is terminal and simply carried forward.
    fn scan_block(&self, table: &mut ResponderAnchorState, block: &Block) {
        for entry in table.values_mut() {
            if let TransactionStatus::Pending = entry.status {
                if block_contains(block, self.signer.address(), entry.nonce) {
                    entry.status = TransactionStatus::Mined { mined_height: block.height };
                    entry.stale_for = 0;
                } else {
                    entry.stale_for += 1;
                }
            }
        }
    }

    fn publish_live_table(&self, table: &ResponderAnchorState) {
        *self.live_table.lock() = table.clone();
    }

    async fn broadcast_with_retries(&self, tx: &UnsignedTransaction) -> Result<pisa_primitives::B256, ResponderError> {
        let signed = self.signer.sign(tx).await.map_err(ResponderError::from)?;
        let mut delay = self.backoff_base;
        let mut attempt = 0u32;
        loop {
            match self.provider.send_transaction(signed.clone()).await {
                Ok(hash) => return Ok(hash),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_broadcast_retries {
                        metrics::counter!(pisa_metrics::RESPONDER_BROADCAST_RETRIES, 1);
                        return Err(ResponderError::BroadcastExhausted { attempts: attempt, source: err });
                    }
                    warn!(nonce = tx.nonce, attempt, error = %err, "transient broadcast failure, retrying after backoff");
                    metrics::counter!(pisa_metrics::RESPONDER_BROADCAST_RETRIES, 1);
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.backoff_max);
                }
            }
        }
    }

    /// `applyAction(ReissueTransaction)` (§4.6 step 5): re-signs and
    /// re-broadcasts the tracked row at `nonce` with `new_gas_price`.
    async fn reissue(&self, nonce: u64, new_gas_price: U256) -> Result<(), ResponderError> {
        let existing = self.live_table.lock().get(&nonce).cloned().ok_or(ResponderError::UnknownNonce(nonce))?;

        let tx = UnsignedTransaction {
            nonce,
            to: existing.target,
            data: existing.data.clone(),
            gas_limit: existing.gas_limit,
            gas_price: new_gas_price,
            chain_id: self.chain_id,
        };

        self.broadcast_with_retries(&tx).await?;
        metrics::counter!(pisa_metrics::RESPONDER_GAS_BUMPS, 1);

        let mut table = self.live_table.lock();
        if let Some(row) = table.get_mut(&nonce) {
            row.gas_price = new_gas_price;
            row.stale_for = 0;
        }
        debug!(nonce, ?new_gas_price, "reissued stale pending transaction at a higher price");
        Ok(())
    }
}

#[async_trait]
impl<P, S, G> ReducerComponent for MultiResponder<P, S, G>
where
    P: ChainProvider,
    S: TransactionSigner,
    G: GasEstimator,
{
    fn name(&self) -> &'static str {
        COMPONENT_NAME
    }

    async fn initial_state(&self, block: &Block) -> Result<Vec<u8>, ComponentError> {
        let mut table = ResponderAnchorState::new();
        self.merge_fresh(&mut table);
        self.scan_block(&mut table, block);
        self.publish_live_table(&table);
        encode(&ResponderAnchor { height: block.height, table })
    }

    async fn reduce(&self, prev_state: &[u8], block: &Block) -> Result<Vec<u8>, ComponentError> {
        let prev = decode(prev_state)?;
        let mut table = prev.table;
        self.merge_fresh(&mut table);
        self.scan_block(&mut table, block);
        self.publish_live_table(&table);
        encode(&ResponderAnchor { height: block.height, table })
    }

    fn detect_changes(&self, prev_emitted: &[u8], state: &[u8], head: &Block) -> Result<Vec<Action>, ComponentError> {
        let prev = decode(prev_emitted)?;
        let cur = decode(state)?;
        let mut actions = Vec::new();

        for (nonce, entry) in &cur.table {
            match entry.status {
                TransactionStatus::Mined { mined_height } => {
                    let retire_now = crossed(head.height, mined_height, self.confirmations_before_retire);
                    let retire_before = matches!(
                        prev.table.get(nonce).map(|p| p.status),
                        Some(TransactionStatus::Mined { mined_height: p })
                            if crossed(prev.height, p, self.confirmations_before_retire)
                    );
                    if retire_now && !retire_before {
                        actions.push(Action::RetireTransaction { nonce: *nonce });
                    }
                }
                TransactionStatus::Pending => {
                    if entry.stale_for >= self.stale_blocks {
                        let prev_stale = prev.table.get(nonce).map(|p| p.stale_for).unwrap_or(0);
                        if prev_stale < self.stale_blocks {
                            let new_gas_price = self.estimator.bump(entry.gas_price);
                            actions.push(Action::ReissueTransaction { nonce: *nonce, new_gas_price });
                        }
                    }
                }
                TransactionStatus::Confirmed | TransactionStatus::Abandoned => {}
            }
        }

        debug!(component = COMPONENT_NAME, head = head.height, actions = actions.len(), "responder detected changes");
        Ok(actions)
    }

    async fn apply_action(&self, action: Action) -> Result<(), ComponentError> {
        match action {
            Action::ReissueTransaction { nonce, new_gas_price } => {
                self.reissue(nonce, new_gas_price).await.map_err(|e| Box::new(e) as ComponentError)
            }
            Action::RetireTransaction { nonce } => {
                // The nonce was already consumed on-chain; nothing further
                // to free (§8 scenario 6). Metrics only.
                metrics::gauge!(pisa_metrics::RESPONDER_PENDING_TRANSACTIONS, self.pending_count() as f64);
                debug!(nonce, "retired settled transaction");
                Ok(())
            }
            other => Err(Box::new(ResponderError::UnexpectedAction(other)) as ComponentError),
        }
    }
}

#[async_trait]
impl<P, S, G> ResponseDispatcher for MultiResponder<P, S, G>
where
    P: ChainProvider,
    S: TransactionSigner,
    G: GasEstimator,
{
    /// `startResponse` (§4.6 steps 1-6): allocate a nonce, estimate a
    /// price, sign, broadcast with bounded retries, and record the result.
    async fn start_response(&self, appointment: &Appointment, block_observed: BlockHeight) -> Result<(), DispatchError> {
        let mut allocator = self.allocator.lock().await;
        let nonce = allocator.allocate();

        let price = match self.estimator.estimate().await {
            Ok(price) => price,
            Err(err) => {
                allocator.release_failed_broadcast(nonce);
                return Err(Box::new(ResponderError::from(err)) as DispatchError);
            }
        };

        let tx = UnsignedTransaction {
            nonce,
            to: appointment.contract_address,
            data: appointment.calldata.clone(),
            gas_limit: appointment.gas_limit,
            gas_price: price,
            chain_id: self.chain_id,
        };

        match self.broadcast_with_retries(&tx).await {
            Ok(hash) => {
                let broadcast_height = self.cache.head_opt().and_then(|h| self.cache.get_block(h)).map(|b| b.height).unwrap_or(0);
                let anchor = PendingTransactionAnchor {
                    nonce,
                    target: appointment.contract_address,
                    data: appointment.calldata.clone(),
                    gas_limit: appointment.gas_limit,
                    gas_price: price,
                    broadcast_height,
                    status: TransactionStatus::Pending,
                    stale_for: 0,
                    appointment_id: appointment.id,
                    block_observed,
                };
                self.fresh.lock().push(anchor);
                metrics::gauge!(pisa_metrics::RESPONDER_PENDING_TRANSACTIONS, self.pending_count() as f64 + 1.0);
                debug!(nonce, tx_hash = %hash, appointment_id = %appointment.id, "broadcast response transaction");
                Ok(())
            }
            Err(err) => {
                allocator.release_failed_broadcast(nonce);
                Err(Box::new(err) as DispatchError)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pisa_chain_provider::{BlockId, BlockNumberStream, ProviderError};
    use pisa_primitives::{Bytes, BlockHash, Transaction, B256};
    use pisa_store::BlockItemStore;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Debug, Default)]
    struct FakeProvider {
        sent: parking_lot::Mutex<Vec<Bytes>>,
        fail_remaining: AtomicU64,
    }

    #[async_trait]
    impl ChainProvider for FakeProvider {
        fn subscribe_blocks(&self) -> BlockNumberStream {
            Box::pin(futures_util::stream::empty())
        }

        async fn block_number(&self) -> Result<BlockHeight, ProviderError> {
            Ok(0)
        }

        async fn get_block(&self, _id: BlockId) -> Result<Option<Block>, ProviderError> {
            Ok(None)
        }

        async fn send_transaction(&self, signed_bytes: Bytes) -> Result<B256, ProviderError> {
            let remaining = self.fail_remaining.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_remaining.store(remaining - 1, Ordering::SeqCst);
                return Err(ProviderError::Transport("connection reset".into()));
            }
            self.sent.lock().push(signed_bytes);
            Ok(B256::from([1u8; 32]))
        }

        async fn transaction_count(&self, _address: Address) -> Result<u64, ProviderError> {
            Ok(0)
        }

        async fn reset_events_block(&self, _height: BlockHeight) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    #[derive(Debug)]
    struct FakeSigner {
        address: Address,
        calls: AtomicU64,
    }

    #[async_trait]
    impl TransactionSigner for FakeSigner {
        async fn sign(&self, _tx: &UnsignedTransaction) -> Result<Bytes, SignerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Bytes::from(vec![1, 2, 3]))
        }

        fn address(&self) -> Address {
            self.address
        }
    }

    fn appointment(id: u8, gas_limit: u64) -> Appointment {
        Appointment {
            customer_address: Address::from([1u8; 20]),
            id: B256::from([id; 32]),
            nonce: 0,
            start_block: 0,
            end_block: 1000,
            contract_address: Address::from([2u8; 20]),
            calldata: Bytes::new(),
            gas_limit,
            challenge_period: 0,
            refund: U256::ZERO,
            pre_condition: Bytes::new(),
            post_condition: Bytes::new(),
            payment_hash: B256::ZERO,
            mode: pisa_primitives::AppointmentMode::Relay,
            event_address: Address::ZERO,
            topics: vec![],
            customer_sig: Bytes::new(),
        }
    }

    fn responder(
        provider: Arc<FakeProvider>,
        cache: BlockCache,
    ) -> MultiResponder<FakeProvider, FakeSigner, FixedStepGasEstimator> {
        let signer = Arc::new(FakeSigner { address: Address::from([9u8; 20]), calls: AtomicU64::new(0) });
        let estimator = Arc::new(FixedStepGasEstimator::new(U256::from(1_000u64), 10));
        MultiResponder::new(
            provider,
            signer,
            estimator,
            cache,
            1,
            7,
            4,
            5,
            3,
            Duration::from_millis(1),
            Duration::from_millis(10),
        )
    }

    fn block(height: BlockHeight, hash: u8, parent: u8, transactions: Vec<Transaction>) -> Block {
        Block { hash: BlockHash::from([hash; 32]), height, parent_hash: BlockHash::from([parent; 32]), logs: vec![], transactions }
    }

    async fn cache() -> BlockCache {
        let store = BlockItemStore::open_temporary().unwrap();
        BlockCache::new(store, 1000, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn start_response_allocates_the_starting_nonce_and_tracks_it_pending() {
        let cache = cache().await;
        let provider = Arc::new(FakeProvider::default());
        let responder = responder(provider.clone(), cache);

        responder.start_response(&appointment(1, 21_000), 5).await.unwrap();

        assert_eq!(provider.sent.lock().len(), 1);
        let state = responder.initial_state(&block(0, 0, 255, vec![])).await.unwrap();
        let anchor: ResponderAnchor = decode(&state).unwrap();
        let row = &anchor.table[&7];
        assert_eq!(row.nonce, 7);
        assert_matches!(row.status, TransactionStatus::Pending);
        assert_eq!(row.block_observed, 5);
    }

    #[tokio::test]
    async fn a_matching_transaction_in_a_block_promotes_the_row_to_mined() {
        let cache = cache().await;
        let provider = Arc::new(FakeProvider::default());
        let responder = responder(provider, cache);
        responder.start_response(&appointment(2, 21_000), 0).await.unwrap();

        let signer_address = Address::from([9u8; 20]);
        let tx = Transaction { hash: B256::ZERO, nonce: 7, from: signer_address, to: None, chain_id: 1, input: Bytes::new(), value: U256::ZERO, gas_limit: 21_000 };
        let b0 = block(0, 0, 255, vec![tx]);

        let state = responder.initial_state(&b0).await.unwrap();
        let anchor: ResponderAnchor = decode(&state).unwrap();
        assert_matches!(anchor.table[&7].status, TransactionStatus::Mined { mined_height: 0 });
    }

    #[tokio::test]
    async fn retire_threshold_crossing_emits_exactly_once() {
        // §8 scenario 6: nonce 7 mines at height 50, threshold 4; still
        // `MINED` at 53, `CONFIRMED` (and retired) at 54.
        let cache = cache().await;
        let provider = Arc::new(FakeProvider::default());
        let responder = responder(provider, cache);

        let mut table = ResponderAnchorState::new();
        table.insert(
            7,
            PendingTransactionAnchor {
                nonce: 7,
                target: Address::from([2u8; 20]),
                data: Bytes::new(),
                gas_limit: 21_000,
                gas_price: U256::from(1_000u64),
                broadcast_height: 0,
                status: TransactionStatus::Mined { mined_height: 50 },
                stale_for: 0,
                appointment_id: B256::from([2u8; 32]),
                block_observed: 0,
            },
        );
        let prev = ResponderAnchor { height: 52, table: table.clone() };
        let cur = ResponderAnchor { height: 53, table };
        let head = block(53, 53, 52, vec![]);

        // Not yet crossed: still MINED at 53.
        let actions = responder.detect_changes(&encode(&prev).unwrap(), &encode(&cur).unwrap(), &head).unwrap();
        assert!(actions.is_empty());

        let prev2 = cur.clone();
        let cur2 = ResponderAnchor { height: 54, table: cur.table };
        let head2 = block(54, 54, 53, vec![]);

        let actions2 = responder.detect_changes(&encode(&prev2).unwrap(), &encode(&cur2).unwrap(), &head2).unwrap();
        assert_eq!(actions2, vec![Action::RetireTransaction { nonce: 7 }]);

        // One more head past the threshold: already crossed, no duplicate.
        let prev3 = cur2.clone();
        let cur3 = ResponderAnchor { height: 55, table: cur2.table };
        let head3 = block(55, 55, 54, vec![]);
        let actions3 = responder.detect_changes(&encode(&prev3).unwrap(), &encode(&cur3).unwrap(), &head3).unwrap();
        assert!(actions3.is_empty());
    }

    #[tokio::test]
    async fn stale_pending_transaction_triggers_reissue_once() {
        let cache = cache().await;
        let provider = Arc::new(FakeProvider::default());
        let responder = responder(provider, cache);

        let mut table = ResponderAnchorState::new();
        table.insert(
            7,
            PendingTransactionAnchor {
                nonce: 7,
                target: Address::from([2u8; 20]),
                data: Bytes::new(),
                gas_limit: 21_000,
                gas_price: U256::from(1_000u64),
                broadcast_height: 0,
                status: TransactionStatus::Pending,
                stale_for: 5,
                appointment_id: B256::from([2u8; 32]),
                block_observed: 0,
            },
        );
        let prev_table = {
            let mut t = table.clone();
            t.get_mut(&7).unwrap().stale_for = 4;
            t
        };
        let prev = ResponderAnchor { height: 4, table: prev_table };
        let cur = ResponderAnchor { height: 5, table };
        let head = block(5, 5, 4, vec![]);

        let actions = responder.detect_changes(&encode(&prev).unwrap(), &encode(&cur).unwrap(), &head).unwrap();
        assert_matches!(&actions[..], [Action::ReissueTransaction { nonce: 7, new_gas_price }] if *new_gas_price > U256::from(1_000u64));
    }

    #[tokio::test]
    async fn permanent_broadcast_failure_releases_the_nonce_for_reuse() {
        let cache = cache().await;
        let provider = Arc::new(FakeProvider::default());
        // `responder()` configures max_broadcast_retries = 3: fail every attempt.
        provider.fail_remaining.store(10, Ordering::SeqCst);
        let responder = responder(provider.clone(), cache);

        let result = responder.start_response(&appointment(3, 21_000), 0).await;
        assert!(result.is_err());

        // The failed nonce (7) is back in the free-list, so the next
        // successful call reuses it rather than jumping to 8.
        provider.fail_remaining.store(0, Ordering::SeqCst);
        responder.start_response(&appointment(4, 21_000), 0).await.unwrap();
        let state = responder.initial_state(&block(0, 0, 255, vec![])).await.unwrap();
        let anchor: ResponderAnchor = decode(&state).unwrap();
        assert!(anchor.table.contains_key(&7));
    }
}
