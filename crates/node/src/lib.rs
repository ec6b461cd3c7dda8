//! Service wiring: assembles the block-item store, block cache, block
//! processor, reducer framework (with the watcher and multi-responder
//! registered as components), action store, appointment store and ingress
//! surface into one start/stoppable tower, the way `reth-node-builder`
//! assembles a full node from its constituent crates (SPEC_FULL.md §A).
//!
//! This is the one crate that is allowed to know about every other PISA
//! crate at once; everything beneath it only ever sees the narrow seams
//! (`ChainProvider`, `TransactionSigner`, `GasEstimator`, `ResponseDispatcher`)
//! named in §1 and §9.

mod error;
mod signer_key;

pub use error::NodeError;
pub use signer_key::load_secret_key;

use async_trait::async_trait;
use pisa_action_store::ActionStore;
use pisa_appointment_store::AppointmentStore;
use pisa_block_cache::BlockCache;
use pisa_block_processor::BlockProcessor;
use pisa_chain_provider::ChainProvider;
use pisa_config::Config;
use pisa_ingress::AppState;
use pisa_primitives::{Address, Appointment, BlockHeight};
use pisa_reducer::ReducerFramework;
use pisa_responder::{GasEstimator, MultiResponder, TransactionSigner};
use pisa_store::BlockItemStore;
use pisa_tasks::{TaskExecutor, TaskSpawner};
use pisa_watcher::{DispatchError, ResponseDispatcher, WatcherComponent};
use secp256k1::SecretKey;
use std::{sync::Arc, time::Duration};
use tokio::sync::oneshot;
use tracing::{error, info};

/// A local newtype wrapping `Arc<MultiResponder<P, S, G>>` so it can
/// implement the foreign [`ResponseDispatcher`] trait (§9 "the watcher's
/// `applyAction(StartResponse)` calls the multi-responder"): the same
/// `MultiResponder` instance is registered with the reducer framework as a
/// component *and* handed to the watcher as its dispatcher, so both need a
/// shared, cheaply-clonable handle to it.
#[derive(Debug)]
struct ResponderHandle<P, S, G>(Arc<MultiResponder<P, S, G>>);

impl<P, S, G> Clone for ResponderHandle<P, S, G> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

#[async_trait]
impl<P, S, G> ResponseDispatcher for ResponderHandle<P, S, G>
where
    P: ChainProvider + 'static,
    S: TransactionSigner + 'static,
    G: GasEstimator + 'static,
{
    async fn start_response(&self, appointment: &Appointment, block_observed: BlockHeight) -> Result<(), DispatchError> {
        self.0.start_response(appointment, block_observed).await
    }
}

/// Everything constructed at start-up and handed to [`PisaNode::run`].
pub struct PisaNode<P, S, G>
where
    P: ChainProvider + 'static,
    S: TransactionSigner + 'static,
    G: GasEstimator + 'static,
{
    cache: BlockCache,
    processor: Arc<BlockProcessor<P>>,
    reducer: Arc<ReducerFramework>,
    responder: Arc<MultiResponder<P, S, G>>,
    ingress_state: AppState,
    ingress_bind_address: String,
    tasks: TaskExecutor,
}

impl<P, S, G> std::fmt::Debug for PisaNode<P, S, G>
where
    P: ChainProvider + 'static,
    S: TransactionSigner + 'static,
    G: GasEstimator + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PisaNode").field("ingress_bind_address", &self.ingress_bind_address).finish_non_exhaustive()
    }
}

impl<P, S, G> PisaNode<P, S, G>
where
    P: ChainProvider + 'static,
    S: TransactionSigner + 'static,
    G: GasEstimator + 'static,
{
    /// Builds every component described in §4 and wires them together per
    /// §2's data flow, without starting anything yet.
    #[allow(clippy::too_many_arguments)]
    pub async fn build(
        config: &Config,
        provider: Arc<P>,
        signer: Arc<S>,
        estimator: Arc<G>,
        tower_key: SecretKey,
        tower_address: Address,
        tower_contract: Address,
        tasks: TaskExecutor,
    ) -> Result<Self, NodeError> {
        pisa_metrics::describe_all();

        let store = BlockItemStore::open(&config.store.data_dir)?;
        let batch_timeout = Duration::from_millis(config.store.batch_open_timeout_ms);

        let cache = BlockCache::new(store.clone(), config.cache.max_depth, batch_timeout);
        let action_store = ActionStore::open(&store)?;
        let appointment_store = AppointmentStore::open(&store)?;

        let processor = Arc::new(BlockProcessor::new(provider.clone(), cache.clone(), &store)?);
        let resume_height = processor.resume_height().await?;
        info!(resume_height, "resuming block processor");

        let starting_nonce = provider.transaction_count(tower_address).await.map_err(pisa_block_processor::ProcessorError::from)?;

        let responder = Arc::new(MultiResponder::new(
            provider.clone(),
            signer,
            estimator,
            cache.clone(),
            config.chain.chain_id,
            starting_nonce,
            config.confirmations.before_retire,
            config.confirmations.stale_blocks,
            config.responder.max_broadcast_retries,
            Duration::from_millis(config.responder.backoff_base_ms),
            Duration::from_millis(config.responder.backoff_max_ms),
        ));

        let watcher = Arc::new(WatcherComponent::new(
            appointment_store.clone(),
            cache.clone(),
            ResponderHandle(responder.clone()),
            config.confirmations.before_response,
            config.confirmations.before_removal,
        ));

        let mut reducer = ReducerFramework::new(store.clone(), cache.clone(), action_store, batch_timeout);
        reducer.register(watcher);
        reducer.register(responder.clone());
        let reducer = Arc::new(reducer);

        let ingress_state = AppState::new(
            appointment_store,
            cache.clone(),
            tower_key,
            tower_address,
            tower_contract,
            config.ingress.start_block_window,
            config.ingress.auth_block_window,
        );

        Ok(Self {
            cache,
            processor,
            reducer,
            responder,
            ingress_state,
            ingress_bind_address: config.ingress.bind_address.clone(),
            tasks,
        })
    }

    pub fn pending_response_count(&self) -> usize {
        self.responder.pending_count()
    }

    /// Wires the cache's "new block" and the processor's "new head" events
    /// to the reducer framework, then runs the block processor and the
    /// ingress surface until `shutdown` resolves (§5 "Cancellation":
    /// `stop` detaches provider listeners, drains open batches by letting
    /// them finish, and returns after the last in-flight handler
    /// completes - modeled here as awaiting every spawned task after the
    /// shutdown signal fires).
    pub async fn run(self, shutdown: oneshot::Receiver<()>) -> Result<(), NodeError> {
        let reducer_for_block = self.reducer.clone();
        self.cache.new_block_event().subscribe(move |block| {
            let reducer = reducer_for_block.clone();
            async move {
                if let Err(err) = reducer.on_new_block(block).await {
                    error!(%err, "reducer framework failed to process a new block; this is a fatal invariant violation");
                }
            }
        });

        let reducer_for_head = self.reducer.clone();
        self.processor.new_head_event().subscribe(move |head| {
            let reducer = reducer_for_head.clone();
            async move {
                if let Err(err) = reducer.on_new_head(head).await {
                    error!(%err, "reducer framework failed to process a new head; this is a fatal invariant violation");
                }
            }
        });

        let processor = self.processor.clone();
        let processor_handle = self.tasks.spawn_critical(
            "block-processor",
            Box::pin(async move {
                if let Err(err) = processor.run().await {
                    error!(%err, "block processor stopped");
                }
            }),
        );

        let (ingress_shutdown_tx, ingress_shutdown_rx) = oneshot::channel();
        let ingress_state = self.ingress_state.clone();
        let bind_address = self.ingress_bind_address.clone();
        let ingress_handle = self.tasks.spawn_critical(
            "ingress-surface",
            Box::pin(async move {
                if let Err(err) = pisa_ingress::serve(ingress_state, &bind_address, ingress_shutdown_rx).await {
                    error!(%err, "ingress surface stopped");
                }
            }),
        );

        let _ = shutdown.await;
        info!("shutdown requested, draining in-flight work");
        let _ = ingress_shutdown_tx.send(());

        processor_handle.await?;
        ingress_handle.await?;
        Ok(())
    }
}
