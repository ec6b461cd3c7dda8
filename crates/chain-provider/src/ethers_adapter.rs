use crate::{classify_transport_error, BlockId, BlockNumberStream, ChainProvider, ProviderError};
use async_trait::async_trait;
use ethers_core::types::{BlockId as EthersBlockId, BlockNumber, Filter, H256 as EthersH256};
use ethers_providers::{Middleware, Provider, StreamExt, Ws};
use pisa_primitives::{Address, Block, BlockHash, BlockHeight, Bytes, Log, Transaction, B256, U256};

/// Thin adapter of [`ChainProvider`] over an `ethers-providers` websocket
/// client. Per §1 the chain provider's internals are out of scope; this
/// exists only so the workspace has one runnable concrete implementation
/// alongside the in-memory fakes the other crates' tests use.
#[derive(Debug, Clone)]
pub struct EthersChainProvider {
    inner: Provider<Ws>,
}

impl EthersChainProvider {
    pub async fn connect(ws_url: &str) -> Result<Self, ProviderError> {
        let inner = Provider::<Ws>::connect(ws_url)
            .await
            .map_err(|e| classify_transport_error(e.to_string()))?;
        Ok(Self { inner })
    }

    fn convert_block(block: ethers_core::types::Block<ethers_core::types::Transaction>, logs: Vec<Log>) -> Option<Block> {
        let hash = block.hash?;
        let parent_hash = block.parent_hash;
        let height = block.number?.as_u64();
        let transactions = block
            .transactions
            .iter()
            .map(|tx| Transaction {
                hash: h256_to_b256(tx.hash),
                nonce: tx.nonce.as_u64(),
                from: address_from_ethers(tx.from),
                to: tx.to.map(address_from_ethers),
                chain_id: tx.chain_id.map(|c| c.as_u64()).unwrap_or_default(),
                input: Bytes::from(tx.input.to_vec()),
                value: u256_from_ethers(tx.value),
                gas_limit: tx.gas.as_u64(),
            })
            .collect();

        Some(Block {
            hash: h256_to_b256(hash),
            height,
            parent_hash: h256_to_b256(parent_hash),
            logs,
            transactions,
        })
    }
}

fn h256_to_b256(hash: EthersH256) -> B256 {
    B256::from_slice(hash.as_bytes())
}

fn address_from_ethers(address: ethers_core::types::Address) -> Address {
    Address::from_slice(address.as_bytes())
}

fn u256_from_ethers(value: ethers_core::types::U256) -> U256 {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    U256::from_be_bytes(bytes)
}

#[async_trait]
impl ChainProvider for EthersChainProvider {
    fn subscribe_blocks(&self) -> BlockNumberStream {
        let inner = self.inner.clone();
        Box::pin(async_stream::stream! {
            let mut stream = match inner.subscribe_blocks().await {
                Ok(stream) => stream,
                Err(_) => return,
            };
            while let Some(block) = stream.next().await {
                if let Some(number) = block.number {
                    yield number.as_u64();
                }
            }
        })
    }

    async fn block_number(&self) -> Result<BlockHeight, ProviderError> {
        self.inner
            .get_block_number()
            .await
            .map(|n| n.as_u64())
            .map_err(|e| classify_transport_error(e.to_string()))
    }

    async fn get_block(&self, id: BlockId) -> Result<Option<Block>, ProviderError> {
        let ethers_id = match id {
            BlockId::Number(height) => EthersBlockId::Number(BlockNumber::Number(height.into())),
            BlockId::Hash(hash) => EthersBlockId::Hash(EthersH256::from_slice(hash.as_slice())),
        };

        let block = self
            .inner
            .get_block_with_txs(ethers_id)
            .await
            .map_err(|e| classify_transport_error(e.to_string()))?;

        let block = match block {
            Some(block) => block,
            None => return Ok(None),
        };

        let block_hash = match block.hash {
            Some(hash) => hash,
            None => return Ok(None),
        };

        let filter = Filter::new().at_block_hash(block_hash);
        let raw_logs = self
            .inner
            .get_logs(&filter)
            .await
            .map_err(|e| classify_transport_error(e.to_string()))?;
        let logs = raw_logs
            .into_iter()
            .map(|log| Log {
                address: address_from_ethers(log.address),
                topics: log.topics.iter().map(|t| h256_to_b256(*t)).collect(),
                data: Bytes::from(log.data.to_vec()),
            })
            .collect();

        Ok(Self::convert_block(block, logs))
    }

    async fn send_transaction(&self, signed_bytes: Bytes) -> Result<B256, ProviderError> {
        let raw = ethers_core::types::Bytes::from(signed_bytes.to_vec());
        let pending = self
            .inner
            .send_raw_transaction(raw)
            .await
            .map_err(|e| classify_transport_error(e.to_string()))?;
        Ok(h256_to_b256(pending.tx_hash()))
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, ProviderError> {
        let ethers_address = ethers_core::types::Address::from_slice(address.as_slice());
        self.inner
            .get_transaction_count(ethers_address, None)
            .await
            .map(|count| count.as_u64())
            .map_err(|e| classify_transport_error(e.to_string()))
    }

    async fn reset_events_block(&self, _height: BlockHeight) -> Result<(), ProviderError> {
        // `ethers-providers`' websocket subscription has no separate
        // "rewind" call: resubscribing via `subscribe_blocks` after a reorg
        // is how this adapter achieves the same effect, left to the block
        // processor to do by simply continuing to poll `get_block` from the
        // height it already knows about.
        Ok(())
    }
}
