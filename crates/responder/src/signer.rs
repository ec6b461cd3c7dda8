use async_trait::async_trait;
use pisa_primitives::{Address, Bytes, U256};
use secp256k1::SecretKey;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("transaction signing is currently unavailable: {0}")]
    Unavailable(String),
}

/// An unsigned response transaction (§4.6 `startResponse` step 3/4): the
/// fields the tower's wallet needs to produce something
/// [`pisa_chain_provider::ChainProvider::send_transaction`] will accept.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    pub nonce: u64,
    pub to: Address,
    pub data: Bytes,
    pub gas_limit: u64,
    pub gas_price: U256,
    pub chain_id: u64,
}

/// The wallet-signing seam (§1 "the signing API used by the responder
/// wallet" is named as an external collaborator, out of scope for this
/// system). Kept as a trait, the way [`pisa_chain_provider::ChainProvider`]
/// is, so the multi-responder never hard-codes a key-management strategy.
#[async_trait]
pub trait TransactionSigner: Send + Sync + std::fmt::Debug {
    async fn sign(&self, tx: &UnsignedTransaction) -> Result<Bytes, SignerError>;

    fn address(&self) -> Address;
}

#[derive(Serialize, Deserialize)]
struct SignedEnvelope {
    tx: UnsignedTransaction,
    signature: [u8; 65],
}

/// Signs directly with a local secp256k1 key, the one concrete
/// `TransactionSigner` the workspace ships so the responder is runnable
/// end to end. The wire format is a serialized `(tx, signature)` envelope
/// rather than a chain-specific RLP transaction - deliberately: the real
/// encoding belongs to whatever `ChainProvider` ultimately receives
/// `send_transaction`'s bytes, which §1 also treats as external.
pub struct LocalWalletSigner {
    secret_key: SecretKey,
    address: Address,
}

impl LocalWalletSigner {
    pub fn new(secret_key: SecretKey, address: Address) -> Self {
        Self { secret_key, address }
    }
}

impl std::fmt::Debug for LocalWalletSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalWalletSigner").field("address", &self.address).finish()
    }
}

#[async_trait]
impl TransactionSigner for LocalWalletSigner {
    async fn sign(&self, tx: &UnsignedTransaction) -> Result<Bytes, SignerError> {
        let encoded = postcard::to_allocvec(tx).expect("UnsignedTransaction always serializes");
        let digest = pisa_crypto::personal_sign_hash(alloy_primitives::keccak256(&encoded));
        let signature = pisa_crypto::sign_digest(&self.secret_key, digest);
        let envelope = SignedEnvelope { tx: tx.clone(), signature: signature.0 };
        Ok(Bytes::from(postcard::to_allocvec(&envelope).expect("SignedEnvelope always serializes")))
    }

    fn address(&self) -> Address {
        self.address
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use secp256k1::Secp256k1;

    #[tokio::test]
    async fn signs_against_the_wallet_address() {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
        let uncompressed = public_key.serialize_uncompressed();
        let hash = alloy_primitives::keccak256(&uncompressed[1..]);
        let address = Address::from_slice(&hash[12..]);

        let signer = LocalWalletSigner::new(secret_key, address);
        let tx = UnsignedTransaction {
            nonce: 3,
            to: Address::from([9u8; 20]),
            data: Bytes::new(),
            gas_limit: 21_000,
            gas_price: U256::from(1_000u64),
            chain_id: 1,
        };

        let signed = signer.sign(&tx).await.unwrap();
        assert!(!signed.is_empty());
        assert_eq!(signer.address(), address);
    }
}
