use crate::error::IngressError;
use alloy_primitives::{keccak256, Address, B256};
use pisa_crypto::{personal_sign_hash, recover_signer, RecoverableSignature};

/// Parses an `x-auth-sig`/`customer_sig`-style header value into a 65-byte
/// recoverable signature, accepting an optional `0x` prefix the way every
/// other hex field in this workspace does.
pub(crate) fn parse_signature(value: &str) -> Result<RecoverableSignature, IngressError> {
    let trimmed = value.strip_prefix("0x").unwrap_or(value);
    let bytes = hex::decode(trimmed).map_err(|_| IngressError::BadAuthSigHeader)?;
    RecoverableSignature::from_bytes(&bytes).map_err(|_| IngressError::BadAuthSigHeader)
}

/// The digest `x-auth-sig` is computed over: the Ethereum personal-message
/// prehash of the keccak-256 of the block number's hex-string
/// representation (§4.9: "signature over the hex block number").
pub(crate) fn auth_block_digest(block_number: u64) -> B256 {
    let hex_str = format!("{block_number:#x}");
    personal_sign_hash(keccak256(hex_str.as_bytes()))
}

/// Recovers the signer of `x-auth-sig` over `x-auth-block` and checks it
/// against the customer address named in the request path.
pub(crate) fn verify_auth_header(
    claimed: Address,
    auth_block: u64,
    auth_sig: &str,
) -> Result<(), IngressError> {
    let signature = parse_signature(auth_sig)?;
    let digest = auth_block_digest(auth_block);
    let recovered = recover_signer(digest, &signature).map_err(|_| IngressError::BadAuthSigHeader)?;
    if recovered != claimed {
        return Err(IngressError::AuthSignatureMismatch);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pisa_crypto::sign_digest;
    use rand::rngs::OsRng;
    use secp256k1::Secp256k1;

    fn keypair() -> (secp256k1::SecretKey, Address) {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
        let uncompressed = public_key.serialize_uncompressed();
        let hash = keccak256(&uncompressed[1..]);
        (secret_key, Address::from_slice(&hash[12..]))
    }

    #[test]
    fn accepts_a_correctly_signed_block_header() {
        let (secret_key, address) = keypair();
        let digest = auth_block_digest(42);
        let sig = sign_digest(&secret_key, digest);
        let hex_sig = hex::encode(sig.0);

        verify_auth_header(address, 42, &hex_sig).unwrap();
    }

    #[test]
    fn rejects_a_signature_from_a_different_key() {
        let (secret_key, _) = keypair();
        let (_, other_address) = keypair();
        let digest = auth_block_digest(42);
        let sig = sign_digest(&secret_key, digest);
        let hex_sig = hex::encode(sig.0);

        assert!(matches!(
            verify_auth_header(other_address, 42, &hex_sig),
            Err(IngressError::AuthSignatureMismatch)
        ));
    }
}
