use alloy_primitives::{keccak256, Address, Bytes, B256};
use secp256k1::{
    ecdsa::{RecoverableSignature as Secp256k1RecoverableSignature, RecoveryId},
    Message, PublicKey, Secp256k1, SecretKey,
};

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("malformed signature: expected 65 bytes, got {0}")]
    MalformedSignature(usize),
    #[error("invalid recovery id {0}")]
    InvalidRecoveryId(u8),
    #[error("signature recovery failed: {0}")]
    RecoveryFailed(#[from] secp256k1::Error),
}

/// A 65-byte `r || s || v` ECDSA signature, the wire format carried by
/// [`pisa_primitives::Appointment::customer_sig`] and by the tower's
/// countersignature in a receipt (§6).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecoverableSignature(pub [u8; 65]);

impl RecoverableSignature {
    pub fn as_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.0)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 65] = bytes.try_into().map_err(|_| CryptoError::MalformedSignature(bytes.len()))?;
        Ok(Self(arr))
    }
}

/// Prehashes `digest` with the Ethereum personal-message prefix
/// (`"\x19Ethereum Signed Message:\n32"`), the format both the customer and
/// the tower sign over (§6).
pub fn personal_sign_hash(digest: B256) -> B256 {
    let mut buf = Vec::with_capacity(26 + 32);
    buf.extend_from_slice(b"\x19Ethereum Signed Message:\n32");
    buf.extend_from_slice(digest.as_slice());
    keccak256(&buf)
}

/// Signs `digest` (already personal-message-prehashed) with `secret_key`,
/// producing a 65-byte `r || s || v` signature.
pub fn sign_digest(secret_key: &SecretKey, digest: B256) -> RecoverableSignature {
    let secp = Secp256k1::signing_only();
    let message = Message::from_slice(digest.as_slice()).expect("32-byte digest is a valid message");
    let (recovery_id, compact) = secp.sign_ecdsa_recoverable(&message, secret_key).serialize_compact();

    let mut out = [0u8; 65];
    out[..64].copy_from_slice(&compact);
    out[64] = recovery_id.to_i32() as u8;
    RecoverableSignature(out)
}

/// Recovers the signer address from a 65-byte `r || s || v` signature over
/// `digest` (already personal-message-prehashed).
pub fn recover_signer(digest: B256, signature: &RecoverableSignature) -> Result<Address, CryptoError> {
    let recovery_byte = signature.0[64];
    // Ethereum signatures commonly carry `v` as 27/28; secp256k1's
    // RecoveryId wants it normalized to 0/1.
    let normalized = if recovery_byte >= 27 { recovery_byte - 27 } else { recovery_byte };
    let recovery_id = RecoveryId::from_i32(normalized as i32)
        .map_err(|_| CryptoError::InvalidRecoveryId(recovery_byte))?;

    let secp = Secp256k1::verification_only();
    let message = Message::from_slice(digest.as_slice()).expect("32-byte digest is a valid message");
    let sig = Secp256k1RecoverableSignature::from_compact(&signature.0[..64], recovery_id)?;
    let public_key: PublicKey = secp.recover_ecdsa(&message, &sig)?;

    Ok(public_key_to_address(&public_key))
}

fn public_key_to_address(public_key: &PublicKey) -> Address {
    let uncompressed = public_key.serialize_uncompressed();
    // Drop the 0x04 prefix byte; the Ethereum address is the low 20 bytes of
    // keccak256 over the raw 64-byte (x, y) point.
    let hash = keccak256(&uncompressed[1..]);
    Address::from_slice(&hash[12..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn sign_then_recover_roundtrips() {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
        let expected = public_key_to_address(&public_key);

        let digest = personal_sign_hash(B256::from([7u8; 32]));
        let sig = sign_digest(&secret_key, digest);
        let recovered = recover_signer(digest, &sig).unwrap();

        assert_eq!(recovered, expected);
    }

    #[test]
    fn rejects_short_signature() {
        assert!(matches!(
            RecoverableSignature::from_bytes(&[0u8; 64]),
            Err(CryptoError::MalformedSignature(64))
        ));
    }
}
