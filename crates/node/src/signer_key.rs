use crate::NodeError;
use pisa_primitives::Address;
use secp256k1::SecretKey;
use std::path::Path;

/// Loads a hex-encoded secp256k1 secret key from `path` (§4.6 "the signer's
/// address, its current on-chain nonce at startup" - this is how
/// [`pisa_config::ResponderConfig::signer_key_path`] is turned into a usable
/// key) and derives the Ethereum address that key signs as.
///
/// The key material itself is an external collaborator's concern (§1 "the
/// signing API used by the responder wallet"); this only covers the one
/// concrete `LocalWalletSigner` the workspace ships (§C "Everything from
/// spec.md... applies unchanged" plus `pisa_responder::LocalWalletSigner`'s
/// own doc comment).
pub fn load_secret_key(path: impl AsRef<Path>) -> Result<(SecretKey, Address), NodeError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .map_err(|e| NodeError::SignerKey(format!("reading {}: {e}", path.display())))?;
    let trimmed = contents.trim().trim_start_matches("0x");
    let bytes = hex::decode(trimmed)
        .map_err(|e| NodeError::SignerKey(format!("{} is not valid hex: {e}", path.display())))?;
    let secret_key = SecretKey::from_slice(&bytes)
        .map_err(|e| NodeError::SignerKey(format!("{} is not a valid secp256k1 key: {e}", path.display())))?;

    let secp = secp256k1::Secp256k1::new();
    let public_key = secret_key.public_key(&secp);
    let uncompressed = public_key.serialize_uncompressed();
    let hash = alloy_primitives::keccak256(&uncompressed[1..]);
    let address = Address::from_slice(&hash[12..]);

    Ok((secret_key, address))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_a_missing_file() {
        let err = load_secret_key("/nonexistent/path/signer.key").unwrap_err();
        assert!(matches!(err, NodeError::SignerKey(_)));
    }

    #[test]
    fn rejects_malformed_hex() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signer.key");
        std::fs::write(&path, "not hex at all").unwrap();

        let err = load_secret_key(&path).unwrap_err();
        assert!(matches!(err, NodeError::SignerKey(_)));
    }

    #[test]
    fn rejects_a_key_of_the_wrong_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signer.key");
        std::fs::write(&path, "aabbcc").unwrap();

        let err = load_secret_key(&path).unwrap_err();
        assert!(matches!(err, NodeError::SignerKey(_)));
    }

    #[test]
    fn loads_a_valid_key_and_derives_its_address() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signer.key");
        std::fs::write(&path, "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f36240").unwrap();

        let (_, address) = load_secret_key(&path).unwrap();
        assert_ne!(address, Address::ZERO);
    }

    #[test]
    fn tolerates_a_0x_prefix_and_surrounding_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signer.key");
        std::fs::write(&path, "  0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f36240\n").unwrap();

        let (_, address) = load_secret_key(&path).unwrap();
        assert_ne!(address, Address::ZERO);
    }
}
