//! The appointment digest (§6 "Appointment digest") and the ECDSA sign /
//! recover helpers built on it.
//!
//! Kept as its own crate, rather than folded into `pisa-primitives`, because
//! it is the one place PISA reaches for `secp256k1`: the ingress surface
//! recovers the customer's signature and produces the tower's
//! countersignature here; the responder's wallet signing is a distinct
//! concern (transaction signing, not appointment-digest signing) and is
//! handled inside `pisa-responder`.

mod digest;
mod signature;

pub use digest::{appointment_digest, encode_topics};
pub use signature::{personal_sign_hash, recover_signer, sign_digest, CryptoError, RecoverableSignature};
