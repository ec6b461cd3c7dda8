use pisa_primitives::Block;
use pisa_store::Tagged;
use serde::{Deserialize, Serialize};

/// Newtype around [`Block`] so this crate can implement the foreign
/// [`Tagged`] trait for it (orphan rules forbid doing so directly, since
/// neither `Block` nor `Tagged` is defined here).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct StoredBlock(pub(crate) Block);

impl Tagged for StoredBlock {
    const TAG: &'static str = "pisa.block-cache.block";
}

/// Whether a stored block is attached, as its own tagged row next to the
/// block body (§4.2 step 5: "persist `block` and `attached=true`").
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub(crate) struct Attached(pub(crate) bool);

impl Tagged for Attached {
    const TAG: &'static str = "pisa.block-cache.attached";
}
