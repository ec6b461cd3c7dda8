use crate::{Address, AppointmentId, Bytes, BlockHeight, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-appointment anchor state tracked by the watcher component (§3
/// "Anchor state", §4.5).
///
/// Transitions only ever go `Watching -> Observed`; `reduce` never moves a
/// state back to `Watching` (§8 invariant).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatcherState {
    Watching,
    Observed { block_observed: BlockHeight },
}

impl WatcherState {
    pub fn block_observed(&self) -> Option<BlockHeight> {
        match self {
            Self::Watching => None,
            Self::Observed { block_observed } => Some(*block_observed),
        }
    }
}

/// Per-pending-transaction status tracked by the multi-responder's reducer
/// (§3 "Anchor state", §4.6).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Pending,
    Mined { mined_height: BlockHeight },
    Confirmed,
    Abandoned,
}

/// One row of the multi-responder's pending-transaction table (§3
/// "Pending-transaction table"), as it exists at a particular block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransactionAnchor {
    pub nonce: u64,
    pub target: Address,
    pub data: Bytes,
    pub gas_limit: u64,
    pub gas_price: U256,
    pub broadcast_height: BlockHeight,
    pub status: TransactionStatus,
    /// Number of consecutive heads this transaction has spent `Pending`
    /// since its last price bump, used to detect `STALE_BLOCKS` (§4.6).
    pub stale_for: u64,
    /// The appointment this transaction answers, carried so the row is
    /// self-describing for inspection/metrics without a second lookup.
    pub appointment_id: AppointmentId,
    /// The height at which the triggering condition was first observed
    /// (§3 "Action"), i.e. the `blockObserved` that accompanied the
    /// `StartResponse` this row originated from.
    pub block_observed: BlockHeight,
}

/// The multi-responder's anchor state at a given block: every
/// currently-tracked nonce's row, keyed by nonce so lookups during
/// `detectChanges` are `O(log n)`.
pub type ResponderAnchorState = BTreeMap<u64, PendingTransactionAnchor>;
