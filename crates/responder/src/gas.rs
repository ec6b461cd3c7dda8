use async_trait::async_trait;
use pisa_primitives::U256;

#[derive(Debug, thiserror::Error)]
pub enum GasEstimatorError {
    #[error("gas estimator unavailable: {0}")]
    Unavailable(String),
}

/// Gas-price estimation (§4.6 "the signer's ... gas-price estimator"): an
/// external collaborator by design (§1 Non-goals), so this trait is the
/// seam the multi-responder programs against.
#[async_trait]
pub trait GasEstimator: Send + Sync + std::fmt::Debug {
    /// The price to broadcast a brand-new transaction at.
    async fn estimate(&self) -> Result<U256, GasEstimatorError>;

    /// The price to reissue a stale `Pending` transaction at (§4.6 "ask the
    /// estimator for a new, higher price"). Must return strictly more than
    /// `prior` or the replacement will itself be rejected as underpriced.
    fn bump(&self, prior: U256) -> U256;
}

/// A fixed starting price with a constant percentage bump on reissue. The
/// one concrete estimator the workspace ships so the responder is runnable
/// end to end; a production tower would plug in a real fee-market oracle.
#[derive(Clone, Copy, Debug)]
pub struct FixedStepGasEstimator {
    pub base_price: U256,
    pub bump_percent: u64,
}

impl FixedStepGasEstimator {
    pub fn new(base_price: U256, bump_percent: u64) -> Self {
        Self { base_price, bump_percent }
    }
}

#[async_trait]
impl GasEstimator for FixedStepGasEstimator {
    async fn estimate(&self) -> Result<U256, GasEstimatorError> {
        Ok(self.base_price)
    }

    fn bump(&self, prior: U256) -> U256 {
        let raise = (prior.saturating_mul(U256::from(self.bump_percent)) / U256::from(100u64)).max(U256::from(1u64));
        prior.saturating_add(raise)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn estimate_returns_configured_base_price() {
        let estimator = FixedStepGasEstimator::new(U256::from(1_000u64), 10);
        assert_eq!(estimator.estimate().await.unwrap(), U256::from(1_000u64));
    }

    #[test]
    fn bump_always_raises_the_price() {
        let estimator = FixedStepGasEstimator::new(U256::from(1_000u64), 10);
        let bumped = estimator.bump(U256::from(1_000u64));
        assert_eq!(bumped, U256::from(1_100u64));
        assert!(bumped > U256::from(1_000u64));
    }

    #[test]
    fn bump_never_stalls_at_zero() {
        let estimator = FixedStepGasEstimator::new(U256::ZERO, 10);
        assert_eq!(estimator.bump(U256::ZERO), U256::from(1u64));
    }
}
