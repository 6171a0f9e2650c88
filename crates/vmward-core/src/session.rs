//! Per-process session state.
//!
//! One [`Session`] lives for the lifetime of an agent connection and is
//! passed explicitly into every lifecycle call. Nothing here is persisted.
//!
//! Spend is checked and committed in separate steps, so two concurrent
//! provisions can both pass the session cap against the same total. The
//! cap is a soft limit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::OnceCell;
use tracing::debug;
use vmward_types::NetworkError;

use crate::network::ComputeNetwork;

#[derive(Debug, Default)]
pub struct Session {
    committed_spend: Mutex<f64>,
    orphan_check_done: AtomicBool,
    unit_price: OnceCell<f64>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Estimated spend approved so far in this session.
    pub fn committed_spend(&self) -> f64 {
        *self
            .committed_spend
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an approved estimate. Negative amounts are ignored; the total
    /// never decreases.
    pub fn commit_spend(&self, amount: f64) {
        if amount.is_nan() || amount <= 0.0 {
            return;
        }
        let mut spend = self
            .committed_spend
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *spend += amount;
        debug!(amount, total = *spend, "session spend committed");
    }

    /// True exactly once per session: the caller should run orphan detection.
    pub fn claim_orphan_check(&self) -> bool {
        !self.orphan_check_done.swap(true, Ordering::SeqCst)
    }

    /// Unit price, fetched on first use and reused for the session.
    ///
    /// A failed lookup is not cached; the next call tries again.
    pub async fn unit_price(&self, network: &dyn ComputeNetwork) -> Result<f64, NetworkError> {
        self.unit_price
            .get_or_try_init(|| async {
                let price = network.get_unit_price().await?;
                debug!(price, "unit price cached for session");
                Ok::<_, NetworkError>(price)
            })
            .await
            .copied()
    }
}
