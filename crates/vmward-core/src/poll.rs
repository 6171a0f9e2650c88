//! Post-creation networking poll.

use std::time::Duration;

use tracing::{debug, warn};
use vmward_types::NetworkingInfo;

use crate::network::ComputeNetwork;

/// Bounded retry policy for the networking poll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl PollPolicy {
    pub fn new(attempts: u32, delay_secs: f64) -> Self {
        Self {
            attempts,
            delay: Duration::try_from_secs_f64(delay_secs).unwrap_or_default(),
        }
    }
}

/// Ask the network for an instance's networking details until they appear.
///
/// Errors on individual attempts are logged and skipped. Returns `None` once
/// every attempt is spent; never sleeps after the last one.
pub async fn poll_networking(
    network: &dyn ComputeNetwork,
    owner: &str,
    item_hash: &str,
    policy: PollPolicy,
) -> Option<NetworkingInfo> {
    for attempt in 1..=policy.attempts {
        match network.networking_info(owner, item_hash).await {
            Ok(Some(info)) if !info.is_empty() => {
                debug!(item_hash, attempt, "networking info available");
                return Some(info);
            }
            Ok(_) => debug!(item_hash, attempt, "networking info not ready"),
            Err(e) => debug!(item_hash, attempt, error = %e, "networking lookup failed"),
        }
        if attempt < policy.attempts {
            tokio::time::sleep(policy.delay).await;
        }
    }
    warn!(
        item_hash,
        attempts = policy.attempts,
        "could not retrieve networking info"
    );
    None
}
