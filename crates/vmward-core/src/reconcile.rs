//! Local ledger versus network listing.

use std::collections::{BTreeSet, HashSet};

use vmward_types::VmRecord;

/// Difference between what the ledger holds and what the network reports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// Identifiers the network knows that the ledger does not, sorted.
    pub orphans: Vec<String>,
    /// Ledger records the network no longer reports, in ledger order.
    pub stale: Vec<VmRecord>,
}

impl Reconciliation {
    pub fn is_clean(&self) -> bool {
        self.orphans.is_empty() && self.stale.is_empty()
    }

    /// Advisory messages for a non-clean result.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !self.orphans.is_empty() {
            warnings.push(format!(
                "Orphaned VMs on network (not in local inventory): {:?}",
                self.orphans
            ));
        }
        if !self.stale.is_empty() {
            let hashes: Vec<&str> = self.stale.iter().map(|r| r.item_hash.as_str()).collect();
            warnings.push(format!(
                "Stale local records (not found on network): {hashes:?}. \
                 Use destroy_vm to clean up, or verify the signing key matches."
            ));
        }
        warnings
    }
}

/// Classify `local` against the identifier set `remote`.
pub fn reconcile(local: &[VmRecord], remote: &HashSet<String>) -> Reconciliation {
    let known: HashSet<&str> = local.iter().map(|r| r.item_hash.as_str()).collect();

    let orphans: BTreeSet<&String> = remote
        .iter()
        .filter(|hash| !known.contains(hash.as_str()))
        .collect();

    let stale = local
        .iter()
        .filter(|r| !remote.contains(&r.item_hash))
        .cloned()
        .collect();

    Reconciliation {
        orphans: orphans.into_iter().cloned().collect(),
        stale,
    }
}
