//! Result shapes returned to the agent.
//!
//! These serialize directly into the JSON payload of a tool call. Costs are
//! in credits, durations in hours unless the field name says otherwise.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::VmRecord;

/// Round to a fixed number of decimal places for display.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Derived cost of running a tier for a duration. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub hourly_cost: f64,
    pub total_cost: f64,
    pub ttl_hours: f64,
    pub compute_units: u32,
}

/// Outcome of a single safety check.
///
/// `reason` is present iff `passed` is false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyCheckResult {
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SafetyCheckResult {
    pub fn pass() -> Self {
        Self {
            passed: true,
            reason: None,
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Classification of a VM in a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmStatus {
    Running,
    Expired,
    Stale,
    Orphan,
}

/// One row of a status or listing report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmSummary {
    pub item_hash: String,
    pub name: String,
    pub status: VmStatus,
    pub node_url: Option<String>,
    pub uptime_minutes: Option<f64>,
    pub cost_so_far: Option<f64>,
    pub ttl_expires_at: Option<DateTime<Utc>>,
    pub ssh_command: Option<String>,
    pub expired: bool,
}

impl VmSummary {
    /// Summarize a ledger record as seen at `now`.
    pub fn from_record(record: &VmRecord, status: VmStatus, now: DateTime<Utc>) -> Self {
        let uptime = record.uptime_minutes(now);
        let cost = record.cost_for_minutes(uptime);
        Self {
            item_hash: record.item_hash.clone(),
            name: record.name.clone(),
            status,
            node_url: Some(record.node_url.clone()),
            uptime_minutes: Some(round_to(uptime, 1)),
            cost_so_far: Some(round_to(cost, 2)),
            ttl_expires_at: record.ttl_expires_at,
            ssh_command: record.ssh_command(),
            expired: status == VmStatus::Expired,
        }
    }

    /// Row for an instance the network reports but the ledger does not hold.
    pub fn orphan(item_hash: impl Into<String>) -> Self {
        Self {
            item_hash: item_hash.into(),
            name: "(orphan, not in local inventory)".into(),
            status: VmStatus::Orphan,
            node_url: None,
            uptime_minutes: None,
            cost_so_far: None,
            ttl_expires_at: None,
            ssh_command: None,
            expired: false,
        }
    }
}

/// Balance, burn and runway for the payer plus the active fleet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceReport {
    pub balance_credits: f64,
    pub burn_rate_per_hour: f64,
    pub runway_hours: Option<f64>,
    pub active_vm_count: usize,
    pub active_vms: Vec<VmSummary>,
}

/// All VMs the agent owns, reconciled against the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmListing {
    pub vms: Vec<VmSummary>,
}

/// Result of a provisioning request.
///
/// Three shapes share this type: a created VM, a dry-run estimate, and a
/// request for confirmation when the cost crosses the threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionReport {
    pub item_hash: Option<String>,
    pub ssh_command: Option<String>,
    pub ipv4_host: Option<String>,
    pub ssh_port: Option<u16>,
    pub ipv6: Option<String>,
    pub hourly_cost: f64,
    pub total_cost_estimate: f64,
    pub ttl_expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub requires_confirmation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_message: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
}

impl ProvisionReport {
    fn estimate_only(estimate: &CostEstimate) -> Self {
        Self {
            item_hash: None,
            ssh_command: None,
            ipv4_host: None,
            ssh_port: None,
            ipv6: None,
            hourly_cost: estimate.hourly_cost,
            total_cost_estimate: estimate.total_cost,
            ttl_expires_at: None,
            requires_confirmation: false,
            confirmation_message: None,
            dry_run: false,
        }
    }

    /// Nothing was created; the caller must confirm the cost first.
    pub fn needs_confirmation(estimate: &CostEstimate, reason: impl Into<String>) -> Self {
        Self {
            requires_confirmation: true,
            confirmation_message: Some(reason.into()),
            ..Self::estimate_only(estimate)
        }
    }

    /// Estimate for a dry run, with the expiry a real run would get.
    pub fn dry_run(estimate: &CostEstimate, ttl_expires_at: DateTime<Utc>) -> Self {
        Self {
            ttl_expires_at: Some(ttl_expires_at),
            dry_run: true,
            ..Self::estimate_only(estimate)
        }
    }

    /// A VM was created and recorded.
    pub fn created(record: &VmRecord, estimate: &CostEstimate) -> Self {
        Self {
            item_hash: Some(record.item_hash.clone()),
            ssh_command: record.ssh_command(),
            ipv4_host: record.ipv4_host.clone(),
            ssh_port: record.ssh_port,
            ipv6: record.ipv6.clone(),
            ttl_expires_at: record.ttl_expires_at,
            ..Self::estimate_only(estimate)
        }
    }
}

/// Result of a destroy request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestroyReport {
    pub status: String,
    pub runtime_minutes: f64,
    pub estimated_cost_incurred: f64,
}

/// Result of a TTL extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtendReport {
    pub new_ttl_expires_at: DateTime<Utc>,
    pub additional_cost_estimate: f64,
}

/// A payload plus advisory warnings from best-effort side work.
///
/// Warnings never change the outcome of the operation; they describe
/// auxiliary checks that found something or could not run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Advised<T> {
    #[serde(flatten)]
    pub value: T,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl<T> Advised<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(value: T, warnings: Vec<String>) -> Self {
        Self { value, warnings }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn record() -> VmRecord {
        VmRecord {
            item_hash: "h1".into(),
            name: "worker".into(),
            node_hash: "n1".into(),
            node_url: "https://node.example".into(),
            compute_units: 2,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            ttl_expires_at: None,
            hourly_cost: 2.85,
            signing_address: None,
            purpose: None,
            ssh_user: "root".into(),
            ipv4_host: None,
            ssh_port: None,
            ipv6: None,
        }
    }

    #[test]
    fn safety_result_reason_iff_failed() {
        let ok = SafetyCheckResult::pass();
        assert!(ok.passed);
        assert!(ok.reason.is_none());

        let bad = SafetyCheckResult::fail("no");
        assert!(!bad.passed);
        assert_eq!(bad.reason.as_deref(), Some("no"));

        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json, serde_json::json!({"passed": true}));
    }

    #[test]
    fn summary_rounds_uptime_and_cost() {
        let rec = record();
        let now = rec.created_at + Duration::seconds(90 * 60 + 20);
        let summary = VmSummary::from_record(&rec, VmStatus::Running, now);
        assert_eq!(summary.uptime_minutes, Some(90.3));
        // 2.85/h over ~1.5056h
        assert_eq!(summary.cost_so_far, Some(4.29));
        assert!(!summary.expired);
        assert_eq!(summary.node_url.as_deref(), Some("https://node.example"));
    }

    #[test]
    fn expired_status_sets_flag() {
        let rec = record();
        let summary = VmSummary::from_record(&rec, VmStatus::Expired, rec.created_at);
        assert!(summary.expired);
        assert_eq!(
            serde_json::to_value(summary.status).unwrap(),
            serde_json::json!("expired")
        );
    }

    #[test]
    fn orphan_row_has_no_costs() {
        let row = VmSummary::orphan("ghost");
        assert_eq!(row.status, VmStatus::Orphan);
        assert!(row.uptime_minutes.is_none());
        assert!(row.cost_so_far.is_none());
        assert!(row.node_url.is_none());
    }

    #[test]
    fn advised_flattens_and_hides_empty_warnings() {
        let report = DestroyReport {
            status: "destroyed".into(),
            runtime_minutes: 12.5,
            estimated_cost_incurred: 0.3,
        };
        let plain = serde_json::to_value(Advised::new(report.clone())).unwrap();
        assert_eq!(plain["status"], "destroyed");
        assert!(plain.get("warnings").is_none());

        let warned =
            serde_json::to_value(Advised::with_warnings(report, vec!["careful".into()])).unwrap();
        assert_eq!(warned["warnings"], serde_json::json!(["careful"]));
    }

    #[test]
    fn provision_report_shapes() {
        let estimate = CostEstimate {
            hourly_cost: 2.85,
            total_cost: 11.4,
            ttl_hours: 4.0,
            compute_units: 2,
        };

        let confirm = ProvisionReport::needs_confirmation(&estimate, "too much");
        assert!(confirm.requires_confirmation);
        assert!(!confirm.dry_run);
        assert!(confirm.item_hash.is_none());
        assert_eq!(confirm.confirmation_message.as_deref(), Some("too much"));

        let at = Utc.with_ymd_and_hms(2025, 1, 1, 4, 0, 0).unwrap();
        let dry = ProvisionReport::dry_run(&estimate, at);
        assert!(dry.dry_run);
        assert_eq!(dry.ttl_expires_at, Some(at));
        assert_eq!(dry.total_cost_estimate, 11.4);
    }

    #[test]
    fn round_to_places() {
        assert_eq!(round_to(1.23456, 1), 1.2);
        assert_eq!(round_to(1.23456, 3), 1.235);
        assert_eq!(round_to(2.0, 2), 2.0);
    }
}
