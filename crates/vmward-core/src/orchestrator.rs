//! Lifecycle workflows behind the agent tools.
//!
//! Every mutating workflow follows the same order: estimate, run the safety
//! gates, call the network, then record the result locally. The ledger is
//! only written after the remote call succeeds, so a failed call never
//! leaves a partial record. A crash between a successful create and the
//! ledger write leaves an orphan, which the next listing reports.
//!
//! Best-effort side work (reconciliation, networking polls) never fails the
//! primary operation; problems come back as warnings on [`Advised`].

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use vmward_types::config::Settings;
use vmward_types::{
    Advised, BalanceReport, ComputeTier, ConfigError, DestroyReport, ExtendReport, NodeInfo,
    OsImage, ProvisionReport, Result, VmListing, VmRecord, VmStatus, VmSummary, WardenError,
    round_to,
};

use crate::cost;
use crate::ledger::{Ledger, RecordUpdate};
use crate::network::{ComputeNetwork, CreateInstanceRequest, Identity};
use crate::poll::{PollPolicy, poll_networking};
use crate::reconcile::reconcile;
use crate::safety::{self, Gate, PreCreateInputs, Verdict};
use crate::session::Session;

/// Inputs for [`Orchestrator::provision`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProvisionRequest {
    pub name: String,
    pub node_hash: String,
    pub compute_units: u32,
    /// Defaults to the configured TTL.
    pub ttl_hours: Option<f64>,
    /// Defaults to the configured image.
    pub os_image: Option<String>,
    /// Skip the cost confirmation gate.
    pub confirmed: bool,
    /// Estimate only; contact nothing and record nothing.
    pub dry_run: bool,
    pub purpose: Option<String>,
}

/// Runs provision, destroy, extend and the read-only reports.
pub struct Orchestrator {
    settings: Settings,
    ledger: Ledger,
    network: Arc<dyn ComputeNetwork>,
    identity: Identity,
    poll: PollPolicy,
}

/// `at` moved forward by `value` hours, or a validation error when the
/// result falls outside the representable date range.
fn add_hours(at: DateTime<Utc>, value: f64) -> Result<DateTime<Utc>> {
    // Float-to-int `as` saturates, so huge inputs land on i64::MAX and fail below.
    Duration::try_milliseconds((value * 3_600_000.0).round() as i64)
        .and_then(|delta| at.checked_add_signed(delta))
        .ok_or_else(|| {
            WardenError::Validation(format!("{value} hours is outside the supported time range."))
        })
}

fn elapsed_hours(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 3_600_000.0
}

fn blocked(gate: Gate, reason: String) -> WardenError {
    info!(%gate, %reason, "safety gate blocked request");
    WardenError::SafetyBlocked(reason)
}

fn expired_warning(expired: &[&VmRecord]) -> Option<String> {
    if expired.is_empty() {
        return None;
    }
    let hashes: Vec<&str> = expired.iter().map(|r| r.item_hash.as_str()).collect();
    Some(format!(
        "Expired TTL on VMs: {hashes:?}. Consider destroying them."
    ))
}

impl Orchestrator {
    pub fn new(settings: Settings, network: Arc<dyn ComputeNetwork>, identity: Identity) -> Self {
        let ledger = Ledger::new(&settings.ledger_path);
        let poll = PollPolicy::new(settings.poll_attempts, settings.poll_delay_secs);
        Self {
            settings,
            ledger,
            network,
            identity,
            poll,
        }
    }

    /// Override the networking poll policy.
    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Address whose balance funds new VMs.
    fn payer(&self) -> &str {
        self.settings
            .payer_address
            .as_deref()
            .unwrap_or(self.identity.address())
    }

    /// Estimate, gate, create and record a VM.
    pub async fn provision(
        &self,
        session: &Session,
        request: ProvisionRequest,
    ) -> Result<Advised<ProvisionReport>> {
        let tier = ComputeTier::new(request.compute_units)?;
        let os_image = match request.os_image.as_deref() {
            Some(image) => image.parse::<OsImage>()?,
            None => self.settings.default_os_image,
        };
        let ttl_hours = request.ttl_hours.unwrap_or(self.settings.default_ttl_hours);
        if !ttl_hours.is_finite() {
            return Err(WardenError::Validation(
                "TTL must be a finite number of hours.".into(),
            ));
        }

        let price = session.unit_price(self.network.as_ref()).await?;
        let estimate = cost::estimate(tier.units(), ttl_hours, price);
        let balance = self.network.get_balance(self.payer()).await?;

        let records = self.ledger.load().await?;
        let now = Utc::now();
        let expired_count = records.iter().filter(|r| r.is_expired(now)).count();

        let verdict = safety::evaluate(&PreCreateInputs {
            ttl_hours,
            max_ttl_hours: self.settings.max_ttl_hours,
            balance,
            estimated_cost: estimate.total_cost,
            guard_percent: self.settings.balance_guard_percent,
            active_count: records.len(),
            max_concurrent: self.settings.max_concurrent_vms,
            session_spent: session.committed_spend(),
            max_session_spend: self.settings.max_session_spend,
            cost_threshold: self.settings.cost_threshold,
            confirmed: request.confirmed,
        });
        match verdict {
            Verdict::Pass => {}
            Verdict::NeedsConfirmation { reason } => {
                info!(total_cost = estimate.total_cost, "provision needs confirmation");
                return Ok(Advised::new(ProvisionReport::needs_confirmation(
                    &estimate, reason,
                )));
            }
            Verdict::Blocked { gate, reason } => return Err(blocked(gate, reason)),
        }

        let ttl_expires_at = add_hours(now, ttl_hours)?;
        if request.dry_run {
            return Ok(Advised::new(ProvisionReport::dry_run(
                &estimate,
                ttl_expires_at,
            )));
        }

        let node = self
            .network
            .find_node(&request.node_hash)
            .await?
            .ok_or_else(|| WardenError::NodeNotFound(request.node_hash.clone()))?;
        let ssh_public_key = read_ssh_key(&self.settings.ssh_pubkey_path).await?;

        let created = self
            .network
            .create_instance(
                &self.identity,
                &CreateInstanceRequest {
                    node_hash: node.hash.clone(),
                    node_url: node.url.clone(),
                    ssh_public_key,
                    compute_units: tier.units(),
                    vcpus: tier.vcpus(),
                    memory_mib: tier.memory_mib(),
                    disk_mib: tier.disk_mib(),
                    os_image,
                    name: request.name.clone(),
                    payer_address: self.settings.payer_address.clone(),
                    terms_and_conditions: node.terms_and_conditions.clone(),
                },
            )
            .await?;
        // Credits are committed on the network from here on.
        session.commit_spend(estimate.total_cost);

        let mut record = VmRecord {
            item_hash: created.item_hash.clone(),
            name: request.name,
            node_hash: node.hash,
            node_url: node.url,
            compute_units: tier.units(),
            created_at: Utc::now(),
            ttl_expires_at: Some(ttl_expires_at),
            hourly_cost: estimate.hourly_cost,
            signing_address: Some(self.identity.address().to_owned()),
            purpose: request.purpose,
            ssh_user: "root".into(),
            ipv4_host: None,
            ssh_port: None,
            ipv6: None,
        };
        record.apply_networking(&created.networking);
        self.ledger.add(record.clone()).await?;
        info!(
            item_hash = %record.item_hash,
            compute_units = record.compute_units,
            total_cost = estimate.total_cost,
            "vm provisioned"
        );

        let mut warnings = Vec::new();
        if created.networking.is_empty() {
            match poll_networking(
                self.network.as_ref(),
                self.identity.address(),
                &record.item_hash,
                self.poll,
            )
            .await
            {
                Some(info) => {
                    record.apply_networking(&info);
                    if let Err(e) = self
                        .ledger
                        .update(&record.item_hash, RecordUpdate::Networking(info))
                        .await
                    {
                        warn!(item_hash = %record.item_hash, error = %e, "failed to record networking");
                        warnings.push(format!("Could not save networking details: {e}"));
                    }
                }
                None => warnings.push(format!(
                    "Networking details for VM {} were not available after {} attempts.",
                    record.item_hash, self.poll.attempts
                )),
            }
        }
        if expired_count > 0 {
            warnings.push(format!(
                "Note: {expired_count} VM(s) have expired TTLs. Consider destroying them."
            ));
        }

        Ok(Advised::with_warnings(
            ProvisionReport::created(&record, &estimate),
            warnings,
        ))
    }

    /// Destroy a VM on the network, then forget it locally.
    pub async fn destroy(&self, item_hash: &str) -> Result<DestroyReport> {
        let record = self
            .ledger
            .find(item_hash)
            .await?
            .ok_or_else(|| WardenError::NotFound(item_hash.to_owned()))?;

        if let Some(recorded) = record.signing_address.as_deref()
            && !self.identity.matches(recorded)
        {
            return Err(WardenError::KeyMismatch {
                recorded: recorded.to_owned(),
                current: self.identity.address().to_owned(),
            });
        }

        self.network
            .destroy_instance(&self.identity, item_hash, &record.node_url)
            .await?;
        self.ledger.remove(item_hash).await?;

        let runtime = record.uptime_minutes(Utc::now());
        let incurred = cost::cost_since_creation(&record, runtime);
        info!(item_hash, runtime_minutes = runtime, "vm destroyed");

        Ok(DestroyReport {
            status: "destroyed".into(),
            runtime_minutes: round_to(runtime, 1),
            estimated_cost_incurred: round_to(incurred, 2),
        })
    }

    /// Push a VM's tracked expiry out by `additional_hours`.
    pub async fn extend(
        &self,
        session: &Session,
        item_hash: &str,
        additional_hours: f64,
    ) -> Result<ExtendReport> {
        if !additional_hours.is_finite() || additional_hours <= 0.0 {
            return Err(WardenError::Validation(
                "additional_hours must be positive.".into(),
            ));
        }
        let record = self
            .ledger
            .find(item_hash)
            .await?
            .ok_or_else(|| WardenError::NotFound(item_hash.to_owned()))?;

        let additional_cost = record.hourly_cost * additional_hours;
        let balance = self.network.get_balance(self.payer()).await?;

        let current_expiry = record.ttl_expires_at.unwrap_or_else(Utc::now);
        let new_expiry = add_hours(current_expiry, additional_hours)?;
        let cumulative = elapsed_hours(record.created_at, new_expiry);

        let verdict = safety::evaluate_extension(
            balance,
            additional_cost,
            self.settings.balance_guard_percent,
            session.committed_spend(),
            self.settings.max_session_spend,
            cumulative,
            self.settings.max_ttl_hours,
        );
        match verdict {
            Verdict::Pass => {}
            Verdict::Blocked { gate, reason } => return Err(blocked(gate, reason)),
            Verdict::NeedsConfirmation { reason } => {
                return Err(WardenError::SafetyBlocked(reason));
            }
        }

        self.ledger
            .update(item_hash, RecordUpdate::TtlExpiry(Some(new_expiry)))
            .await?
            .ok_or_else(|| WardenError::NotFound(item_hash.to_owned()))?;
        session.commit_spend(additional_cost);
        info!(item_hash, additional_hours, %new_expiry, "vm ttl extended");

        Ok(ExtendReport {
            new_ttl_expires_at: new_expiry,
            additional_cost_estimate: round_to(additional_cost, 2),
        })
    }

    /// Balance, burn rate, runway and the active fleet.
    ///
    /// Reconciliation runs on the first call of the session only.
    pub async fn check_balance(&self, session: &Session) -> Result<Advised<BalanceReport>> {
        let balance = self.network.get_balance(self.payer()).await?;
        let price = session.unit_price(self.network.as_ref()).await?;
        let records = self.ledger.load().await?;
        let now = Utc::now();

        let burn = cost::burn_rate(&records, price);
        let runway = cost::runway_hours(balance, burn);

        let mut warnings = Vec::new();
        if session.claim_orphan_check() {
            match self
                .network
                .list_identifier_set(self.identity.address())
                .await
            {
                Ok(remote) => warnings.extend(reconcile(&records, &remote).warnings()),
                Err(e) => {
                    warn!(error = %e, "orphan detection failed");
                    warnings.push(format!("Orphan detection failed: {e}"));
                }
            }
        }

        let expired: Vec<&VmRecord> = records.iter().filter(|r| r.is_expired(now)).collect();
        warnings.extend(expired_warning(&expired));

        let active_vms = records
            .iter()
            .map(|r| {
                let status = if r.is_expired(now) {
                    VmStatus::Expired
                } else {
                    VmStatus::Running
                };
                VmSummary::from_record(r, status, now)
            })
            .collect();

        Ok(Advised::with_warnings(
            BalanceReport {
                balance_credits: balance,
                burn_rate_per_hour: round_to(burn, 3),
                runway_hours: runway.map(|h| round_to(h, 1)),
                active_vm_count: records.len(),
                active_vms,
            },
            warnings,
        ))
    }

    /// Every ledger VM plus orphans, reconciled against the network.
    pub async fn list_vms(&self) -> Result<Advised<VmListing>> {
        let records = self.ledger.load().await?;
        let now = Utc::now();

        let mut warnings = Vec::new();
        let reconciliation = match self
            .network
            .list_identifier_set(self.identity.address())
            .await
        {
            Ok(remote) => reconcile(&records, &remote),
            Err(e) => {
                warn!(error = %e, "reconciliation skipped");
                warnings.push(format!(
                    "Could not reconcile with the network: {e}. Listing local records only."
                ));
                Default::default()
            }
        };

        let mut vms: Vec<VmSummary> = records
            .iter()
            .map(|r| {
                let status = if r.is_expired(now) {
                    VmStatus::Expired
                } else if reconciliation
                    .stale
                    .iter()
                    .any(|s| s.item_hash == r.item_hash)
                {
                    VmStatus::Stale
                } else {
                    VmStatus::Running
                };
                VmSummary::from_record(r, status, now)
            })
            .collect();
        vms.extend(reconciliation.orphans.iter().map(VmSummary::orphan));

        Ok(Advised::with_warnings(VmListing { vms }, warnings))
    }

    /// Active nodes that can host `min_compute_units`, optionally GPU only.
    pub async fn list_nodes(&self, min_compute_units: u32, gpu: bool) -> Result<Vec<NodeInfo>> {
        let tier = ComputeTier::new(min_compute_units)?;
        let mut nodes = self
            .network
            .list_available_nodes(tier.units(), gpu)
            .await?;
        if gpu {
            nodes.retain(|n| n.has_gpu);
        }
        Ok(nodes)
    }
}

async fn read_ssh_key(path: &Path) -> Result<String> {
    let key = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(key.trim().to_owned())
}
