//! `vmward status` -- show balance, runway and tracked VMs.
//!
//! By default queries the network for the payer's balance and reconciles
//! the ledger against it, exactly as the `check_balance` tool does. With
//! `--offline`, reads only the local ledger.
//!
//! # Example
//!
//! ```text
//! vmward status
//! vmward status --offline
//! vmward status --json
//! ```

use chrono::Utc;
use clap::Args;

use vmward_core::{Ledger, Session};
use vmward_types::{VmStatus, VmSummary};

use super::{build_orchestrator, load_settings};

/// Arguments for the `vmward status` subcommand.
#[derive(Args)]
pub struct StatusArgs {
    /// Read the local ledger only; do not contact the network.
    #[arg(long)]
    pub offline: bool,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Run the status command.
pub async fn run(args: StatusArgs) -> anyhow::Result<()> {
    let settings = load_settings()?;

    if args.offline {
        let ledger = Ledger::new(&settings.ledger_path);
        let records = ledger.load().await?;
        let now = Utc::now();
        let vms: Vec<VmSummary> = records
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

        if args.json {
            println!("{}", serde_json::to_string_pretty(&vms)?);
            return Ok(());
        }

        println!("vmward status (offline)");
        println!("=======================");
        println!();
        println!("Ledger:       {}", ledger.path().display());
        println!("Tracked VMs:  {}", vms.len());
        print_vms(&vms);
        return Ok(());
    }

    let orchestrator = build_orchestrator(settings)?;
    let report = orchestrator.check_balance(&Session::new()).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let balance = &report.value;
    println!("vmward status");
    println!("=============");
    println!();
    println!("Signer:       {}", orchestrator.identity().address());
    println!("Gateway:      {}", orchestrator.settings().gateway_url);
    println!("Ledger:       {}", orchestrator.ledger().path().display());
    println!();
    println!("Balance:      {:.2} credits", balance.balance_credits);
    println!("Burn rate:    {:.3} credits/hour", balance.burn_rate_per_hour);
    println!("Runway:       {}", format_runway(balance.runway_hours));
    println!("Active VMs:   {}", balance.active_vm_count);
    print_vms(&balance.active_vms);

    if !report.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for warning in &report.warnings {
            println!("  - {warning}");
        }
    }

    Ok(())
}

fn print_vms(vms: &[VmSummary]) {
    if vms.is_empty() {
        return;
    }
    println!();
    for vm in vms {
        println!("  {}", format_vm_line(vm));
    }
}

fn format_runway(hours: Option<f64>) -> String {
    match hours {
        Some(h) => format!("{h:.1} hours"),
        None => "unlimited (nothing running)".into(),
    }
}

/// One line per VM: status, name, hash, cost so far and SSH command.
fn format_vm_line(vm: &VmSummary) -> String {
    let status = match vm.status {
        VmStatus::Running => "running",
        VmStatus::Expired => "EXPIRED",
        VmStatus::Stale => "stale",
        VmStatus::Orphan => "orphan",
    };
    let mut line = format!("[{status:<7}] {} ({})", vm.name, vm.item_hash);
    if let Some(cost) = vm.cost_so_far {
        line.push_str(&format!("  {cost:.2} credits"));
    }
    if let Some(ssh) = &vm.ssh_command {
        line.push_str(&format!("  {ssh}"));
    }
    line
}
