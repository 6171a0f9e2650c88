//! Safety gates for spending operations.
//!
//! Each check is a total function of its inputs. [`evaluate`] runs them in
//! a fixed order: TTL range, balance guard, concurrency, session spend, and
//! last the confirmation threshold (skipped when the caller has confirmed).
//! The first failure wins.

use std::fmt;

use vmward_types::SafetyCheckResult;

/// Identifies which gate produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    TtlRange,
    BalanceGuard,
    Concurrency,
    SessionSpend,
    CostThreshold,
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TtlRange => "ttl_range",
            Self::BalanceGuard => "balance_guard",
            Self::Concurrency => "concurrency",
            Self::SessionSpend => "session_spend",
            Self::CostThreshold => "cost_threshold",
        })
    }
}

/// Fails unless `0 < ttl_hours <= max_ttl_hours`.
pub fn check_ttl_range(ttl_hours: f64, max_ttl_hours: f64) -> SafetyCheckResult {
    if ttl_hours <= 0.0 {
        return SafetyCheckResult::fail("TTL must be positive.");
    }
    if ttl_hours > max_ttl_hours {
        return SafetyCheckResult::fail(format!(
            "TTL {ttl_hours}h exceeds max {max_ttl_hours}h."
        ));
    }
    SafetyCheckResult::pass()
}

/// Fails if spending `estimated_cost` would leave less than `guard_percent`
/// of the current (pre-spend) balance.
pub fn check_balance_guard(
    balance: f64,
    estimated_cost: f64,
    guard_percent: f64,
) -> SafetyCheckResult {
    let floor = balance * (guard_percent / 100.0);
    let remaining = balance - estimated_cost;
    if remaining < floor {
        return SafetyCheckResult::fail(format!(
            "Provisioning would leave {remaining:.2} credits, below {guard_percent}% guard \
             ({floor:.2}). Current balance: {balance:.2}, estimated cost: {estimated_cost:.2}."
        ));
    }
    SafetyCheckResult::pass()
}

/// Fails once `active_count` has reached `max_concurrent`.
pub fn check_concurrent_limit(active_count: usize, max_concurrent: usize) -> SafetyCheckResult {
    if active_count >= max_concurrent {
        return SafetyCheckResult::fail(format!(
            "Already at {active_count}/{max_concurrent} concurrent VMs."
        ));
    }
    SafetyCheckResult::pass()
}

/// Fails if the session total would strictly exceed the cap. No cap, no check.
pub fn check_session_spend(
    session_spent: f64,
    additional_cost: f64,
    max_session_spend: Option<f64>,
) -> SafetyCheckResult {
    let Some(cap) = max_session_spend else {
        return SafetyCheckResult::pass();
    };
    let total = session_spent + additional_cost;
    if total > cap {
        return SafetyCheckResult::fail(format!(
            "Session spend would be {total:.2}, exceeding limit of {cap:.2}."
        ));
    }
    SafetyCheckResult::pass()
}

/// Fails when the cost is above the threshold, meaning the caller must confirm.
pub fn check_cost_threshold(estimated_cost: f64, threshold: f64) -> SafetyCheckResult {
    if estimated_cost > threshold {
        return SafetyCheckResult::fail(format!(
            "Estimated cost {estimated_cost:.2} credits exceeds confirmation threshold \
             ({threshold:.2}). Call again with confirmation to proceed."
        ));
    }
    SafetyCheckResult::pass()
}

/// Everything the pre-create chain looks at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreCreateInputs {
    pub ttl_hours: f64,
    pub max_ttl_hours: f64,
    pub balance: f64,
    pub estimated_cost: f64,
    pub guard_percent: f64,
    pub active_count: usize,
    pub max_concurrent: usize,
    pub session_spent: f64,
    pub max_session_spend: Option<f64>,
    pub cost_threshold: f64,
    pub confirmed: bool,
}

/// Outcome of the full chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    /// A hard limit refused the request.
    Blocked { gate: Gate, reason: String },
    /// Only the confirmation threshold failed.
    NeedsConfirmation { reason: String },
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

impl From<Verdict> for SafetyCheckResult {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Pass => SafetyCheckResult::pass(),
            Verdict::Blocked { reason, .. } | Verdict::NeedsConfirmation { reason } => {
                SafetyCheckResult::fail(reason)
            }
        }
    }
}

fn first_failure(
    checks: impl IntoIterator<Item = (Gate, SafetyCheckResult)>,
) -> Option<(Gate, String)> {
    checks.into_iter().find_map(|(gate, result)| {
        (!result.passed).then(|| (gate, result.reason.unwrap_or_default()))
    })
}

/// Run the pre-create chain and classify the outcome.
pub fn evaluate(inputs: &PreCreateInputs) -> Verdict {
    let hard = [
        (
            Gate::TtlRange,
            check_ttl_range(inputs.ttl_hours, inputs.max_ttl_hours),
        ),
        (
            Gate::BalanceGuard,
            check_balance_guard(inputs.balance, inputs.estimated_cost, inputs.guard_percent),
        ),
        (
            Gate::Concurrency,
            check_concurrent_limit(inputs.active_count, inputs.max_concurrent),
        ),
        (
            Gate::SessionSpend,
            check_session_spend(
                inputs.session_spent,
                inputs.estimated_cost,
                inputs.max_session_spend,
            ),
        ),
    ];

    if let Some((gate, reason)) = first_failure(hard) {
        return Verdict::Blocked { gate, reason };
    }

    if !inputs.confirmed {
        let threshold = check_cost_threshold(inputs.estimated_cost, inputs.cost_threshold);
        if let Some((_, reason)) = first_failure([(Gate::CostThreshold, threshold)]) {
            return Verdict::NeedsConfirmation { reason };
        }
    }

    Verdict::Pass
}

/// The chain as a single pass/fail result: the first failing check, or a pass.
pub fn run_pre_create_checks(inputs: &PreCreateInputs) -> SafetyCheckResult {
    evaluate(inputs).into()
}

/// Gates re-applied when extending a VM's TTL.
///
/// Concurrency is not re-checked. The TTL range is checked against the
/// cumulative lifetime from creation, so repeated small extensions cannot
/// creep past the maximum.
pub fn evaluate_extension(
    balance: f64,
    additional_cost: f64,
    guard_percent: f64,
    session_spent: f64,
    max_session_spend: Option<f64>,
    cumulative_ttl_hours: f64,
    max_ttl_hours: f64,
) -> Verdict {
    let checks = [
        (
            Gate::BalanceGuard,
            check_balance_guard(balance, additional_cost, guard_percent),
        ),
        (
            Gate::SessionSpend,
            check_session_spend(session_spent, additional_cost, max_session_spend),
        ),
        (
            Gate::TtlRange,
            check_ttl_range(cumulative_ttl_hours, max_ttl_hours),
        ),
    ];
    match first_failure(checks) {
        Some((gate, reason)) => Verdict::Blocked { gate, reason },
        None => Verdict::Pass,
    }
}
