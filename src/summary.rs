//! Receivables summary tiles.
//!
//! [`summarize`] is a pure, single-pass reducer: callers hand it a snapshot of
//! receivables and a branch scope and get the dashboard figures back.

use crate::receivable::{BranchScope, Receivable, ReceivableStatus, DUE_SOON_DAYS};
use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivablesSummary {
    pub total_outstanding: Decimal,
    pub due_this_week: Decimal,
    pub overdue: Decimal,
    pub critical: Decimal,
    /// Distinct customers with at least one overdue receivable
    pub customers_with_overdue: usize,
    /// Mean days overdue across overdue receivables only, rounded half away from zero
    pub avg_days_overdue: i64,
    pub receivable_count: usize,
}

/// Aggregate the receivables in `scope` as of `today`.
///
/// `critical` follows the stored status, everything else is derived from dates
/// and balances.
pub fn summarize(
    receivables: &[Receivable],
    scope: &BranchScope,
    today: NaiveDate,
) -> ReceivablesSummary {
    let week_end = today + Duration::days(DUE_SOON_DAYS);
    let mut summary = ReceivablesSummary::default();
    let mut overdue_customers = HashSet::new();
    let mut overdue_days_total: i64 = 0;
    let mut overdue_count: i64 = 0;

    for r in receivables.iter().filter(|r| scope.includes(r)) {
        let balance = r.balance_due();
        let days = r.days_overdue(today);

        summary.receivable_count += 1;
        summary.total_outstanding += balance;
        if days == 0 && r.due_date <= week_end {
            summary.due_this_week += balance;
        }
        if days > 0 {
            summary.overdue += balance;
            overdue_customers.insert(r.customer_id.as_str());
            overdue_days_total += days;
            overdue_count += 1;
        }
        if r.status == ReceivableStatus::Critical {
            summary.critical += balance;
        }
    }

    summary.customers_with_overdue = overdue_customers.len();
    if overdue_count > 0 {
        // days are non-negative, so adding half the divisor rounds half up
        summary.avg_days_overdue = (2 * overdue_days_total + overdue_count) / (2 * overdue_count);
    }

    debug!(
        "Summarized {} receivables for branch {}: outstanding {}, overdue {}",
        summary.receivable_count, scope, summary.total_outstanding, summary.overdue
    );
    summary
}
