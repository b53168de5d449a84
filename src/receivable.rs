//! Invoice-level receivables and their aging status.

use crate::error::{Error, Result};
use crate::money::round_currency;
use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A receivable due within this many days counts as due soon.
pub const DUE_SOON_DAYS: i64 = 7;

/// More days overdue than this makes a receivable critical.
pub const CRITICAL_AFTER_DAYS: i64 = 30;

/// Collection status shown on the receivables list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceivableStatus {
    Current,
    DueSoon,
    Overdue,
    Critical,
    Collected,
    PartiallyPaid,
}

impl fmt::Display for ReceivableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReceivableStatus::Current => "Current",
            ReceivableStatus::DueSoon => "Due Soon",
            ReceivableStatus::Overdue => "Overdue",
            ReceivableStatus::Critical => "Critical",
            ReceivableStatus::Collected => "Collected",
            ReceivableStatus::PartiallyPaid => "Partially Paid",
        };
        f.write_str(label)
    }
}

/// Branch filter supplied by the caller's session.
///
/// Only narrows what is shown; it is never an authorization decision.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchScope {
    #[default]
    All,
    Branch(String),
}

impl BranchScope {
    pub fn branch(name: impl Into<String>) -> Self {
        BranchScope::Branch(name.into())
    }

    /// Branch names compare case-insensitively.
    pub fn includes(&self, receivable: &Receivable) -> bool {
        match self {
            BranchScope::All => true,
            BranchScope::Branch(name) => receivable.branch.eq_ignore_ascii_case(name),
        }
    }
}

impl FromStr for BranchScope {
    type Err = Error;

    /// `"all"` (any case) or an empty string select every branch.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            Ok(BranchScope::All)
        } else {
            Ok(BranchScope::Branch(s.to_string()))
        }
    }
}

impl fmt::Display for BranchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchScope::All => write!(f, "all"),
            BranchScope::Branch(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receivable {
    pub id: String,
    pub invoice_number: String,
    pub customer_id: String,
    pub customer_name: String,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub invoice_amount: Decimal,
    #[serde(default)]
    pub amount_paid: Decimal,
    pub status: ReceivableStatus,
    pub assigned_agent: String,
    pub branch: String,
    #[serde(default)]
    pub last_payment_date: Option<NaiveDate>,
}

impl Receivable {
    pub fn balance_due(&self) -> Decimal {
        self.invoice_amount - self.amount_paid
    }

    /// Whole days past `due_date`; 0 once nothing is owed.
    pub fn days_overdue(&self, today: NaiveDate) -> i64 {
        if self.balance_due() <= Decimal::ZERO {
            return 0;
        }
        (today - self.due_date).num_days().max(0)
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.days_overdue(today) > 0
    }

    /// Not overdue, still owing, and due within [`DUE_SOON_DAYS`].
    pub fn is_due_within_week(&self, today: NaiveDate) -> bool {
        self.balance_due() > Decimal::ZERO
            && !self.is_overdue(today)
            && self.due_date <= today + Duration::days(DUE_SOON_DAYS)
    }

    /// Status this receivable should carry on `today`.
    pub fn classify(&self, today: NaiveDate) -> ReceivableStatus {
        if self.balance_due() <= Decimal::ZERO {
            return ReceivableStatus::Collected;
        }
        match self.days_overdue(today) {
            d if d > CRITICAL_AFTER_DAYS => ReceivableStatus::Critical,
            d if d > 0 => ReceivableStatus::Overdue,
            _ if self.amount_paid > Decimal::ZERO => ReceivableStatus::PartiallyPaid,
            _ if self.is_due_within_week(today) => ReceivableStatus::DueSoon,
            _ => ReceivableStatus::Current,
        }
    }

    /// Re-derive `status` for `today`. Returns true if it changed.
    pub fn refresh_status(&mut self, today: NaiveDate) -> bool {
        let status = self.classify(today);
        let changed = status != self.status;
        self.status = status;
        changed
    }

    /// Apply a customer payment and return the remaining balance.
    ///
    /// # Errors
    ///
    /// `Error::ValidationError` if the amount is not positive, exceeds the
    /// balance, or the receivable is already collected.
    pub fn apply_payment(&mut self, amount: Decimal, paid_on: NaiveDate) -> Result<Decimal> {
        let amount = round_currency(amount);
        if amount <= Decimal::ZERO {
            return Err(Error::ValidationError(format!(
                "payment amount must be positive, got {}",
                amount
            )));
        }
        let balance = self.balance_due();
        if balance <= Decimal::ZERO {
            return Err(Error::ValidationError(format!(
                "receivable {} is already collected",
                self.id
            )));
        }
        if amount > balance {
            return Err(Error::ValidationError(format!(
                "payment {} exceeds balance {} on {}",
                amount, balance, self.invoice_number
            )));
        }

        self.amount_paid += amount;
        self.last_payment_date = Some(paid_on);
        self.status = if self.balance_due().is_zero() {
            ReceivableStatus::Collected
        } else {
            ReceivableStatus::PartiallyPaid
        };
        Ok(self.balance_due())
    }

    pub fn validate(&self) -> Result<()> {
        if self.invoice_amount < Decimal::ZERO || self.amount_paid < Decimal::ZERO {
            return Err(Error::ValidationError(format!(
                "receivable {} has negative amounts",
                self.id
            )));
        }
        if self.amount_paid > self.invoice_amount {
            return Err(Error::ValidationError(format!(
                "receivable {} is overpaid",
                self.id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn receivable(due: NaiveDate, amount: Decimal, paid: Decimal) -> Receivable {
        Receivable {
            id: "AR-001".to_string(),
            invoice_number: "INV-2024-0101".to_string(),
            customer_id: "CUST-001".to_string(),
            customer_name: "Metro Hardware".to_string(),
            invoice_date: due - Duration::days(30),
            due_date: due,
            invoice_amount: amount,
            amount_paid: paid,
            status: ReceivableStatus::Current,
            assigned_agent: "Ramon Cruz".to_string(),
            branch: "Manila".to_string(),
            last_payment_date: None,
        }
    }

    #[test]
    fn test_days_overdue() {
        let today = date(2024, 3, 15);
        let r = receivable(date(2024, 3, 10), dec!(1000), dec!(0));
        assert_eq!(r.days_overdue(today), 5);
        assert_eq!(r.days_overdue(date(2024, 3, 10)), 0);
        assert_eq!(r.days_overdue(date(2024, 3, 1)), 0);
    }

    #[test]
    fn test_collected_is_never_overdue() {
        let r = receivable(date(2024, 1, 1), dec!(1000), dec!(1000));
        assert_eq!(r.days_overdue(date(2024, 6, 1)), 0);
        assert_eq!(r.classify(date(2024, 6, 1)), ReceivableStatus::Collected);
    }

    #[test]
    fn test_classify_thresholds() {
        let due = date(2024, 3, 1);
        let r = receivable(due, dec!(5000), dec!(0));
        assert_eq!(r.classify(due - Duration::days(20)), ReceivableStatus::Current);
        assert_eq!(r.classify(due - Duration::days(7)), ReceivableStatus::DueSoon);
        assert_eq!(r.classify(due), ReceivableStatus::DueSoon);
        assert_eq!(r.classify(due + Duration::days(1)), ReceivableStatus::Overdue);
        assert_eq!(r.classify(due + Duration::days(30)), ReceivableStatus::Overdue);
        assert_eq!(r.classify(due + Duration::days(31)), ReceivableStatus::Critical);
    }

    #[test]
    fn test_partial_payment_status() {
        let due = date(2024, 3, 1);
        let r = receivable(due, dec!(5000), dec!(1000));
        assert_eq!(r.classify(due - Duration::days(2)), ReceivableStatus::PartiallyPaid);
        // overdue wins over partially paid
        assert_eq!(r.classify(due + Duration::days(3)), ReceivableStatus::Overdue);
    }

    #[test]
    fn test_apply_payment() {
        let mut r = receivable(date(2024, 3, 1), dec!(12500), dec!(0));
        let paid_on = date(2024, 3, 5);

        let balance = r.apply_payment(dec!(2500), paid_on).unwrap();
        assert_eq!(balance, dec!(10000));
        assert_eq!(r.status, ReceivableStatus::PartiallyPaid);
        assert_eq!(r.last_payment_date, Some(paid_on));

        let balance = r.apply_payment(dec!(10000), paid_on).unwrap();
        assert!(balance.is_zero());
        assert_eq!(r.status, ReceivableStatus::Collected);

        assert!(matches!(
            r.apply_payment(dec!(1), paid_on),
            Err(Error::ValidationError(_))
        ));
    }

    #[test]
    fn test_apply_payment_rejects_bad_amounts() {
        let mut r = receivable(date(2024, 3, 1), dec!(1000), dec!(0));
        let today = date(2024, 3, 2);
        assert!(r.apply_payment(dec!(0), today).is_err());
        assert!(r.apply_payment(dec!(-10), today).is_err());
        assert!(r.apply_payment(dec!(1000.01), today).is_err());
        assert_eq!(r.amount_paid, dec!(0));
    }

    #[test]
    fn test_branch_scope() {
        let r = receivable(date(2024, 3, 1), dec!(1000), dec!(0));
        assert!(BranchScope::All.includes(&r));
        assert!(BranchScope::branch("manila").includes(&r));
        assert!(!BranchScope::branch("Cebu").includes(&r));

        assert_eq!("ALL".parse::<BranchScope>().unwrap(), BranchScope::All);
        assert_eq!("".parse::<BranchScope>().unwrap(), BranchScope::All);
        assert_eq!(
            " Davao ".parse::<BranchScope>().unwrap(),
            BranchScope::branch("Davao")
        );
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(ReceivableStatus::DueSoon.to_string(), "Due Soon");
        assert_eq!(ReceivableStatus::PartiallyPaid.to_string(), "Partially Paid");
    }

    #[test]
    fn test_validate() {
        assert!(receivable(date(2024, 3, 1), dec!(100), dec!(50)).validate().is_ok());
        assert!(receivable(date(2024, 3, 1), dec!(100), dec!(150)).validate().is_err());
    }
}
