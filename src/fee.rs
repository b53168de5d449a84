//! Payment method fee rules and the fee calculator.
//!
//! Fees follow a surcharge model: the gateway and service fees are added on
//! top of the invoice amount, so the customer pays more than the invoice.
//!
//! ```
//! use billpay_kit::fee::{calculate_fees, FeeSchedule, PaymentMethod};
//! use rust_decimal::Decimal;
//!
//! let schedule = FeeSchedule::standard();
//! let gcash = schedule.get(PaymentMethod::GCash).unwrap();
//! let breakdown = calculate_fees(Decimal::from(36550), gcash).unwrap();
//! assert_eq!(breakdown.total_amount.to_string(), "37572.38");
//! ```

use crate::error::{Error, Result};
use crate::money::{ensure_non_negative, percent_of, round_currency};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payment channels offered on a payment link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[serde(rename = "gcash")]
    GCash,
    Maya,
    BankTransfer,
    CreditCard,
    DebitCard,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 5] = [
        PaymentMethod::GCash,
        PaymentMethod::Maya,
        PaymentMethod::BankTransfer,
        PaymentMethod::CreditCard,
        PaymentMethod::DebitCard,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::GCash => "gcash",
            PaymentMethod::Maya => "maya",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::DebitCard => "debit_card",
        }
    }

    /// Display label used on the customer-facing payment page.
    pub fn label(&self) -> &'static str {
        match self {
            PaymentMethod::GCash => "GCash",
            PaymentMethod::Maya => "Maya",
            PaymentMethod::BankTransfer => "Bank Transfer",
            PaymentMethod::CreditCard => "Credit Card",
            PaymentMethod::DebitCard => "Debit Card",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Fee rule for one payment method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethodFee {
    pub method: PaymentMethod,
    /// Gateway fee as a percentage of the invoice amount (`1.5` = 1.5%)
    pub gateway_fee_percent: Decimal,
    /// Flat gateway fee per transaction
    #[serde(default)]
    pub gateway_fee_fixed: Decimal,
    /// Service fee as a percentage of the invoice amount
    #[serde(default)]
    pub service_fee_percent: Decimal,
    /// Flat service fee per transaction
    #[serde(default)]
    pub service_fee_fixed: Decimal,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
}

fn default_enabled() -> bool {
    true
}

impl PaymentMethodFee {
    /// Rule with no fees at all.
    pub fn free(method: PaymentMethod) -> Self {
        PaymentMethodFee {
            method,
            gateway_fee_percent: Decimal::ZERO,
            gateway_fee_fixed: Decimal::ZERO,
            service_fee_percent: Decimal::ZERO,
            service_fee_fixed: Decimal::ZERO,
            enabled: true,
            description: String::new(),
        }
    }

    /// Check the rule's fields. Called at schedule load time.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("gateway_fee_percent", self.gateway_fee_percent),
            ("gateway_fee_fixed", self.gateway_fee_fixed),
            ("service_fee_percent", self.service_fee_percent),
            ("service_fee_fixed", self.service_fee_fixed),
        ];
        for (name, value) in fields {
            if value.is_sign_negative() && !value.is_zero() {
                return Err(Error::ConfigError(format!(
                    "{}: {} must not be negative, got {}",
                    self.method, name, value
                )));
            }
        }
        Ok(())
    }
}

/// Fee breakdown for paying an invoice with one method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFeeBreakdown {
    pub invoice_amount: Decimal,
    pub gateway_fee: Decimal,
    pub service_fee: Decimal,
    pub total_fees: Decimal,
    pub total_amount: Decimal,
}

/// Compute the fee breakdown for paying `invoice_amount` with `rule`.
///
/// Gateway and service fees are rounded to centavos first; totals are sums of
/// the rounded parts, so `total_fees == gateway_fee + service_fee` and
/// `total_amount == invoice_amount + total_fees` hold exactly.
///
/// # Errors
///
/// `Error::ValidationError` if `invoice_amount` is negative.
pub fn calculate_fees(invoice_amount: Decimal, rule: &PaymentMethodFee) -> Result<PaymentFeeBreakdown> {
    let invoice_amount = round_currency(ensure_non_negative(invoice_amount, "invoice amount")?);

    let gateway_fee = round_currency(
        percent_of(invoice_amount, rule.gateway_fee_percent) + rule.gateway_fee_fixed,
    );
    let service_fee = round_currency(
        percent_of(invoice_amount, rule.service_fee_percent) + rule.service_fee_fixed,
    );
    let total_fees = gateway_fee + service_fee;

    Ok(PaymentFeeBreakdown {
        invoice_amount,
        gateway_fee,
        service_fee,
        total_fees,
        total_amount: invoice_amount + total_fees,
    })
}

/// Validated table of fee rules, one per payment method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<PaymentMethodFee>", into = "Vec<PaymentMethodFee>")]
pub struct FeeSchedule {
    rules: Vec<PaymentMethodFee>,
}

impl FeeSchedule {
    /// Build a schedule, rejecting negative fields and duplicate methods.
    ///
    /// # Errors
    ///
    /// `Error::ConfigError` on the first invalid rule.
    pub fn new(rules: Vec<PaymentMethodFee>) -> Result<Self> {
        for (idx, rule) in rules.iter().enumerate() {
            rule.validate()?;
            if rules[..idx].iter().any(|r| r.method == rule.method) {
                return Err(Error::ConfigError(format!(
                    "duplicate fee rule for {}",
                    rule.method
                )));
            }
        }
        debug!("Fee schedule loaded with {} rules", rules.len());
        Ok(FeeSchedule { rules })
    }

    /// Load a schedule from a JSON array of rules.
    ///
    /// Amounts are decimal strings, e.g. `"gateway_fee_percent": "1.5"`.
    pub fn from_json(json: &str) -> Result<Self> {
        let rules: Vec<PaymentMethodFee> = serde_json::from_str(json)?;
        Self::new(rules)
    }

    /// Built-in schedule for the five supported methods.
    pub fn standard() -> Self {
        let rule = |method, gp: i64, gf: i64, sp: i64, sf: i64, description: &str| {
            PaymentMethodFee {
                method,
                // percentages are given in hundredths of a percent
                gateway_fee_percent: Decimal::new(gp, 2),
                gateway_fee_fixed: Decimal::from(gf),
                service_fee_percent: Decimal::new(sp, 2),
                service_fee_fixed: Decimal::from(sf),
                enabled: true,
                description: description.to_string(),
            }
        };
        FeeSchedule {
            rules: vec![
                rule(PaymentMethod::GCash, 150, 0, 75, 200, "Pay instantly with your GCash wallet"),
                rule(PaymentMethod::Maya, 180, 0, 75, 200, "Pay with your Maya wallet"),
                rule(PaymentMethod::BankTransfer, 0, 15, 50, 100, "InstaPay / PESONet bank transfer"),
                rule(PaymentMethod::CreditCard, 350, 15, 100, 200, "Visa, Mastercard, JCB"),
                rule(PaymentMethod::DebitCard, 200, 10, 75, 200, "BancNet and international debit cards"),
            ],
        }
    }

    pub fn get(&self, method: PaymentMethod) -> Option<&PaymentMethodFee> {
        self.rules.iter().find(|r| r.method == method)
    }

    pub fn rules(&self) -> &[PaymentMethodFee] {
        &self.rules
    }

    /// Rules that customers may currently choose.
    pub fn enabled(&self) -> impl Iterator<Item = &PaymentMethodFee> {
        self.rules.iter().filter(|r| r.enabled)
    }

    /// Fee preview list: one breakdown per enabled method.
    pub fn preview(&self, invoice_amount: Decimal) -> Result<Vec<(PaymentMethod, PaymentFeeBreakdown)>> {
        self.enabled()
            .map(|rule| calculate_fees(invoice_amount, rule).map(|b| (rule.method, b)))
            .collect()
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self::standard()
    }
}

impl TryFrom<Vec<PaymentMethodFee>> for FeeSchedule {
    type Error = Error;

    fn try_from(rules: Vec<PaymentMethodFee>) -> Result<Self> {
        Self::new(rules)
    }
}

impl From<FeeSchedule> for Vec<PaymentMethodFee> {
    fn from(schedule: FeeSchedule) -> Self {
        schedule.rules
    }
}
