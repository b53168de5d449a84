//! Payment link entity and its lifecycle.
//!
//! ```text
//!            send          view           pay
//! pending ───────▶ sent ───────▶ viewed ───────▶ paid
//!    │              │              │
//!    └──────────────┴──────────────┴──▶ expired | cancelled | failed
//! ```
//!
//! Transitions are plain methods on [`PaymentLink`] that take the current time.
//! Expiry is lazy: every transition first checks `now >= expires_at` and, if so,
//! moves the link to `expired` and fails with `Error::Expired`. Terminal links
//! reject every transition with `Error::TerminalState` and are left untouched.
//! Persisting the outcome is the job of [`PaymentLinkService`](crate::service::PaymentLinkService).

pub mod token;

use crate::entity::Record;
use crate::error::{Error, Result};
use crate::fee::{calculate_fees, PaymentFeeBreakdown, PaymentMethod, PaymentMethodFee};
use crate::money::ensure_non_negative;
use crate::strategy::ExpiryWindow;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle status of a payment link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Pending,
    Sent,
    Viewed,
    Paid,
    Expired,
    #[serde(alias = "voided")]
    Cancelled,
    Failed,
}

impl LinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::Pending => "pending",
            LinkStatus::Sent => "sent",
            LinkStatus::Viewed => "viewed",
            LinkStatus::Paid => "paid",
            LinkStatus::Expired => "expired",
            LinkStatus::Cancelled => "cancelled",
            LinkStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LinkStatus::Paid | LinkStatus::Expired | LinkStatus::Cancelled | LinkStatus::Failed
        )
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery channel for a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Email => write!(f, "email"),
            Channel::Sms => write!(f, "sms"),
        }
    }
}

/// Customer the link is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerContact {
    pub customer_id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl CustomerContact {
    /// Destination for `channel`, ignoring blank values.
    pub fn destination(&self, channel: Channel) -> Option<&str> {
        let value = match channel {
            Channel::Email => self.email.as_deref(),
            Channel::Sms => self.phone.as_deref(),
        };
        value.map(str::trim).filter(|v| !v.is_empty())
    }
}

/// The invoice a link collects, with the balance to be paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRef {
    pub invoice_id: String,
    pub invoice_number: String,
    pub order_id: Option<String>,
    pub balance_due: Decimal,
}

/// Outcome of a successful payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub method: PaymentMethod,
    pub breakdown: PaymentFeeBreakdown,
    /// Gateway transaction reference, when the caller has one
    pub reference: Option<String>,
}

/// A shareable link through which a customer pays one invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentLink {
    pub id: Uuid,
    pub token: String,
    pub url: String,
    pub invoice_id: String,
    pub invoice_number: String,
    pub order_id: Option<String>,
    pub customer: CustomerContact,
    pub invoice_amount: Decimal,
    pub available_methods: Vec<PaymentMethodFee>,
    pub status: LinkStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub sent_via_email: bool,
    pub sent_via_sms: bool,
    pub send_count: u32,
    pub viewed_at: Option<DateTime<Utc>>,
    pub view_count: u32,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment: Option<PaymentRecord>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub failure_reason: Option<String>,
}

impl PaymentLink {
    /// Build a fresh `pending` link.
    ///
    /// # Errors
    ///
    /// `Error::ValidationError` for a negative balance, a blank invoice id or
    /// an empty method list.
    pub fn new(
        invoice: &InvoiceRef,
        customer: &CustomerContact,
        available_methods: Vec<PaymentMethodFee>,
        token: String,
        origin: &str,
        window: ExpiryWindow,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let invoice_amount = ensure_non_negative(invoice.balance_due, "invoice balance")?;
        if invoice.invoice_id.trim().is_empty() {
            return Err(Error::ValidationError("invoice id is required".to_string()));
        }
        if available_methods.is_empty() {
            return Err(Error::ValidationError(
                "at least one payment method must be offered".to_string(),
            ));
        }

        Ok(PaymentLink {
            id: Uuid::now_v7(),
            url: token::payment_url(origin, &token),
            token,
            invoice_id: invoice.invoice_id.clone(),
            invoice_number: invoice.invoice_number.clone(),
            order_id: invoice.order_id.clone(),
            customer: customer.clone(),
            invoice_amount,
            available_methods,
            status: LinkStatus::Pending,
            created_at: now,
            expires_at: now + window.duration(),
            updated_at: now,
            sent_at: None,
            sent_via_email: false,
            sent_via_sms: false,
            send_count: 0,
            viewed_at: None,
            view_count: 0,
            paid_at: None,
            payment: None,
            cancelled_at: None,
            cancel_reason: None,
            failure_reason: None,
        })
    }

    /// Swap in a new token (and URL) before the link is first stored.
    pub fn reissue_token(&mut self, token: String, origin: &str) {
        self.url = token::payment_url(origin, &token);
        self.token = token;
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Non-terminal and not past expiry.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_terminal() && !self.is_expired_at(now)
    }

    /// Fee breakdown for every enabled method offered on this link.
    pub fn fee_preview(&self) -> Result<Vec<(PaymentMethod, PaymentFeeBreakdown)>> {
        self.available_methods
            .iter()
            .filter(|rule| rule.enabled)
            .map(|rule| calculate_fees(self.invoice_amount, rule).map(|b| (rule.method, b)))
            .collect()
    }

    /// Common precondition for every transition: not finalized, not expired.
    ///
    /// A link found past its expiry is moved to `expired` here, so the caller
    /// must persist it even though an error is returned.
    fn ensure_open(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.is_terminal() {
            return Err(Error::TerminalState {
                status: self.status,
            });
        }
        if self.is_expired_at(now) {
            self.status = LinkStatus::Expired;
            self.updated_at = now;
            return Err(Error::Expired {
                expires_at: self.expires_at,
            });
        }
        Ok(())
    }

    /// Record a dispatch over `channel`. Repeated sends are allowed.
    pub fn send(&mut self, channel: Channel, now: DateTime<Utc>) -> Result<()> {
        self.ensure_open(now)?;
        if self.customer.destination(channel).is_none() {
            return Err(Error::ValidationError(format!(
                "customer {} has no {} destination",
                self.customer.customer_id, channel
            )));
        }

        match channel {
            Channel::Email => self.sent_via_email = true,
            Channel::Sms => self.sent_via_sms = true,
        }
        self.send_count += 1;
        self.sent_at = Some(now);
        // a link the customer already opened stays `viewed`
        if self.status == LinkStatus::Pending {
            self.status = LinkStatus::Sent;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Record the customer opening the link.
    pub fn view(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_open(now)?;
        self.view_count += 1;
        if self.viewed_at.is_none() {
            self.viewed_at = Some(now);
        }
        self.status = LinkStatus::Viewed;
        self.updated_at = now;
        Ok(())
    }

    /// Settle the link with `method`. Terminal.
    ///
    /// # Errors
    ///
    /// - `Error::TerminalState` if already finalized
    /// - `Error::Expired` if `now >= expires_at` (link is now `expired`)
    /// - `Error::ValidationError` if the method is not offered or disabled
    pub fn pay(
        &mut self,
        method: PaymentMethod,
        reference: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<&PaymentRecord> {
        self.ensure_open(now)?;

        let rule = self
            .available_methods
            .iter()
            .find(|r| r.method == method)
            .ok_or_else(|| {
                Error::ValidationError(format!("{} is not offered on this link", method))
            })?;
        if !rule.enabled {
            return Err(Error::ValidationError(format!(
                "{} is currently disabled",
                method
            )));
        }

        let breakdown = calculate_fees(self.invoice_amount, rule)?;
        self.status = LinkStatus::Paid;
        self.paid_at = Some(now);
        self.updated_at = now;
        Ok(&*self.payment.insert(PaymentRecord {
            method,
            breakdown,
            reference,
        }))
    }

    /// Record a failed payment attempt. Terminal.
    pub fn fail(&mut self, reason: &str, now: DateTime<Utc>) -> Result<()> {
        self.ensure_open(now)?;
        self.status = LinkStatus::Failed;
        self.failure_reason = Some(reason.trim().to_string());
        self.updated_at = now;
        Ok(())
    }

    /// Void the link by staff action. Terminal; `reason` must not be blank.
    pub fn cancel(&mut self, reason: &str, now: DateTime<Utc>) -> Result<()> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(Error::ValidationError(
                "a cancellation reason is required".to_string(),
            ));
        }
        self.ensure_open(now)?;
        self.status = LinkStatus::Cancelled;
        self.cancelled_at = Some(now);
        self.cancel_reason = Some(reason.to_string());
        self.updated_at = now;
        Ok(())
    }

    /// Move the link to `expired` if it is open and past its expiry.
    ///
    /// Returns whether the status changed. Finalized links are reported as
    /// unchanged rather than as an error, since nothing was asked of them.
    pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_terminal() || !self.is_expired_at(now) {
            return false;
        }
        self.status = LinkStatus::Expired;
        self.updated_at = now;
        true
    }
}

impl Record for PaymentLink {
    type Key = Uuid;

    fn record_key(&self) -> Self::Key {
        self.id
    }

    fn record_prefix() -> &'static str {
        "payment_link"
    }

    /// `paid_at` and `payment` are present exactly when the link is paid.
    fn validate(&self) -> Result<()> {
        let paid = self.status == LinkStatus::Paid;
        if paid != self.paid_at.is_some() || paid != self.payment.is_some() {
            return Err(Error::InvalidRecord(format!(
                "payment link {} is {} but paid_at/payment disagree",
                self.id, self.status
            )));
        }
        Ok(())
    }
}
