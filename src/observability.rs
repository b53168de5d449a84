//! Metrics hooks for payment-link operations.
//!
//! Implement [`LinkMetrics`] to feed your monitoring system:
//!
//! ```ignore
//! use billpay_kit::observability::LinkMetrics;
//! use billpay_kit::link::PaymentLink;
//! use std::time::Duration;
//!
//! struct PrometheusMetrics;
//!
//! impl LinkMetrics for PrometheusMetrics {
//!     /// Called only when `action` changed the stored link.
//!     fn record_transition(&self, link: &PaymentLink, action: &str, duration: Duration) {
//!         // counter!("payment_link_transitions", "action" => action).inc();
//!         // histogram!("payment_link_latency").record(duration);
//!     }
//! }
//!
//! // let service = PaymentLinkService::new(backend, config)?
//! //     .with_metrics(Box::new(PrometheusMetrics));
//! ```
//!
//! Methods that are not overridden log through the `log` crate. The service
//! defaults to [`NoOpMetrics`], which records nothing.
//!
//! | Hook | Fired when |
//! |------|------------|
//! | `record_generated` | A new link was stored |
//! | `record_transition` | A transition was applied and saved |
//! | `record_rejected` | A transition failed (terminal, expired, invalid input) |
//! | `record_conflict` | A compare-and-swap save lost a race |

use crate::error::Error;
use crate::link::PaymentLink;
use std::time::Duration;

/// Trait for payment-link metrics collection.
pub trait LinkMetrics: Send + Sync {
    fn record_generated(&self, link: &PaymentLink) {
        info!(
            "Payment link {} generated for invoice {} ({}), expires {}",
            link.token,
            link.invoice_number,
            link.invoice_amount,
            link.expires_at.to_rfc3339()
        );
    }

    fn record_transition(&self, link: &PaymentLink, action: &str, duration: Duration) {
        debug!(
            "Payment link {} {} -> {} took {:?}",
            link.token, action, link.status, duration
        );
    }

    fn record_rejected(&self, token: &str, action: &str, error: &Error) {
        warn!("Payment link {} rejected {}: {}", token, action, error);
    }

    /// `attempt` counts from 1.
    fn record_conflict(&self, token: &str, attempt: u32) {
        warn!("Payment link {} save conflict on attempt {}", token, attempt);
    }
}

/// Default metrics implementation (no-op).
#[derive(Clone, Default)]
pub struct NoOpMetrics;

impl LinkMetrics for NoOpMetrics {
    fn record_generated(&self, _link: &PaymentLink) {}
    fn record_transition(&self, _link: &PaymentLink, _action: &str, _duration: Duration) {}
    fn record_rejected(&self, _token: &str, _action: &str, _error: &Error) {}
    fn record_conflict(&self, _token: &str, _attempt: u32) {}
}

/// Logs through the default trait methods.
#[derive(Clone, Default)]
pub struct LogMetrics;

impl LinkMetrics for LogMetrics {}
