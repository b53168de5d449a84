//! # billpay-kit
//!
//! Calculation and lifecycle core behind an ERP collections dashboard.
//!
//! ## Features
//!
//! - **Fee calculation:** exact-decimal surcharge model per payment method
//! - **Payment links:** generate, send, view, pay, expire, cancel, fail, with
//!   lazy expiry and optimistic concurrency over a pluggable store
//! - **Receivables:** aging status, payment application and dashboard summaries
//! - **Storage agnostic:** [`backend::StoreBackend`] and
//!   [`repository::ReceivablesRepository`] are the only seams to real storage
//!
//! ## Quick Start
//!
//! ```
//! use billpay_kit::fee::{calculate_fees, FeeSchedule, PaymentMethod};
//! use rust_decimal::Decimal;
//!
//! let schedule = FeeSchedule::standard();
//! for (method, breakdown) in schedule.preview(Decimal::from(36550)).unwrap() {
//!     println!("{}: pay {}", method, breakdown.total_amount);
//! }
//!
//! let gcash = schedule.get(PaymentMethod::GCash).unwrap();
//! let breakdown = calculate_fees(Decimal::from(36550), gcash).unwrap();
//! assert_eq!(breakdown.total_fees, breakdown.gateway_fee + breakdown.service_fee);
//! ```
//!
//! Payment links are driven through [`PaymentLinkService`]:
//!
//! ```ignore
//! let service = PaymentLinkService::new(InMemoryBackend::new(), PaymentsConfig::default())?;
//! let link = service.generate_payment_link(&invoice, &contact, None).await?;
//! service.send(&link.id, Channel::Email).await?;
//! service.pay(&link.id, PaymentMethod::GCash, Some("GC-998812".into())).await?;
//! ```

#[macro_use]
extern crate log;

pub mod backend;
pub mod config;
pub mod entity;
pub mod error;
pub mod fee;
pub mod key;
pub mod link;
pub mod money;
pub mod observability;
pub mod receivable;
pub mod repository;
pub mod serialization;
pub mod service;
pub mod store;
pub mod strategy;
pub mod summary;

// Re-exports for convenience
pub use backend::StoreBackend;
pub use config::{OperationConfig, PaymentsConfig};
pub use entity::Record;
pub use error::{Error, Result};
pub use fee::{calculate_fees, FeeSchedule, PaymentFeeBreakdown, PaymentMethod, PaymentMethodFee};
pub use link::{LinkStatus, PaymentLink};
pub use receivable::{BranchScope, Receivable, ReceivableStatus};
pub use repository::ReceivablesRepository;
pub use service::{PaymentLinkService, ReceivablesService};
pub use strategy::{ActiveLinkPolicy, ExpiryWindow};
pub use summary::{summarize, ReceivablesSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
