//! High-level services for the collections dashboard.
//!
//! - [`PaymentLinkService`]: generate links and drive their lifecycle with
//!   optimistic concurrency (load, apply, compare-and-swap, retry on conflict).
//! - [`ReceivablesService`]: summary tiles, branch lists and payment recording
//!   over an injected [`ReceivablesRepository`].
//!
//! Both are `Clone` and cheap to share across tasks.

use crate::backend::StoreBackend;
use crate::config::{OperationConfig, PaymentsConfig};
use crate::error::{Error, Result};
use crate::fee::PaymentMethod;
use crate::link::token::{generate_token, is_well_formed};
use crate::link::{Channel, CustomerContact, InvoiceRef, PaymentLink};
use crate::observability::{LinkMetrics, NoOpMetrics};
use crate::receivable::{BranchScope, Receivable};
use crate::repository::ReceivablesRepository;
use crate::store::{InvoiceClaim, PaymentLinkStore, Versioned};
use crate::strategy::{ActiveLinkPolicy, ExpiryWindow};
use crate::summary::{summarize, ReceivablesSummary};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Source of "now" for lifecycle decisions.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Reason recorded on links replaced under [`ActiveLinkPolicy::Supersede`].
pub const SUPERSEDED_REASON: &str = "superseded";

/// Payment-link lifecycle service.
///
/// # Example
///
/// ```no_run
/// use billpay_kit::backend::InMemoryBackend;
/// use billpay_kit::config::PaymentsConfig;
/// use billpay_kit::fee::PaymentMethod;
/// use billpay_kit::link::{CustomerContact, InvoiceRef};
/// use billpay_kit::service::PaymentLinkService;
/// use rust_decimal::Decimal;
///
/// #[tokio::main]
/// async fn main() -> billpay_kit::Result<()> {
///     let service = PaymentLinkService::new(InMemoryBackend::new(), PaymentsConfig::default())?;
///
///     let invoice = InvoiceRef {
///         invoice_id: "INV-2024-0117".to_string(),
///         invoice_number: "INV-2024-0117".to_string(),
///         order_id: None,
///         balance_due: Decimal::from(36550),
///     };
///     let contact = CustomerContact {
///         customer_id: "CUST-014".to_string(),
///         name: "Davao Plumbing Supply".to_string(),
///         email: Some("ap@davaoplumbing.ph".to_string()),
///         phone: None,
///     };
///
///     let link = service.generate_payment_link(&invoice, &contact, None).await?;
///     let paid = service.pay(&link.id, PaymentMethod::GCash, None).await?;
///     assert!(paid.payment.is_some());
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct PaymentLinkService<B: StoreBackend> {
    store: PaymentLinkStore<B>,
    config: Arc<PaymentsConfig>,
    metrics: Arc<dyn LinkMetrics>,
    clock: Clock,
}

impl<B: StoreBackend> PaymentLinkService<B> {
    /// Create a service over `backend`.
    ///
    /// # Errors
    ///
    /// `Error::ConfigError` if `config` does not validate.
    pub fn new(backend: B, config: PaymentsConfig) -> Result<Self> {
        config.validate()?;
        Ok(PaymentLinkService {
            store: PaymentLinkStore::new(backend),
            config: Arc::new(config),
            metrics: Arc::new(NoOpMetrics),
            clock: system_clock(),
        })
    }

    /// Set custom metrics handler.
    pub fn with_metrics(mut self, metrics: Box<dyn LinkMetrics>) -> Self {
        self.metrics = Arc::from(metrics);
        self
    }

    /// Replace the clock (tests, replays).
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &PaymentsConfig {
        &self.config
    }

    pub fn store(&self) -> &PaymentLinkStore<B> {
        &self.store
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Generate a `pending` link for `invoice`.
    ///
    /// `window` falls back to `config.default_expiry`. The invoice's existing
    /// active links are handled per `config.active_link_policy`. The request is
    /// validated before any existing link is touched.
    ///
    /// # Errors
    ///
    /// - `Error::ValidationError`: negative balance, blank invoice id
    /// - `Error::ActiveLinkExists`: policy is `Reject` and a link is active
    /// - `Error::Conflict`: another generation for the invoice kept winning, or
    ///   token collisions exhausted the retry budget
    pub async fn generate_payment_link(
        &self,
        invoice: &InvoiceRef,
        contact: &CustomerContact,
        window: Option<ExpiryWindow>,
    ) -> Result<PaymentLink> {
        let window = window.unwrap_or(self.config.default_expiry);
        let methods: Vec<_> = self.config.fee_schedule.enabled().cloned().collect();
        let mut link = PaymentLink::new(
            invoice,
            contact,
            methods,
            generate_token(self.config.token_length)?,
            &self.config.link_origin,
            window,
            self.now(),
        )?;

        let claim = self.apply_active_link_policy(&link).await?;

        match self.insert_with_fresh_tokens(&mut link).await {
            Ok(stored) => {
                self.metrics.record_generated(&stored.record);
                Ok(stored.record)
            }
            Err(e) => {
                if let Some(revision) = claim {
                    if let Err(release) = self
                        .store
                        .release_invoice_claim(&link.invoice_id, revision)
                        .await
                    {
                        warn!(
                            "Failed to release claim on invoice {}: {}",
                            link.invoice_id, release
                        );
                    }
                }
                Err(e)
            }
        }
    }

    /// Insert `link`, drawing a new token whenever the current one collides.
    async fn insert_with_fresh_tokens(&self, link: &mut PaymentLink) -> Result<Versioned<PaymentLink>> {
        let max_attempts = self.config.operation.retry_count + 1;
        let mut attempts = 0;

        loop {
            attempts += 1;
            match self.store.insert(link).await {
                Ok(stored) => return Ok(stored),
                Err(e) if e.is_conflict() && attempts < max_attempts => {
                    self.metrics.record_conflict(&link.token, attempts);
                    link.reissue_token(
                        generate_token(self.config.token_length)?,
                        &self.config.link_origin,
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Enforce the active-link policy for `link`'s invoice.
    ///
    /// Under `Reject` and `Supersede` this ends with `link` holding the
    /// invoice claim; the claim revision is returned so a failed insert can
    /// release it.
    async fn apply_active_link_policy(&self, link: &PaymentLink) -> Result<Option<u64>> {
        let policy = self.config.active_link_policy;
        if policy == ActiveLinkPolicy::AllowMultiple {
            return Ok(None);
        }

        self.settle_unclaimed_links(link, policy).await?;
        self.claim_invoice(link, policy).await.map(Some)
    }

    /// Links generated while the policy was `AllowMultiple` hold no claim.
    async fn settle_unclaimed_links(&self, link: &PaymentLink, policy: ActiveLinkPolicy) -> Result<()> {
        let now = self.now();
        let active: Vec<Versioned<PaymentLink>> = self
            .store
            .fetch_by_invoice(&link.invoice_id)
            .await?
            .into_iter()
            .filter(|v| v.record.is_active_at(now))
            .collect();

        match policy {
            ActiveLinkPolicy::Reject => match active.first() {
                Some(existing) => Err(self.reject_generation(&existing.record)),
                None => Ok(()),
            },
            ActiveLinkPolicy::Supersede => {
                for existing in active {
                    self.supersede(&existing.record.id).await?;
                }
                Ok(())
            }
            ActiveLinkPolicy::AllowMultiple => Ok(()),
        }
    }

    /// Point the invoice claim at `link`.
    ///
    /// A claim is free when it was released or its holder is no longer active.
    /// A holder that is not stored yet belongs to a generation in flight.
    async fn claim_invoice(&self, link: &PaymentLink, policy: ActiveLinkPolicy) -> Result<u64> {
        let invoice_id = link.invoice_id.as_str();
        let op = &self.config.operation;
        let mut conflicts = 0;

        loop {
            let claim = self.store.fetch_invoice_claim(invoice_id).await?;
            let outcome = match claim {
                None => self.store.claim_invoice(invoice_id, &link.id, None).await,
                Some(InvoiceClaim { holder: None, revision }) => {
                    self.store.claim_invoice(invoice_id, &link.id, Some(revision)).await
                }
                Some(InvoiceClaim { holder: Some(holder_id), revision }) => {
                    match self.store.fetch_by_id(&holder_id).await? {
                        None => Err(Error::Conflict(format!(
                            "payment link generation for invoice {} in progress",
                            invoice_id
                        ))),
                        Some(holder) if holder.record.is_active_at(self.now()) => {
                            if policy == ActiveLinkPolicy::Reject {
                                return Err(self.reject_generation(&holder.record));
                            }
                            self.supersede(&holder_id).await?;
                            continue;
                        }
                        Some(_) => self.store.claim_invoice(invoice_id, &link.id, Some(revision)).await,
                    }
                }
            };

            match outcome {
                Ok(revision) => return Ok(revision),
                Err(e) if e.is_conflict() && conflicts < op.retry_count => {
                    conflicts += 1;
                    self.metrics.record_conflict(&link.token, conflicts);
                    debug!(
                        "Claim on invoice {} contended (attempt {}/{}), retrying...",
                        invoice_id, conflicts, op.retry_count
                    );
                    tokio::time::sleep(op.backoff(conflicts)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn reject_generation(&self, existing: &PaymentLink) -> Error {
        let err = Error::ActiveLinkExists {
            invoice_id: existing.invoice_id.clone(),
            token: existing.token.clone(),
        };
        self.metrics.record_rejected(&existing.token, "generate", &err);
        err
    }

    async fn supersede(&self, id: &Uuid) -> Result<()> {
        match self.cancel(id, SUPERSEDED_REASON).await {
            // finalized concurrently; nothing left to supersede
            Ok(_) | Err(Error::TerminalState { .. }) | Err(Error::Expired { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Release the invoice claim if `link` still holds it.
    async fn release_claim_held_by(&self, link: &PaymentLink) {
        let released = match self.store.fetch_invoice_claim(&link.invoice_id).await {
            Ok(Some(claim)) if claim.holder == Some(link.id) => self
                .store
                .release_invoice_claim(&link.invoice_id, claim.revision)
                .await
                .map(|_| ()),
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };
        match released {
            Ok(()) => {}
            Err(e) if e.is_conflict() => {
                debug!("Claim on invoice {} already taken over", link.invoice_id);
            }
            Err(e) => warn!("Failed to release claim on invoice {}: {}", link.invoice_id, e),
        }
    }

    /// Fetch a link by id, without evaluating expiry.
    pub async fn get(&self, id: &Uuid) -> Result<Option<PaymentLink>> {
        Ok(self.store.fetch_by_id(id).await?.map(|v| v.record))
    }

    /// Fetch a link by its public token, without evaluating expiry.
    pub async fn get_by_token(&self, token: &str) -> Result<Option<PaymentLink>> {
        if !is_well_formed(token) {
            debug!("Ignoring malformed payment link token {:?}", token);
            return Ok(None);
        }
        Ok(self.store.fetch_by_token(token).await?.map(|v| v.record))
    }

    pub async fn links_for_invoice(&self, invoice_id: &str) -> Result<Vec<PaymentLink>> {
        Ok(self
            .store
            .fetch_by_invoice(invoice_id)
            .await?
            .into_iter()
            .map(|v| v.record)
            .collect())
    }

    /// Record a dispatch over `channel`.
    pub async fn send(&self, id: &Uuid, channel: Channel) -> Result<PaymentLink> {
        self.transition(id, "send", |link, now| link.send(channel, now))
            .await
            .map(|(link, _)| link)
    }

    /// Record the customer opening the link.
    pub async fn record_view(&self, id: &Uuid) -> Result<PaymentLink> {
        self.transition(id, "view", |link, now| link.view(now))
            .await
            .map(|(link, _)| link)
    }

    /// Settle the link. At most one concurrent caller succeeds; the others see
    /// `Error::TerminalState`.
    ///
    /// # Errors
    ///
    /// - `Error::Expired`: the link was past expiry; it is stored as `expired`
    /// - `Error::TerminalState`: the link is already finalized
    /// - `Error::ValidationError`: method not offered or disabled
    pub async fn pay(
        &self,
        id: &Uuid,
        method: PaymentMethod,
        reference: Option<String>,
    ) -> Result<PaymentLink> {
        let (link, record) = self
            .transition(id, "pay", |link, now| {
                link.pay(method, reference.clone(), now).cloned()
            })
            .await?;
        info!(
            "Payment link {} paid via {}: {} collected",
            link.token, record.method, record.breakdown.total_amount
        );
        Ok(link)
    }

    /// Record a failed gateway attempt.
    pub async fn record_failure(&self, id: &Uuid, reason: &str) -> Result<PaymentLink> {
        self.transition(id, "fail", |link, now| link.fail(reason, now))
            .await
            .map(|(link, _)| link)
    }

    /// Void the link.
    pub async fn cancel(&self, id: &Uuid, reason: &str) -> Result<PaymentLink> {
        let (link, _) = self
            .transition(id, "cancel", |link, now| link.cancel(reason, now))
            .await?;
        info!("Payment link {} cancelled: {}", link.token, reason.trim());
        Ok(link)
    }

    /// Persist expiry for a link past its deadline. Returns the current link
    /// either way; finalized links are returned unchanged.
    pub async fn expire_if_due(&self, id: &Uuid) -> Result<PaymentLink> {
        self.transition(id, "expire", |link, now| Ok(link.expire_if_due(now)))
            .await
            .map(|(link, _)| link)
    }

    /// Load, apply, compare-and-swap; reload and re-apply on conflict.
    ///
    /// The link is saved whenever `apply` changed it, including when it failed
    /// with `Error::Expired`, so lazy expiry is persisted before the error is
    /// returned. Only changes are reported as transitions. A link that became
    /// terminal gives up its invoice claim. Retries up to
    /// `config.operation.retry_count` times with exponential backoff, then
    /// surfaces `Error::Conflict`.
    async fn transition<T, F>(&self, id: &Uuid, action: &str, mut apply: F) -> Result<(PaymentLink, T)>
    where
        F: FnMut(&mut PaymentLink, DateTime<Utc>) -> Result<T>,
    {
        let timer = Instant::now();
        let op = &self.config.operation;
        let max_attempts = op.retry_count + 1;
        let mut attempts = 0;

        loop {
            attempts += 1;

            let current = self
                .store
                .fetch_by_id(id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("payment link {}", id)))?;
            let mut link = current.record.clone();
            let outcome = apply(&mut link, self.now());
            let changed = link != current.record;

            if changed {
                match self.store.save(&link, current.revision).await {
                    Ok(_) => {}
                    Err(e) if e.is_conflict() => {
                        self.metrics.record_conflict(&link.token, attempts);
                        if attempts >= max_attempts {
                            return Err(e);
                        }
                        debug!(
                            "Payment link {} {} conflicted (attempt {}/{}), retrying...",
                            link.token, action, attempts, max_attempts
                        );
                        tokio::time::sleep(op.backoff(attempts)).await;
                        continue;
                    }
                    Err(e) => return Err(e),
                }
                if link.is_terminal() {
                    self.release_claim_held_by(&link).await;
                }
            }

            return match outcome {
                Ok(value) => {
                    if changed {
                        self.metrics.record_transition(&link, action, timer.elapsed());
                    }
                    Ok((link, value))
                }
                Err(e) => {
                    if matches!(e, Error::Expired { .. }) {
                        warn!("Payment link {} expired at {}", link.token, link.expires_at);
                    }
                    self.metrics.record_rejected(&link.token, action, &e);
                    Err(e)
                }
            };
        }
    }
}

/// Receivables dashboard service.
#[derive(Clone)]
pub struct ReceivablesService<R: ReceivablesRepository> {
    repository: Arc<R>,
    operation: OperationConfig,
    clock: Clock,
}

impl<R: ReceivablesRepository> ReceivablesService<R> {
    pub fn new(repository: R) -> Self {
        ReceivablesService {
            repository: Arc::new(repository),
            operation: OperationConfig::default(),
            clock: system_clock(),
        }
    }

    /// Replace the clock (tests, replays).
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Retry budget for payments that lose a compare-and-swap race.
    pub fn with_operation(mut self, operation: OperationConfig) -> Self {
        self.operation = operation;
        self
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    fn today(&self) -> NaiveDate {
        (self.clock)().date_naive()
    }

    /// Summary tiles for `scope` as of today.
    pub async fn get_receivables_summary(&self, scope: &BranchScope) -> Result<ReceivablesSummary> {
        self.get_receivables_summary_at(scope, self.today()).await
    }

    /// Summary tiles for `scope` as of `today`.
    pub async fn get_receivables_summary_at(
        &self,
        scope: &BranchScope,
        today: NaiveDate,
    ) -> Result<ReceivablesSummary> {
        let receivables = self.repository.fetch_by_branch(scope).await?;
        Ok(summarize(&receivables, scope, today))
    }

    /// Receivables list for `scope`.
    pub async fn get_receivables_by_branch(&self, scope: &BranchScope) -> Result<Vec<Receivable>> {
        self.repository.fetch_by_branch(scope).await
    }

    /// Apply a payment to a receivable and persist it with compare-and-swap.
    ///
    /// A payment that loses a race is re-applied to the fresh record, so the
    /// overpayment check always sees every earlier payment.
    ///
    /// # Errors
    ///
    /// - `Error::NotFound`: unknown receivable
    /// - `Error::ValidationError`: non-positive amount or overpayment
    /// - `Error::Conflict`: the retry budget ran out
    pub async fn record_payment(&self, id: &str, amount: Decimal) -> Result<Receivable> {
        let op = &self.operation;
        let max_attempts = op.retry_count + 1;
        let mut attempts = 0;

        loop {
            attempts += 1;

            let current = self
                .repository
                .fetch_versioned(id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("receivable {}", id)))?;
            let mut receivable = current.record;
            let balance = receivable.apply_payment(amount, self.today())?;

            match self
                .repository
                .compare_and_swap(receivable.clone(), current.revision)
                .await
            {
                Ok(_) => {
                    info!(
                        "Receivable {} payment of {} recorded, balance {} ({})",
                        receivable.invoice_number, amount, balance, receivable.status
                    );
                    return Ok(receivable);
                }
                Err(e) if e.is_conflict() && attempts < max_attempts => {
                    debug!(
                        "Receivable {} payment conflicted (attempt {}/{}), retrying...",
                        id, attempts, max_attempts
                    );
                    tokio::time::sleep(op.backoff(attempts)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::link::LinkStatus;
    use crate::receivable::ReceivableStatus;
    use crate::repository::InMemoryReceivablesRepository;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
    use std::sync::Mutex;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
    }

    /// Clock that starts at `t0()` and can be moved forward.
    fn manual_clock() -> (Clock, Arc<AtomicI64>) {
        let offset = Arc::new(AtomicI64::new(0));
        let handle = offset.clone();
        let clock: Clock =
            Arc::new(move || t0() + Duration::seconds(handle.load(Ordering::SeqCst)));
        (clock, offset)
    }

    fn invoice(id: &str) -> InvoiceRef {
        InvoiceRef {
            invoice_id: id.to_string(),
            invoice_number: id.to_string(),
            order_id: Some("SO-88".to_string()),
            balance_due: dec!(36550),
        }
    }

    fn contact() -> CustomerContact {
        CustomerContact {
            customer_id: "CUST-014".to_string(),
            name: "Davao Plumbing Supply".to_string(),
            email: Some("ap@davaoplumbing.ph".to_string()),
            phone: Some("+639171112222".to_string()),
        }
    }

    fn service(policy: ActiveLinkPolicy) -> (PaymentLinkService<InMemoryBackend>, Arc<AtomicI64>) {
        let config = PaymentsConfig {
            active_link_policy: policy,
            link_origin: "https://pay.example.ph".to_string(),
            ..PaymentsConfig::default()
        };
        let (clock, offset) = manual_clock();
        let service = PaymentLinkService::new(InMemoryBackend::new(), config)
            .expect("Failed to create service")
            .with_clock(clock);
        (service, offset)
    }

    #[tokio::test]
    async fn test_generate_uses_config() {
        let (service, _) = service(ActiveLinkPolicy::Reject);
        let link = service
            .generate_payment_link(&invoice("INV-1"), &contact(), None)
            .await
            .expect("Failed to generate");

        assert_eq!(link.status, LinkStatus::Pending);
        assert_eq!(link.expires_at, t0() + Duration::days(7));
        assert!(link.url.starts_with("https://pay.example.ph/pay/pl_"));
        assert_eq!(link.token.len(), 3 + 24);
        assert_eq!(link.available_methods.len(), 5);

        let by_token = service.get_by_token(&link.token).await.expect("Failed to get");
        assert_eq!(by_token, Some(link));
    }

    #[tokio::test]
    async fn test_reject_policy() {
        let (service, _) = service(ActiveLinkPolicy::Reject);
        let first = service
            .generate_payment_link(&invoice("INV-1"), &contact(), None)
            .await
            .expect("Failed to generate");

        let err = service
            .generate_payment_link(&invoice("INV-1"), &contact(), None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::ActiveLinkExists {
                invoice_id: "INV-1".to_string(),
                token: first.token.clone(),
            }
        );

        // a finalized link no longer blocks generation
        service.cancel(&first.id, "wrong amount").await.expect("Failed to cancel");
        service
            .generate_payment_link(&invoice("INV-1"), &contact(), None)
            .await
            .expect("Failed to generate");
    }

    #[tokio::test]
    async fn test_reject_policy_ignores_expired_links() {
        let (service, offset) = service(ActiveLinkPolicy::Reject);
        service
            .generate_payment_link(&invoice("INV-1"), &contact(), Some(ExpiryWindow::ThreeDays))
            .await
            .expect("Failed to generate");

        offset.store(Duration::days(3).num_seconds(), Ordering::SeqCst);
        service
            .generate_payment_link(&invoice("INV-1"), &contact(), None)
            .await
            .expect("Failed to generate");
    }

    #[tokio::test]
    async fn test_supersede_policy() {
        let (service, _) = service(ActiveLinkPolicy::Supersede);
        let first = service
            .generate_payment_link(&invoice("INV-1"), &contact(), None)
            .await
            .expect("Failed to generate");
        let second = service
            .generate_payment_link(&invoice("INV-1"), &contact(), None)
            .await
            .expect("Failed to generate");

        let first = service.get(&first.id).await.expect("Failed to get").unwrap();
        assert_eq!(first.status, LinkStatus::Cancelled);
        assert_eq!(first.cancel_reason.as_deref(), Some(SUPERSEDED_REASON));
        assert_eq!(second.status, LinkStatus::Pending);
    }

    #[tokio::test]
    async fn test_supersede_keeps_link_when_request_invalid() {
        let (service, _) = service(ActiveLinkPolicy::Supersede);
        let first = service
            .generate_payment_link(&invoice("INV-1"), &contact(), None)
            .await
            .expect("Failed to generate");

        let mut bad = invoice("INV-1");
        bad.balance_due = dec!(-5);
        let err = service
            .generate_payment_link(&bad, &contact(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ValidationError(_)));

        let first = service.get(&first.id).await.expect("Failed to get").unwrap();
        assert_eq!(first.status, LinkStatus::Pending);
        let claim = service
            .store()
            .fetch_invoice_claim("INV-1")
            .await
            .expect("Failed to fetch claim")
            .unwrap();
        assert_eq!(claim.holder, Some(first.id));
    }

    #[tokio::test]
    async fn test_terminal_link_releases_claim() {
        let (service, _) = service(ActiveLinkPolicy::Reject);
        let link = service
            .generate_payment_link(&invoice("INV-1"), &contact(), None)
            .await
            .expect("Failed to generate");
        let claim = |s: &PaymentLinkService<InMemoryBackend>| {
            let store = s.store().clone();
            async move { store.fetch_invoice_claim("INV-1").await.expect("Failed to fetch claim") }
        };
        assert_eq!(claim(&service).await.and_then(|c| c.holder), Some(link.id));

        service.record_failure(&link.id, "gateway timeout").await.expect("Failed to fail");
        assert_eq!(claim(&service).await.and_then(|c| c.holder), None);

        let next = service
            .generate_payment_link(&invoice("INV-1"), &contact(), None)
            .await
            .expect("Failed to generate");
        assert_eq!(claim(&service).await.and_then(|c| c.holder), Some(next.id));
    }

    #[tokio::test]
    async fn test_allow_multiple_policy() {
        let (service, _) = service(ActiveLinkPolicy::AllowMultiple);
        for _ in 0..3 {
            service
                .generate_payment_link(&invoice("INV-1"), &contact(), None)
                .await
                .expect("Failed to generate");
        }
        let links = service.links_for_invoice("INV-1").await.expect("Failed to list");
        assert_eq!(links.len(), 3);
        assert!(links.iter().all(|l| l.status == LinkStatus::Pending));
    }

    #[tokio::test]
    async fn test_pay_after_expiry_is_persisted() {
        let (service, offset) = service(ActiveLinkPolicy::Reject);
        let link = service
            .generate_payment_link(&invoice("INV-1"), &contact(), None)
            .await
            .expect("Failed to generate");

        offset.store(Duration::days(8).num_seconds(), Ordering::SeqCst);
        let err = service
            .pay(&link.id, PaymentMethod::GCash, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Expired { .. }));

        let stored = service.get(&link.id).await.expect("Failed to get").unwrap();
        assert_eq!(stored.status, LinkStatus::Expired);
        assert!(stored.paid_at.is_none());
    }

    struct CountTransitions(Arc<AtomicU32>);

    impl LinkMetrics for CountTransitions {
        fn record_transition(&self, _link: &PaymentLink, _action: &str, _duration: std::time::Duration) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_expire_if_due_reports_only_real_expiry() {
        let (service, offset) = service(ActiveLinkPolicy::Reject);
        let count = Arc::new(AtomicU32::new(0));
        let service = service.with_metrics(Box::new(CountTransitions(count.clone())));
        let link = service
            .generate_payment_link(&invoice("INV-1"), &contact(), None)
            .await
            .expect("Failed to generate");

        service.expire_if_due(&link.id).await.expect("Failed to check");
        assert_eq!(count.load(Ordering::SeqCst), 0);

        offset.store(Duration::days(7).num_seconds(), Ordering::SeqCst);
        let expired = service.expire_if_due(&link.id).await.expect("Failed to expire");
        assert_eq!(expired.status, LinkStatus::Expired);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        service.expire_if_due(&link.id).await.expect("Failed to check");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_by_malformed_token() {
        let (service, _) = service(ActiveLinkPolicy::Reject);
        service
            .generate_payment_link(&invoice("INV-1"), &contact(), None)
            .await
            .expect("Failed to generate");

        for token in ["", "pl_short", "../../etc/passwd", "PAY-ABC1234"] {
            assert_eq!(service.get_by_token(token).await.expect("Failed to get"), None);
        }
    }

    #[tokio::test]
    async fn test_unknown_link() {
        let (service, _) = service(ActiveLinkPolicy::Reject);
        let err = service.record_view(&Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_service_clone_shares_store() {
        let (service, _) = service(ActiveLinkPolicy::Reject);
        let clone = service.clone();
        let link = service
            .generate_payment_link(&invoice("INV-1"), &contact(), None)
            .await
            .expect("Failed to generate");
        assert!(clone.get(&link.id).await.expect("Failed to get").is_some());
    }

    fn receivable(id: &str, branch: &str, due: NaiveDate, amount: Decimal) -> Receivable {
        Receivable {
            id: id.to_string(),
            invoice_number: format!("INV-{}", id),
            customer_id: format!("C-{}", id),
            customer_name: "Ace Pipes".to_string(),
            invoice_date: due - Duration::days(30),
            due_date: due,
            invoice_amount: amount,
            amount_paid: Decimal::ZERO,
            status: ReceivableStatus::Current,
            assigned_agent: "Joy Santos".to_string(),
            branch: branch.to_string(),
            last_payment_date: None,
        }
    }

    #[tokio::test]
    async fn test_receivables_service() {
        let today = t0().date_naive();
        let repo = InMemoryReceivablesRepository::with_receivables(vec![
            receivable("1", "Manila", today - Duration::days(4), dec!(1000)),
            receivable("2", "Cebu", today + Duration::days(2), dec!(500)),
        ]);
        let (clock, _) = manual_clock();
        let service = ReceivablesService::new(repo).with_clock(clock);

        let summary = service
            .get_receivables_summary(&BranchScope::All)
            .await
            .expect("Failed to summarize");
        assert_eq!(summary.total_outstanding, dec!(1500));
        assert_eq!(summary.overdue, dec!(1000));
        assert_eq!(summary.due_this_week, dec!(500));
        assert_eq!(summary.avg_days_overdue, 4);

        let manila = service
            .get_receivables_by_branch(&BranchScope::branch("Manila"))
            .await
            .expect("Failed to list");
        assert_eq!(manila.len(), 1);

        let updated = service.record_payment("1", dec!(1000)).await.expect("Failed to pay");
        assert_eq!(updated.status, ReceivableStatus::Collected);
        assert_eq!(updated.last_payment_date, Some(today));

        let summary = service
            .get_receivables_summary(&BranchScope::All)
            .await
            .expect("Failed to summarize");
        assert_eq!(summary.overdue, dec!(0));

        assert!(matches!(
            service.record_payment("missing", dec!(1)).await,
            Err(Error::NotFound(_))
        ));
    }

    /// Lets a rival payment land between `record_payment`'s read and its save.
    struct RacingRepository {
        inner: InMemoryReceivablesRepository,
        rival_payment: Mutex<Option<Decimal>>,
    }

    impl ReceivablesRepository for RacingRepository {
        async fn fetch_versioned(&self, id: &str) -> Result<Option<Versioned<Receivable>>> {
            self.inner.fetch_versioned(id).await
        }

        async fn fetch_all(&self) -> Result<Vec<Receivable>> {
            self.inner.fetch_all().await
        }

        async fn upsert(&self, receivable: Receivable) -> Result<()> {
            self.inner.upsert(receivable).await
        }

        async fn compare_and_swap(&self, receivable: Receivable, expected_revision: u64) -> Result<u64> {
            let rival = self.rival_payment.lock().unwrap().take();
            if let Some(amount) = rival {
                let mut current = self.inner.fetch_by_id(&receivable.id).await?.unwrap();
                current.apply_payment(amount, current.due_date)?;
                self.inner.upsert(current).await?;
            }
            self.inner.compare_and_swap(receivable, expected_revision).await
        }
    }

    fn racing_service(rival: Decimal) -> ReceivablesService<RacingRepository> {
        let today = t0().date_naive();
        let repo = RacingRepository {
            inner: InMemoryReceivablesRepository::with_receivables(vec![receivable(
                "1",
                "Manila",
                today,
                dec!(1000),
            )]),
            rival_payment: Mutex::new(Some(rival)),
        };
        let (clock, _) = manual_clock();
        ReceivablesService::new(repo).with_clock(clock)
    }

    #[tokio::test]
    async fn test_record_payment_reapplies_after_conflict() {
        let service = racing_service(dec!(300));

        let updated = service.record_payment("1", dec!(200)).await.expect("Failed to pay");
        assert_eq!(updated.amount_paid, dec!(500));
        assert_eq!(updated.status, ReceivableStatus::PartiallyPaid);

        let stored = service.repository().fetch_by_id("1").await.expect("Failed to fetch").unwrap();
        assert_eq!(stored.amount_paid, dec!(500));
    }

    #[tokio::test]
    async fn test_record_payment_overpayment_after_conflict() {
        let service = racing_service(dec!(900));

        let err = service.record_payment("1", dec!(200)).await.unwrap_err();
        assert!(matches!(err, Error::ValidationError(_)));

        let stored = service.repository().fetch_by_id("1").await.expect("Failed to fetch").unwrap();
        assert_eq!(stored.amount_paid, dec!(900));
    }

    #[tokio::test]
    async fn test_record_payment_conflict_budget() {
        let service = racing_service(dec!(100)).with_operation(OperationConfig::default().with_retry(0));

        let err = service.record_payment("1", dec!(200)).await.unwrap_err();
        assert!(err.is_conflict());

        let stored = service.repository().fetch_by_id("1").await.expect("Failed to fetch").unwrap();
        assert_eq!(stored.amount_paid, dec!(100));
    }
}
