//! Resilient payment service.
//!
//! Every provider call goes through `retry → circuit breaker → timeout`.
//! Each operation:
//!
//! 1. generates a transaction id and logs `<action>_start`
//! 2. validates the request (rejections still produce a `_failed` entry)
//! 3. calls the provider, falling back while the circuit is open
//! 4. logs `<action>_success` or `<action>_failed`, records metrics
//! 5. publishes an event and returns a flat response
//!
//! Errors never escape: the service boundary turns them into failure responses.

use std::future::Future;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::time::Instant;
use uuid::Uuid;

use super::classify::should_retry_payment;
use super::error::PaymentError;
use super::events::{EventBus, PaymentEvent};
use super::transaction_log::{TransactionLog, TransactionLogEntry};
use super::types::{
    CustomerRequest, CustomerResponse, HealthMetrics, PaymentMethodRequest, PaymentMethodResponse, PaymentRequest,
    PaymentResponse, RefundRequest, RefundResponse,
};
use super::validation::{
    validate_customer_request, validate_id, validate_payment_method_request, validate_payment_request,
    validate_refund_request,
};
use crate::config::{FallbackMode, PaymentsConfig};
use crate::observability::metrics;
use crate::provider::{CallContext, MockFallbackProvider, PaymentProvider};
use crate::resilience::{CircuitBreaker, CircuitStateChange, FailureKind, OperationFailed, RetryHandler};

pub(crate) const PAYMENT_INTENT_CREATE: &str = "payment_intent_create";
const PAYMENT_INTENT_CONFIRM: &str = "payment_intent_confirm";
const CUSTOMER_CREATE: &str = "customer_create";
const REFUND_CREATE: &str = "refund_create";
const PAYMENT_METHOD_CREATE: &str = "payment_method_create";
const PAYMENT_METHOD_ATTACH: &str = "payment_method_attach";

/// `txn_<unix millis>_<9 random chars>`.
pub fn generate_transaction_id() -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("txn_{}_{}", Utc::now().timestamp_millis(), &random[..9])
}

/// Recovery window for `secs`. Values too large for a `chrono::Duration`
/// are treated as unbounded; `validate_config` rejects them up front.
fn recovery_window(secs: u64) -> chrono::Duration {
    match chrono::Duration::from_std(std::time::Duration::from_secs(secs)) {
        Ok(window) => window,
        Err(_) => {
            tracing::warn!(
                recovery_lookback_secs = secs,
                "Recovery lookback out of range, scanning the whole transaction log"
            );
            chrono::Duration::MAX
        }
    }
}

/// An operation in flight.
struct Operation {
    action: &'static str,
    transaction_id: String,
    started: Instant,
}

impl Operation {
    fn context(&self) -> CallContext {
        CallContext::new(&self.transaction_id)
    }
}

pub struct ResilientPaymentService {
    provider: Arc<dyn PaymentProvider>,
    fallback: Option<Arc<dyn PaymentProvider>>,
    breaker: CircuitBreaker,
    retry: RetryHandler<PaymentError>,
    pub(crate) log: TransactionLog,
    events: EventBus,
    pub(crate) recovery_lookback: chrono::Duration,
    last_activity: Mutex<Option<DateTime<Utc>>>,
}

impl std::fmt::Debug for ResilientPaymentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientPaymentService")
            .field("provider", &self.provider.name())
            .field("fallback", &self.fallback.as_ref().map(|p| p.name()))
            .field("breaker", &self.breaker)
            .field("transactions", &self.log.len())
            .finish()
    }
}

impl ResilientPaymentService {
    /// Build the service around `provider`. The fallback follows `config.fallback.mode`.
    pub fn new(config: &PaymentsConfig, provider: Arc<dyn PaymentProvider>, events: EventBus) -> Self {
        let fallback: Option<Arc<dyn PaymentProvider>> = match config.fallback.mode {
            FallbackMode::None => None,
            FallbackMode::Mock => {
                tracing::warn!("Mock fallback enabled; open-circuit calls will return synthetic objects");
                Some(Arc::new(MockFallbackProvider::new()))
            }
        };

        let breaker_events = events.clone();
        let breaker = CircuitBreaker::new(format!("{}-payments", provider.name()), config.circuit_breaker.clone())
            .with_listener(Arc::new(move |change: &CircuitStateChange| {
                tracing::warn!(
                    breaker = %change.name,
                    from = %change.from,
                    to = %change.to,
                    "Payment circuit breaker state changed"
                );
                breaker_events.publish(PaymentEvent::CircuitBreakerStateChange(change.clone()));
            }));

        let retry_events = events.clone();
        let retry = RetryHandler::new(
            format!("{}-payments", provider.name()),
            config.retries.clone(),
            Arc::new(should_retry_payment),
        )
        .with_listener(Arc::new(move |failed: &OperationFailed| {
            retry_events.publish(PaymentEvent::PaymentOperationFailed(failed.clone()));
        }));

        tracing::info!(
            provider = provider.name(),
            failure_threshold = config.circuit_breaker.failure_threshold,
            max_attempts = config.retries.max_attempts,
            "Resilient payment service initialized"
        );

        Self {
            provider,
            fallback,
            breaker,
            retry,
            log: TransactionLog::new(&config.transaction_log),
            events,
            recovery_lookback: recovery_window(config.transaction_log.recovery_lookback_secs),
            last_activity: Mutex::new(None),
        }
    }

    /// Replace the configured fallback provider.
    pub fn with_fallback(mut self, fallback: Arc<dyn PaymentProvider>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PaymentEvent> {
        self.events.subscribe()
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    // ---- operations -------------------------------------------------------

    pub async fn create_payment_intent(&self, request: PaymentRequest) -> PaymentResponse {
        self.submit_payment_intent(request, None).await
    }

    /// Create an intent. A replay sends the root transaction's id as the
    /// idempotency key and records that root as `replay_of`.
    pub(crate) async fn submit_payment_intent(
        &self,
        request: PaymentRequest,
        replay_of: Option<&str>,
    ) -> PaymentResponse {
        let op = self.begin(
            PAYMENT_INTENT_CREATE,
            json!({
                "request": request,
                "replay_of": replay_of,
            }),
        );
        tracing::info!(
            transaction_id = %op.transaction_id,
            amount = request.amount,
            currency = %request.currency,
            "Creating payment intent"
        );

        let mut ctx = op.context();
        if let Some(root) = replay_of {
            ctx = ctx.with_idempotency_key(root);
        }

        let result = match validate_payment_request(&request) {
            Ok(()) => {
                let (request, ctx) = (&request, &ctx);
                self.resilient(|p| async move { p.create_payment_intent(request, ctx).await })
                    .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok((intent, from_fallback)) => {
                self.succeed(
                    &op,
                    json!({
                        "payment_intent_id": intent.id,
                        "status": intent.status,
                        "fallback_used": from_fallback,
                    }),
                    from_fallback,
                );
                tracing::info!(
                    transaction_id = %op.transaction_id,
                    payment_intent_id = %intent.id,
                    status = intent.status.as_str(),
                    "Payment intent created"
                );
                let response = PaymentResponse::succeeded(
                    &intent,
                    Some(op.transaction_id.clone()),
                    self.served_by(from_fallback),
                    from_fallback,
                );
                self.events.publish(PaymentEvent::PaymentIntentCreated(response.clone()));
                response
            }
            Err(e) => {
                self.fail(&op, &e);
                let response = PaymentResponse::failed(e.to_string(), Some(op.transaction_id.clone()));
                self.events.publish(PaymentEvent::PaymentIntentFailed(response.clone()));
                response
            }
        }
    }

    pub async fn confirm_payment_intent(
        &self,
        payment_intent_id: &str,
        payment_method_id: Option<&str>,
    ) -> PaymentResponse {
        let op = self.begin(
            PAYMENT_INTENT_CONFIRM,
            json!({
                "payment_intent_id": payment_intent_id,
                "payment_method_id": payment_method_id,
            }),
        );
        tracing::info!(transaction_id = %op.transaction_id, payment_intent_id, "Confirming payment intent");

        let ctx = op.context();
        let result = match validate_id("payment_intent_id", payment_intent_id) {
            Ok(()) => {
                let ctx = &ctx;
                self.resilient(|p| async move {
                    p.confirm_payment_intent(payment_intent_id, payment_method_id, ctx)
                        .await
                })
                .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok((intent, from_fallback)) => {
                self.succeed(
                    &op,
                    json!({
                        "payment_intent_id": intent.id,
                        "status": intent.status,
                        "fallback_used": from_fallback,
                    }),
                    from_fallback,
                );
                let response = PaymentResponse::succeeded(
                    &intent,
                    Some(op.transaction_id.clone()),
                    self.served_by(from_fallback),
                    from_fallback,
                );
                self.events.publish(PaymentEvent::PaymentIntentConfirmed(response.clone()));
                response
            }
            Err(e) => {
                self.fail(&op, &e);
                let response = PaymentResponse::failed(e.to_string(), Some(op.transaction_id.clone()));
                self.events.publish(PaymentEvent::PaymentIntentConfirmFailed(response.clone()));
                response
            }
        }
    }

    pub async fn create_customer(&self, request: CustomerRequest) -> CustomerResponse {
        let op = self.begin(
            CUSTOMER_CREATE,
            json!({
                "email": request.email,
                "name": request.name,
            }),
        );
        tracing::info!(transaction_id = %op.transaction_id, "Creating customer");

        let ctx = op.context();
        let result = match validate_customer_request(&request) {
            Ok(()) => {
                let (request, ctx) = (&request, &ctx);
                self.resilient(|p| async move { p.create_customer(request, ctx).await })
                    .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok((customer, from_fallback)) => {
                self.succeed(
                    &op,
                    json!({ "customer_id": customer.id, "fallback_used": from_fallback }),
                    from_fallback,
                );
                let response = CustomerResponse::succeeded(customer.id, op.transaction_id.clone(), from_fallback);
                self.events.publish(PaymentEvent::CustomerCreated(response.clone()));
                response
            }
            Err(e) => {
                self.fail(&op, &e);
                let response = CustomerResponse::failed(e.to_string(), op.transaction_id.clone());
                self.events.publish(PaymentEvent::CustomerCreateFailed(response.clone()));
                response
            }
        }
    }

    /// Refund a payment. Without an amount the provider refunds it in full.
    pub async fn create_refund(&self, request: RefundRequest) -> RefundResponse {
        let op = self.begin(
            REFUND_CREATE,
            json!({
                "payment_intent_id": request.payment_intent_id,
                "amount": request.amount,
                "reason": request.reason,
            }),
        );
        tracing::info!(
            transaction_id = %op.transaction_id,
            payment_intent_id = %request.payment_intent_id,
            amount = ?request.amount,
            "Creating refund"
        );

        let ctx = op.context();
        let result = match validate_refund_request(&request) {
            Ok(()) => {
                let (request, ctx) = (&request, &ctx);
                self.resilient(|p| async move { p.create_refund(request, ctx).await })
                    .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok((refund, from_fallback)) => {
                self.succeed(
                    &op,
                    json!({
                        "refund_id": refund.id,
                        "status": refund.status,
                        "amount": refund.amount,
                        "fallback_used": from_fallback,
                    }),
                    from_fallback,
                );
                let response = RefundResponse {
                    success: true,
                    refund_id: Some(refund.id),
                    status: refund.status,
                    amount: Some(refund.amount),
                    transaction_id: Some(op.transaction_id.clone()),
                    fallback_used: from_fallback,
                    error: None,
                };
                self.events.publish(PaymentEvent::RefundCreated(response.clone()));
                response
            }
            Err(e) => {
                self.fail(&op, &e);
                let response = RefundResponse::failed(e.to_string(), op.transaction_id.clone());
                self.events.publish(PaymentEvent::RefundCreateFailed(response.clone()));
                response
            }
        }
    }

    pub async fn attach_payment_method(&self, payment_method_id: &str, customer_id: &str) -> PaymentMethodResponse {
        let op = self.begin(
            PAYMENT_METHOD_ATTACH,
            json!({
                "payment_method_id": payment_method_id,
                "customer_id": customer_id,
            }),
        );
        tracing::info!(transaction_id = %op.transaction_id, payment_method_id, customer_id, "Attaching payment method");

        let ctx = op.context();
        let result = match validate_id("payment_method_id", payment_method_id)
            .and_then(|()| validate_id("customer_id", customer_id))
        {
            Ok(()) => {
                let ctx = &ctx;
                self.resilient(|p| async move {
                    p.attach_payment_method(payment_method_id, customer_id, ctx)
                        .await
                })
                .await
            }
            Err(e) => Err(e),
        };

        self.finish_payment_method(&op, result)
    }

    /// Create a payment method from raw details and attach it to the customer.
    pub async fn create_payment_method(&self, request: PaymentMethodRequest) -> PaymentMethodResponse {
        let op = self.begin(
            PAYMENT_METHOD_CREATE,
            json!({
                "customer_id": request.customer_id,
                "type": request.details.kind(),
                "last4": request.details.last4(),
            }),
        );
        tracing::info!(
            transaction_id = %op.transaction_id,
            customer_id = %request.customer_id,
            kind = request.details.kind(),
            "Creating payment method"
        );

        let ctx = op.context();
        let result = match validate_payment_method_request(&request) {
            Ok(()) => self.create_and_attach(&request, &ctx).await,
            Err(e) => Err(e),
        };

        self.finish_payment_method(&op, result)
    }

    async fn create_and_attach(
        &self,
        request: &PaymentMethodRequest,
        ctx: &CallContext,
    ) -> Result<(crate::provider::PaymentMethod, bool), PaymentError> {
        let (created, created_by_fallback) = self
            .resilient(|p| async move { p.create_payment_method(request, ctx).await })
            .await?;

        let attach_ctx = ctx.clone().with_idempotency_key(format!("{}_attach", ctx.idempotency_key));
        let (pm_id, customer_id, attach_ctx) = (created.id.as_str(), request.customer_id.as_str(), &attach_ctx);
        let (attached, attached_by_fallback) = self
            .resilient(|p| async move { p.attach_payment_method(pm_id, customer_id, attach_ctx).await })
            .await?;

        // The attach response may omit card details.
        let merged = crate::provider::PaymentMethod {
            card: attached.card.or(created.card),
            us_bank_account: attached.us_bank_account.or(created.us_bank_account),
            ..attached
        };
        Ok((merged, created_by_fallback || attached_by_fallback))
    }

    fn finish_payment_method(
        &self,
        op: &Operation,
        result: Result<(crate::provider::PaymentMethod, bool), PaymentError>,
    ) -> PaymentMethodResponse {
        match result {
            Ok((pm, from_fallback)) => {
                self.succeed(
                    op,
                    json!({
                        "payment_method_id": pm.id,
                        "customer_id": pm.customer,
                        "fallback_used": from_fallback,
                    }),
                    from_fallback,
                );
                let response = PaymentMethodResponse {
                    success: true,
                    last4: pm.last4(),
                    brand: pm.brand(),
                    payment_method_id: Some(pm.id),
                    transaction_id: Some(op.transaction_id.clone()),
                    fallback_used: from_fallback,
                    error: None,
                };
                self.events.publish(PaymentEvent::PaymentMethodAttached(response.clone()));
                response
            }
            Err(e) => {
                self.fail(op, &e);
                let response = PaymentMethodResponse::failed(e.to_string(), op.transaction_id.clone());
                self.events.publish(PaymentEvent::PaymentMethodAttachFailed(response.clone()));
                response
            }
        }
    }

    /// Current status of an intent. Breaker-protected, not retried, not logged.
    pub async fn get_payment_intent_status(&self, payment_intent_id: &str) -> PaymentResponse {
        if let Err(e) = validate_id("payment_intent_id", payment_intent_id) {
            return PaymentResponse::failed(e.to_string(), None);
        }
        let call = |p: Arc<dyn PaymentProvider>| async move { p.retrieve_payment_intent(payment_intent_id).await };
        match self.guarded(&call).await {
            Ok((intent, from_fallback)) => {
                PaymentResponse::succeeded(&intent, None, self.served_by(from_fallback), from_fallback)
            }
            Err(e) => {
                tracing::warn!(payment_intent_id, error = %e, "Failed to retrieve payment intent");
                PaymentResponse::failed(e.to_string(), None)
            }
        }
    }

    /// Audit entries, optionally for a single transaction.
    pub fn get_transaction_logs(&self, transaction_id: Option<&str>) -> Vec<TransactionLogEntry> {
        self.log.entries(transaction_id)
    }

    pub fn health_metrics(&self) -> HealthMetrics {
        HealthMetrics {
            circuit_breaker: self.breaker.metrics(),
            retry_handler: self.retry.metrics(),
            transaction_count: self.log.len(),
            last_activity: *self.lock_activity(),
        }
    }

    // ---- plumbing ---------------------------------------------------------

    /// One breaker-protected call, served by the fallback while open.
    /// The flag is true when the fallback produced the value.
    async fn guarded<T, F, Fut>(&self, call: &F) -> Result<(T, bool), PaymentError>
    where
        F: Fn(Arc<dyn PaymentProvider>) -> Fut,
        Fut: Future<Output = Result<T, PaymentError>>,
    {
        let primary = Arc::clone(&self.provider);
        let result = match &self.fallback {
            Some(fallback) => {
                let fallback = Arc::clone(fallback);
                self.breaker
                    .execute_with_fallback(|| call(primary), || call(fallback))
                    .await
            }
            None => self.breaker.execute(|| call(primary)).await,
        };
        let from_fallback = result.from_fallback;
        result.outcome.map(|value| (value, from_fallback))
    }

    /// Retried, breaker-protected call.
    async fn resilient<T, F, Fut>(&self, call: F) -> Result<(T, bool), PaymentError>
    where
        F: Fn(Arc<dyn PaymentProvider>) -> Fut,
        Fut: Future<Output = Result<T, PaymentError>>,
    {
        self.retry.execute(|| self.guarded(&call)).await.outcome
    }

    fn served_by(&self, from_fallback: bool) -> &'static str {
        match (&self.fallback, from_fallback) {
            (Some(fallback), true) => fallback.name(),
            _ => self.provider.name(),
        }
    }

    fn lock_activity(&self) -> std::sync::MutexGuard<'_, Option<DateTime<Utc>>> {
        self.last_activity.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn begin(&self, action: &'static str, data: Value) -> Operation {
        let op = Operation {
            action,
            transaction_id: generate_transaction_id(),
            started: Instant::now(),
        };
        self.log.record(&op.transaction_id, &format!("{action}_start"), data);
        *self.lock_activity() = Some(Utc::now());
        op
    }

    fn succeed(&self, op: &Operation, data: Value, fallback_used: bool) {
        self.log
            .record(&op.transaction_id, &format!("{}_success", op.action), data);
        metrics::record_operation(op.action, true, fallback_used, op.started.elapsed());
    }

    fn fail(&self, op: &Operation, error: &PaymentError) {
        tracing::error!(
            transaction_id = %op.transaction_id,
            action = op.action,
            kind = error.failure_kind(),
            error = %error,
            "Payment operation failed"
        );
        self.log.record(
            &op.transaction_id,
            &format!("{}_failed", op.action),
            json!({
                "error": error.to_string(),
                "kind": error.failure_kind(),
            }),
        );
        metrics::record_operation(op.action, false, false, op.started.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_id_shape() {
        let id = generate_transaction_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "txn");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 9);
        assert_ne!(id, generate_transaction_id());
    }

    #[test]
    fn test_recovery_window_keeps_configured_value() {
        assert_eq!(recovery_window(86_400), chrono::Duration::days(1));
        assert_eq!(recovery_window(u64::MAX), chrono::Duration::MAX);
    }
}
