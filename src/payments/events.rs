//! Payment events and the broadcast bus that carries them.

use serde::Serialize;
use tokio::sync::broadcast;

use super::types::{CustomerResponse, PaymentMethodResponse, PaymentResponse, RefundResponse};
use crate::resilience::{CircuitStateChange, OperationFailed};

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum PaymentEvent {
    CircuitBreakerStateChange(CircuitStateChange),
    PaymentOperationFailed(OperationFailed),
    PaymentIntentCreated(PaymentResponse),
    PaymentIntentFailed(PaymentResponse),
    PaymentIntentConfirmed(PaymentResponse),
    PaymentIntentConfirmFailed(PaymentResponse),
    CustomerCreated(CustomerResponse),
    CustomerCreateFailed(CustomerResponse),
    RefundCreated(RefundResponse),
    RefundCreateFailed(RefundResponse),
    PaymentMethodAttached(PaymentMethodResponse),
    PaymentMethodAttachFailed(PaymentMethodResponse),
}

impl PaymentEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PaymentEvent::CircuitBreakerStateChange(_) => "circuitBreakerStateChange",
            PaymentEvent::PaymentOperationFailed(_) => "paymentOperationFailed",
            PaymentEvent::PaymentIntentCreated(_) => "paymentIntentCreated",
            PaymentEvent::PaymentIntentFailed(_) => "paymentIntentFailed",
            PaymentEvent::PaymentIntentConfirmed(_) => "paymentIntentConfirmed",
            PaymentEvent::PaymentIntentConfirmFailed(_) => "paymentIntentConfirmFailed",
            PaymentEvent::CustomerCreated(_) => "customerCreated",
            PaymentEvent::CustomerCreateFailed(_) => "customerCreateFailed",
            PaymentEvent::RefundCreated(_) => "refundCreated",
            PaymentEvent::RefundCreateFailed(_) => "refundCreateFailed",
            PaymentEvent::PaymentMethodAttached(_) => "paymentMethodAttached",
            PaymentEvent::PaymentMethodAttachFailed(_) => "paymentMethodAttachFailed",
        }
    }
}

/// Fan-out of payment events. Publishing never blocks; slow subscribers lag.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PaymentEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PaymentEvent> {
        self.tx.subscribe()
    }

    /// Returns the number of subscribers that received the event.
    pub fn publish(&self, event: PaymentEvent) -> usize {
        tracing::trace!(event = event.name(), "Publishing payment event");
        self.tx.send(event).unwrap_or(0)
    }
}

/// Log every event until shutdown.
pub async fn log_events(mut rx: broadcast::Receiver<PaymentEvent>, mut stop: broadcast::Receiver<()>) {
    loop {
        tokio::select! {
            _ = stop.recv() => break,
            received = rx.recv() => match received {
                Ok(event) => tracing::info!(event = event.name(), "Payment event"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event logger lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}
