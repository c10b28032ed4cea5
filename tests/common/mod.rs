//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;

use resilient_payments::config::PaymentsConfig;
use resilient_payments::payments::{
    CustomerRequest, PaymentError, PaymentMethodRequest, PaymentRequest, RefundRequest,
};
use resilient_payments::provider::{
    CallContext, CardSummary, Customer, IntentStatus, PaymentIntent, PaymentMethod, PaymentProvider, Refund,
};
use resilient_payments::{EventBus, PaymentEvent, ResilientPaymentService};

// ---- scripted provider ------------------------------------------------------

/// In-process provider whose outcomes are scripted call by call.
///
/// Queued outcomes are consumed first; once the queue is empty every call
/// fails with `default_failure` if set, and succeeds otherwise.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Option<PaymentError>>>,
    default_failure: Mutex<Option<PaymentError>>,
    calls: AtomicUsize,
    call_times: Mutex<Vec<Instant>>,
    keys: Mutex<Vec<String>>,
    refund_amounts: Mutex<Vec<Option<i64>>>,
    pub intent_status: IntentStatus,
    /// Amount reported for full refunds.
    pub captured_amount: i64,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_failure: Mutex::new(None),
            calls: AtomicUsize::new(0),
            call_times: Mutex::new(Vec::new()),
            keys: Mutex::new(Vec::new()),
            refund_amounts: Mutex::new(Vec::new()),
            intent_status: IntentStatus::RequiresPaymentMethod,
            captured_amount: 5000,
        }
    }

    pub fn failing(error: PaymentError) -> Self {
        let provider = Self::new();
        provider.set_default_failure(Some(error));
        provider
    }

    pub fn push_failure(&self, error: PaymentError) {
        self.script.lock().unwrap().push_back(Some(error));
    }

    pub fn push_success(&self) {
        self.script.lock().unwrap().push_back(None);
    }

    pub fn set_default_failure(&self, error: Option<PaymentError>) {
        *self.default_failure.lock().unwrap() = error;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().unwrap().clone()
    }

    pub fn idempotency_keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }

    pub fn refund_amounts(&self) -> Vec<Option<i64>> {
        self.refund_amounts.lock().unwrap().clone()
    }

    fn next(&self, ctx: Option<&CallContext>) -> Result<usize, PaymentError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.call_times.lock().unwrap().push(Instant::now());
        if let Some(ctx) = ctx {
            self.keys.lock().unwrap().push(ctx.idempotency_key.clone());
        }
        let scripted = self.script.lock().unwrap().pop_front();
        match scripted {
            Some(Some(error)) => Err(error),
            Some(None) => Ok(n),
            None => match self.default_failure.lock().unwrap().clone() {
                Some(error) => Err(error),
                None => Ok(n),
            },
        }
    }

    fn intent(&self, id: String, amount: i64, currency: &str) -> PaymentIntent {
        PaymentIntent {
            client_secret: Some(format!("{id}_secret")),
            id,
            status: self.intent_status,
            amount,
            currency: currency.to_string(),
        }
    }
}

#[async_trait]
impl PaymentProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn create_payment_intent(
        &self,
        request: &PaymentRequest,
        ctx: &CallContext,
    ) -> Result<PaymentIntent, PaymentError> {
        let n = self.next(Some(ctx))?;
        Ok(self.intent(format!("pi_test_{n}"), request.amount, &request.currency))
    }

    async fn confirm_payment_intent(
        &self,
        intent_id: &str,
        _payment_method_id: Option<&str>,
        ctx: &CallContext,
    ) -> Result<PaymentIntent, PaymentError> {
        self.next(Some(ctx))?;
        Ok(PaymentIntent {
            status: IntentStatus::Succeeded,
            ..self.intent(intent_id.to_string(), self.captured_amount, "usd")
        })
    }

    async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError> {
        self.next(None)?;
        Ok(self.intent(intent_id.to_string(), self.captured_amount, "usd"))
    }

    async fn create_customer(&self, request: &CustomerRequest, ctx: &CallContext) -> Result<Customer, PaymentError> {
        let n = self.next(Some(ctx))?;
        Ok(Customer {
            id: format!("cus_test_{n}"),
            email: Some(request.email.clone()),
        })
    }

    async fn create_refund(&self, request: &RefundRequest, ctx: &CallContext) -> Result<Refund, PaymentError> {
        self.refund_amounts.lock().unwrap().push(request.amount);
        let n = self.next(Some(ctx))?;
        Ok(Refund {
            id: format!("re_test_{n}"),
            status: Some("succeeded".into()),
            amount: request.amount.unwrap_or(self.captured_amount),
            payment_intent: Some(request.payment_intent_id.clone()),
        })
    }

    async fn create_payment_method(
        &self,
        request: &PaymentMethodRequest,
        ctx: &CallContext,
    ) -> Result<PaymentMethod, PaymentError> {
        let n = self.next(Some(ctx))?;
        Ok(PaymentMethod {
            id: format!("pm_test_{n}"),
            customer: None,
            card: Some(CardSummary {
                brand: Some("visa".into()),
                last4: Some(request.details.last4()),
            }),
            us_bank_account: None,
        })
    }

    async fn attach_payment_method(
        &self,
        payment_method_id: &str,
        customer_id: &str,
        ctx: &CallContext,
    ) -> Result<PaymentMethod, PaymentError> {
        self.next(Some(ctx))?;
        Ok(PaymentMethod {
            id: payment_method_id.to_string(),
            customer: Some(customer_id.to_string()),
            card: None,
            us_bank_account: None,
        })
    }
}

/// Defaults with jitter off and short delays so timings are exact.
pub fn test_config() -> PaymentsConfig {
    let mut config = PaymentsConfig::default();
    config.retries.jitter = false;
    config.retries.initial_delay_ms = 100;
    config.retries.max_delay_ms = 1_000;
    config
}

pub fn build_service(provider: &Arc<ScriptedProvider>, config: &PaymentsConfig) -> ResilientPaymentService {
    ResilientPaymentService::new(config, provider.clone(), EventBus::default())
}

/// Names of all events currently buffered in `rx`.
pub fn drain_event_names(rx: &mut tokio::sync::broadcast::Receiver<PaymentEvent>) -> Vec<&'static str> {
    let mut names = Vec::new();
    while let Ok(event) = rx.try_recv() {
        names.push(event.name());
    }
    names
}

// ---- raw HTTP backend -------------------------------------------------------

/// A request as seen by the programmable backend.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn form(&self) -> HashMap<String, String> {
        url::form_urlencoded::parse(self.body.as_bytes()).into_owned().collect()
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

async fn read_request(socket: &mut TcpStream) -> Option<CapturedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = find_header_end(&buf) {
            break end;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let headers: HashMap<String, String> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .get("content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let end = (header_end + content_length).min(buf.len());
    let body = String::from_utf8_lossy(&buf[header_end..end]).to_string();

    Some(CapturedRequest {
        method,
        path,
        headers,
        body,
    })
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        402 => "Payment Required",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// Start a programmable JSON backend on an ephemeral port.
///
/// `f` sees every request and returns `(status, body)`.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(CapturedRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let Some(request) = read_request(&mut socket).await else {
                            return;
                        };
                        let (status, body) = f(request).await;
                        let response = format!(
                            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status,
                            status_text(status),
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Bind and immediately release a port so connections to it are refused.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}
