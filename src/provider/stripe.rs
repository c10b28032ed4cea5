//! Stripe HTTP client.
//!
//! Form-encoded requests with bearer auth against the `/v1` REST API. Error
//! bodies are mapped onto the normalized kinds the retry classifier knows.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::form_urlencoded;

use super::types::{Customer, PaymentIntent, PaymentMethod, Refund};
use super::{CallContext, PaymentProvider};
use crate::config::ProviderConfig;
use crate::payments::{
    CustomerRequest, PaymentError, PaymentMethodDetails, PaymentMethodRequest, PaymentRequest, RefundRequest,
};

pub const STRIPE_PROVIDER_NAME: &str = "stripe";

type Form = Vec<(String, String)>;

pub struct StripeProvider {
    client: Client,
    base_url: String,
    api_key: String,
    api_version: String,
}

impl std::fmt::Debug for StripeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeProvider")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

impl StripeProvider {
    pub fn new(config: &ProviderConfig, api_key: impl Into<String>) -> Result<Self, PaymentError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| PaymentError::provider("api_connection_error", format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            api_version: config.api_version.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, form: &Form, ctx: &CallContext) -> Result<T, PaymentError> {
        let builder = self
            .client
            .post(self.url(path))
            .header("Idempotency-Key", &ctx.idempotency_key)
            .form(form);
        self.send(builder).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, PaymentError> {
        self.send(self.client.get(self.url(path))).await
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, PaymentError> {
        let response = builder
            .bearer_auth(&self.api_key)
            .header("Stripe-Version", &self.api_version)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| PaymentError::Decode(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        tracing::debug!(status = status.as_u16(), "Stripe returned an error response");
        Err(map_api_error(status, &body))
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    fn name(&self) -> &'static str {
        STRIPE_PROVIDER_NAME
    }

    async fn create_payment_intent(
        &self,
        request: &PaymentRequest,
        ctx: &CallContext,
    ) -> Result<PaymentIntent, PaymentError> {
        self.post("/v1/payment_intents", &intent_form(request, ctx), ctx).await
    }

    async fn confirm_payment_intent(
        &self,
        intent_id: &str,
        payment_method_id: Option<&str>,
        ctx: &CallContext,
    ) -> Result<PaymentIntent, PaymentError> {
        let mut form = Form::new();
        if let Some(pm) = payment_method_id {
            form.push(("payment_method".into(), pm.into()));
        }
        let path = format!("/v1/payment_intents/{}/confirm", escape(intent_id));
        self.post(&path, &form, ctx).await
    }

    async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError> {
        self.get(&format!("/v1/payment_intents/{}", escape(intent_id))).await
    }

    async fn create_customer(&self, request: &CustomerRequest, ctx: &CallContext) -> Result<Customer, PaymentError> {
        let mut form = vec![("email".to_string(), request.email.clone())];
        push_opt(&mut form, "name", request.name.as_deref());
        push_opt(&mut form, "phone", request.phone.as_deref());
        push_metadata(&mut form, &request.metadata, ctx);
        self.post("/v1/customers", &form, ctx).await
    }

    async fn create_refund(&self, request: &RefundRequest, ctx: &CallContext) -> Result<Refund, PaymentError> {
        self.post("/v1/refunds", &refund_form(request, ctx), ctx).await
    }

    async fn create_payment_method(
        &self,
        request: &PaymentMethodRequest,
        ctx: &CallContext,
    ) -> Result<PaymentMethod, PaymentError> {
        self.post("/v1/payment_methods", &payment_method_form(request), ctx).await
    }

    async fn attach_payment_method(
        &self,
        payment_method_id: &str,
        customer_id: &str,
        ctx: &CallContext,
    ) -> Result<PaymentMethod, PaymentError> {
        let form = vec![("customer".to_string(), customer_id.to_string())];
        let path = format!("/v1/payment_methods/{}/attach", escape(payment_method_id));
        self.post(&path, &form, ctx).await
    }
}

fn escape(segment: &str) -> String {
    form_urlencoded::byte_serialize(segment.as_bytes()).collect()
}

fn push_opt(form: &mut Form, key: &str, value: Option<&str>) {
    if let Some(v) = value {
        form.push((key.to_string(), v.to_string()));
    }
}

fn push_metadata(form: &mut Form, metadata: &std::collections::HashMap<String, String>, ctx: &CallContext) {
    let mut keys: Vec<_> = metadata.keys().collect();
    keys.sort();
    for key in keys {
        form.push((format!("metadata[{key}]"), metadata[key].clone()));
    }
    form.push(("metadata[transaction_id]".into(), ctx.transaction_id.clone()));
}

fn intent_form(request: &PaymentRequest, ctx: &CallContext) -> Form {
    let mut form = vec![
        ("amount".to_string(), request.amount.to_string()),
        ("currency".to_string(), request.currency.to_lowercase()),
        ("description".to_string(), request.description.clone()),
        ("confirmation_method".to_string(), "manual".to_string()),
        ("confirm".to_string(), request.payment_method_id.is_some().to_string()),
    ];
    push_opt(&mut form, "customer", request.customer_id.as_deref());
    push_opt(&mut form, "payment_method", request.payment_method_id.as_deref());
    if request.setup_future_usage {
        form.push(("setup_future_usage".into(), "on_session".into()));
    }
    push_metadata(&mut form, &request.metadata, ctx);
    form
}

fn refund_form(request: &RefundRequest, ctx: &CallContext) -> Form {
    let mut form = vec![("payment_intent".to_string(), request.payment_intent_id.clone())];
    if let Some(amount) = request.amount {
        form.push(("amount".into(), amount.to_string()));
    }
    push_opt(&mut form, "reason", request.reason.map(|r| r.as_str()));
    push_metadata(&mut form, &request.metadata, ctx);
    form
}

fn payment_method_form(request: &PaymentMethodRequest) -> Form {
    let mut form = Form::new();
    match &request.details {
        PaymentMethodDetails::Card(card) => {
            form.push(("type".into(), "card".into()));
            form.push(("card[number]".into(), card.number.clone()));
            form.push(("card[exp_month]".into(), card.exp_month.to_string()));
            form.push(("card[exp_year]".into(), card.exp_year.to_string()));
            form.push(("card[cvc]".into(), card.cvc.clone()));
        }
        PaymentMethodDetails::BankAccount(bank) => {
            form.push(("type".into(), "us_bank_account".into()));
            form.push(("us_bank_account[routing_number]".into(), bank.routing_number.clone()));
            form.push(("us_bank_account[account_number]".into(), bank.account_number.clone()));
            push_opt(
                &mut form,
                "us_bank_account[account_holder_type]",
                bank.account_holder_type.as_deref(),
            );
            form.push(("billing_details[name]".into(), bank.account_holder_name.clone()));
        }
    }
    if let Some(billing) = &request.billing_details {
        if !matches!(request.details, PaymentMethodDetails::BankAccount(_)) {
            push_opt(&mut form, "billing_details[name]", billing.name.as_deref());
        }
        push_opt(&mut form, "billing_details[email]", billing.email.as_deref());
        push_opt(&mut form, "billing_details[phone]", billing.phone.as_deref());
        if let Some(addr) = &billing.address {
            push_opt(&mut form, "billing_details[address][line1]", addr.line1.as_deref());
            push_opt(&mut form, "billing_details[address][line2]", addr.line2.as_deref());
            push_opt(&mut form, "billing_details[address][city]", addr.city.as_deref());
            push_opt(&mut form, "billing_details[address][state]", addr.state.as_deref());
            push_opt(&mut form, "billing_details[address][postal_code]", addr.postal_code.as_deref());
            push_opt(&mut form, "billing_details[address][country]", addr.country.as_deref());
        }
    }
    form
}

#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: ErrorBody,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type", default)]
    error_type: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    decline_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn map_transport_error(err: reqwest::Error) -> PaymentError {
    if err.is_timeout() {
        PaymentError::provider("network_error", format!("Request to payment provider timed out: {err}"))
    } else if err.is_connect() {
        PaymentError::provider("api_connection_error", format!("Could not connect to payment provider: {err}"))
    } else {
        PaymentError::provider("network_error", format!("Payment provider request failed: {err}"))
    }
}

fn map_api_error(status: StatusCode, body: &str) -> PaymentError {
    let body = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error)
        .unwrap_or_default();
    let message = body
        .message
        .clone()
        .unwrap_or_else(|| format!("Payment provider returned HTTP {}", status.as_u16()));

    let kind = if status == StatusCode::TOO_MANY_REQUESTS {
        Some("rate_limit".to_string())
    } else if status.is_server_error() {
        Some("temporary_failure".to_string())
    } else if body.decline_code.as_deref() == Some("insufficient_funds") {
        body.decline_code.clone()
    } else if body.code.is_some() {
        body.code.clone()
    } else {
        match body.error_type.as_deref() {
            Some("card_error") => Some("card_declined".to_string()),
            Some("invalid_request_error") => Some("invalid_request".to_string()),
            Some("rate_limit_error") => Some("rate_limit".to_string()),
            Some("api_error") => Some("temporary_failure".to_string()),
            Some(other) => Some(other.to_string()),
            None => None,
        }
    };

    PaymentError::Provider {
        error_type: kind,
        message,
    }
}
