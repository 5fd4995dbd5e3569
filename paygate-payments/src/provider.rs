//! Provider trait and the shared HTTP client

use crate::{
    ConfirmPaymentRequest, CreateCustomerRequest, CreateSubscriptionRequest, Customer,
    PaymentError, PaymentGateway, PaymentRequest, PaymentResponse, PaymentResult, RefundRequest,
    RefundResponse, Subscription,
};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

/// Outbound request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// One payment gateway's REST API.
///
/// Implementations map the neutral types onto the provider's wire format
/// and never retry or circuit-break; the factory does both.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn gateway(&self) -> PaymentGateway;

    /// Whether `id` has the shape of an id this provider issues.
    fn owns_payment_id(&self, id: &str) -> bool {
        self.gateway().owns_id(id)
    }

    async fn create_payment(&self, request: &PaymentRequest) -> PaymentResult<PaymentResponse>;

    async fn confirm_payment(&self, request: &ConfirmPaymentRequest)
    -> PaymentResult<PaymentResponse>;

    async fn process_refund(&self, request: &RefundRequest) -> PaymentResult<RefundResponse>;

    /// Side-effect free.
    async fn retrieve_payment(&self, payment_id: &str) -> PaymentResult<PaymentResponse>;

    /// Check an inbound webhook against the provider's configured secret.
    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> PaymentResult<()>;

    async fn create_customer(&self, request: &CreateCustomerRequest) -> PaymentResult<Customer>;

    async fn create_subscription(
        &self,
        request: &CreateSubscriptionRequest,
    ) -> PaymentResult<Subscription>;

    /// Cancel now, or at the end of the current billing period.
    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        at_period_end: bool,
    ) -> PaymentResult<Subscription>;
}

/// How a provider authenticates API calls.
pub enum ProviderAuth {
    Bearer(SecretString),
    Basic {
        username: String,
        password: SecretString,
    },
}

/// HTTP client bound to one provider's base URL and credentials.
pub struct ProviderClient {
    gateway: PaymentGateway,
    client: reqwest::Client,
    base_url: String,
    auth: ProviderAuth,
}

impl ProviderClient {
    pub fn new(gateway: PaymentGateway, base_url: &str, auth: ProviderAuth) -> PaymentResult<Self> {
        let parsed = url::Url::parse(base_url).map_err(|e| {
            PaymentError::Config(format!("invalid {} base URL '{}': {}", gateway, base_url, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(PaymentError::Config(format!(
                "{} base URL must be http(s): {}",
                gateway, base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| PaymentError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            gateway,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, url);
        match &self.auth {
            ProviderAuth::Bearer(token) => builder.bearer_auth(token.expose_secret()),
            ProviderAuth::Basic { username, password } => {
                builder.basic_auth(username, Some(password.expose_secret()))
            }
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> PaymentResult<T> {
        self.send(Method::GET, path, self.request(Method::GET, path)).await
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        idempotency_key: Option<&str>,
    ) -> PaymentResult<T> {
        let builder = with_idempotency(self.request(Method::POST, path).json(body), idempotency_key);
        self.send(Method::POST, path, builder).await
    }

    pub async fn post_form<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        idempotency_key: Option<&str>,
    ) -> PaymentResult<T> {
        let builder = with_idempotency(self.request(Method::POST, path).form(body), idempotency_key);
        self.send(Method::POST, path, builder).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> PaymentResult<T> {
        self.send(Method::DELETE, path, self.request(Method::DELETE, path))
            .await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        builder: RequestBuilder,
    ) -> PaymentResult<T> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        paygate_log::debug!(target: "paygate::payments", "{} {} {} -> {}", self.gateway, method, path, status.as_u16());

        if !status.is_success() {
            return Err(gateway_error(self.gateway, status.as_u16(), &body));
        }

        serde_json::from_slice(&body).map_err(|e| {
            PaymentError::Serialization(format!("{} response to {}: {}", self.gateway, path, e))
        })
    }
}

fn with_idempotency(builder: RequestBuilder, key: Option<&str>) -> RequestBuilder {
    match key {
        Some(key) => builder.header("Idempotency-Key", key),
        None => builder,
    }
}

/// Pull a message and code out of an error body. Stripe and UPI nest
/// `{error: {message, code}}`, Razorpay uses `{error: {description, code}}`.
fn gateway_error(gateway: PaymentGateway, status: u16, body: &[u8]) -> PaymentError {
    let parsed: Option<Value> = serde_json::from_slice(body).ok();
    let detail = parsed
        .as_ref()
        .map(|value| value.get("error").unwrap_or(value));

    let field = |name: &str| {
        detail
            .and_then(|d| d.get(name))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    let message = field("message")
        .or_else(|| field("description"))
        .unwrap_or_else(|| {
            let text = String::from_utf8_lossy(body);
            if text.trim().is_empty() {
                format!("HTTP {}", status)
            } else {
                text.chars().take(200).collect()
            }
        });

    PaymentError::Gateway {
        gateway,
        status,
        code: field("code"),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_error_shapes() {
        let stripe = br#"{"error": {"message": "No such payment_intent", "code": "resource_missing"}}"#;
        match gateway_error(PaymentGateway::Stripe, 404, stripe) {
            PaymentError::Gateway { status, code, message, .. } => {
                assert_eq!(status, 404);
                assert_eq!(code.as_deref(), Some("resource_missing"));
                assert_eq!(message, "No such payment_intent");
            }
            other => panic!("unexpected {:?}", other),
        }

        let razorpay = br#"{"error": {"code": "BAD_REQUEST_ERROR", "description": "The amount must be atleast INR 1.00"}}"#;
        let err = gateway_error(PaymentGateway::Razorpay, 400, razorpay);
        assert_eq!(err.to_string(), "razorpay error (400): The amount must be atleast INR 1.00");

        let err = gateway_error(PaymentGateway::Upi, 503, b"");
        assert_eq!(err.to_string(), "upi error (503): HTTP 503");
        assert!(err.is_retryable());

        let err = gateway_error(PaymentGateway::Upi, 502, b"<html>bad gateway</html>");
        assert_eq!(err.to_string(), "upi error (502): <html>bad gateway</html>");
    }

    #[test]
    fn test_client_rejects_bad_base_url() {
        let auth = || ProviderAuth::Bearer(SecretString::new("k".into()));
        assert!(ProviderClient::new(PaymentGateway::Upi, "psp.local", auth()).is_err());
        assert!(ProviderClient::new(PaymentGateway::Upi, "ftp://psp.local", auth()).is_err());

        let client = ProviderClient::new(PaymentGateway::Upi, "https://psp.local/v2/", auth()).unwrap();
        assert_eq!(client.base_url(), "https://psp.local/v2");
    }
}
