//! Transactional email dispatch with bounded retry.
//!
//! Confirmation emails are best-effort: the dispatcher reports an outcome
//! to its caller but never fails the request that triggered it. Callers
//! invoke it at most once per state transition; the dispatcher itself does
//! not deduplicate.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::config::AppConfig;

/// One rendered line of a confirmation email.
#[derive(Debug, Clone)]
pub struct EmailLineItem {
    pub name: String,
    pub image: Option<String>,
    pub size: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
}

#[derive(Debug, Clone)]
pub struct EmailShippingAddress {
    pub address: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
    pub country: String,
}

/// Everything needed to render and address an order confirmation.
#[derive(Debug, Clone)]
pub struct OrderConfirmationEmail {
    pub order_number: String,
    pub customer_name: String,
    pub customer_email: String,
    pub order_date: String,
    pub items: Vec<EmailLineItem>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping_cost: Decimal,
    pub total_amount: Decimal,
    pub payment_method: String,
    pub shipping_address: EmailShippingAddress,
}

/// Result of a dispatch attempt series, reported for observability only.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub success: bool,
    pub error: Option<String>,
    pub error_code: Option<String>,
}

impl DispatchOutcome {
    fn ok() -> Self {
        Self {
            success: true,
            error: None,
            error_code: None,
        }
    }

    fn failed(error: String, error_code: Option<String>) -> Self {
        Self {
            success: false,
            error: Some(error),
            error_code,
        }
    }
}

#[derive(Debug, Error)]
pub enum MailerError {
    /// The attempt exceeded its overall deadline.
    #[error("request timeout after {0:?}")]
    Timeout(Duration),

    /// Connection-level failure: reset, refused, DNS, socket hang up.
    #[error("connection error: {0}")]
    Connection(String),

    /// The provider rejected the request (authentication, payload, quota).
    #[error("provider rejected send ({status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// Anything else; not safe to retry.
    #[error("send failed: {0}")]
    Other(String),
}

impl MailerError {
    /// Only connection-level failures and timeouts are worth retrying;
    /// provider rejections will not change on a second attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Connection(_))
    }

    pub fn code(&self) -> Option<String> {
        match self {
            Self::Api { code, .. } => code.clone(),
            _ => None,
        }
    }

    fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            return Self::Timeout(timeout);
        }
        if err.is_connect() {
            return Self::Connection(err.to_string());
        }
        let detail = err.to_string();
        let lowered = detail.to_lowercase();
        if lowered.contains("connection reset")
            || lowered.contains("connection refused")
            || lowered.contains("socket hang up")
            || lowered.contains("dns error")
            || lowered.contains("failed to lookup")
        {
            Self::Connection(detail)
        } else {
            Self::Other(detail)
        }
    }
}

/// A fully addressed outbound message.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub to_email: String,
    pub to_name: String,
    pub subject: String,
    pub html_body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &OutboundEmail) -> Result<(), MailerError>;
}

/// HTTP client for a Brevo-style transactional email API.
pub struct HttpMailer {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    sender_name: String,
    sender_email: String,
    reply_to: Option<String>,
    timeout: Duration,
}

impl HttpMailer {
    /// Builds a mailer from configuration; `None` when the provider is not
    /// configured, which downgrades dispatch to a logged no-op.
    pub fn from_config(cfg: &AppConfig) -> Option<Self> {
        let api_url = cfg.email_api_url.clone()?;
        let api_key = cfg.email_api_key.clone()?;
        let timeout = Duration::from_secs(cfg.email_timeout_secs);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Some(Self {
            http,
            api_url,
            api_key,
            sender_name: cfg.email_from_name.clone(),
            sender_email: cfg.email_from_address.clone(),
            reply_to: cfg.email_reply_to.clone(),
            timeout,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: &OutboundEmail) -> Result<(), MailerError> {
        let mut body = json!({
            "sender": { "name": self.sender_name, "email": self.sender_email },
            "to": [{ "email": message.to_email, "name": message.to_name }],
            "subject": message.subject,
            "htmlContent": message.html_body,
        });
        if let Some(reply_to) = &self.reply_to {
            body["replyTo"] = json!({ "email": reply_to });
        }

        let response = self
            .http
            .post(&self.api_url)
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MailerError::from_reqwest(e, self.timeout))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        #[derive(serde::Deserialize)]
        struct ProviderError {
            code: Option<String>,
            message: Option<String>,
        }
        let provider: Option<ProviderError> = response.json().await.ok();
        let (code, provider_message) = match provider {
            Some(p) => (p.code, p.message),
            None => (None, None),
        };
        Err(MailerError::Api {
            status: status.as_u16(),
            code,
            message: provider_message.unwrap_or_else(|| format!("status {}", status.as_u16())),
        })
    }
}

/// Sends confirmation emails with bounded, linearly backed-off retry.
#[derive(Clone)]
pub struct NotificationDispatcher {
    mailer: Option<Arc<dyn Mailer>>,
    brand_name: String,
    max_attempts: u32,
    base_delay: Duration,
}

impl NotificationDispatcher {
    pub fn new(mailer: Option<Arc<dyn Mailer>>, cfg: &AppConfig) -> Self {
        Self {
            mailer,
            brand_name: cfg.email_from_name.clone(),
            max_attempts: cfg.notification_max_attempts.max(1),
            base_delay: Duration::from_secs(cfg.notification_backoff_secs),
        }
    }

    #[cfg(test)]
    fn with_mailer(mailer: Arc<dyn Mailer>, max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            mailer: Some(mailer),
            brand_name: "Storefront".into(),
            max_attempts,
            base_delay,
        }
    }

    /// Sends the order confirmation, retrying transient failures up to the
    /// attempt ceiling. Never returns an error; the outcome carries the
    /// final disposition for logging.
    #[instrument(skip(self, email), fields(order_number = %email.order_number, to = %email.customer_email))]
    pub async fn send_order_confirmation(&self, email: &OrderConfirmationEmail) -> DispatchOutcome {
        let Some(mailer) = &self.mailer else {
            warn!("Email provider not configured; confirmation not sent");
            return DispatchOutcome::failed("Email service not configured".to_string(), None);
        };

        let message = OutboundEmail {
            to_email: email.customer_email.clone(),
            to_name: email.customer_name.clone(),
            subject: format!("Order Confirmation - {}", email.order_number),
            html_body: render_order_confirmation_html(email, &self.brand_name),
        };

        for attempt in 1..=self.max_attempts {
            match mailer.send(&message).await {
                Ok(()) => {
                    info!(attempt = attempt, "Confirmation email sent");
                    return DispatchOutcome::ok();
                }
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = self.base_delay * attempt;
                    warn!(
                        attempt = attempt,
                        error = %err,
                        retry_in = ?delay,
                        "Transient email failure; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    error!(attempt = attempt, error = %err, "Confirmation email failed");
                    let code = err.code();
                    return DispatchOutcome::failed(err.to_string(), code);
                }
            }
        }

        // Unreachable with max_attempts >= 1; kept for totality.
        DispatchOutcome::failed("all delivery attempts failed".to_string(), None)
    }

    /// Fire-and-forget dispatch: runs the send on a detached task and logs
    /// the outcome. The caller's request is never blocked or failed by it.
    pub fn dispatch_detached(&self, email: OrderConfirmationEmail) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let order_number = email.order_number.clone();
            let outcome = dispatcher.send_order_confirmation(&email).await;
            if !outcome.success {
                warn!(
                    order_number = %order_number,
                    error = outcome.error.as_deref().unwrap_or("unknown"),
                    error_code = outcome.error_code.as_deref().unwrap_or("-"),
                    "Order confirmation email was not delivered"
                );
            }
        });
    }
}

/// Renders the customer-facing confirmation email body.
pub fn render_order_confirmation_html(email: &OrderConfirmationEmail, brand: &str) -> String {
    let payment_method_text = if email.payment_method == "cash_on_delivery" {
        "Cash on Delivery"
    } else {
        "Prepaid Payment"
    };

    let mut items_html = String::new();
    for item in &email.items {
        let image_html = match &item.image {
            Some(src) => format!(
                r#"<img src="{}" alt="{}" style="width: 80px; height: 80px; object-fit: cover; border-radius: 8px;" />"#,
                src, item.name
            ),
            None => String::new(),
        };
        items_html.push_str(&format!(
            r#"<div style="padding: 15px; border-bottom: 1px solid #e5e7eb;">
  {image}
  <p style="margin: 0 0 5px 0; font-weight: 600;">{name}</p>
  <p style="margin: 0; font-size: 14px; color: #6b7280;">Size: {size} x Quantity: {quantity}</p>
  <p style="margin: 5px 0 0 0; font-weight: 600;">&#8377;{total}</p>
</div>
"#,
            image = image_html,
            name = item.name,
            size = item.size,
            quantity = item.quantity,
            total = item.total_price,
        ));
    }

    let tax_html = if email.tax > Decimal::ZERO {
        format!(
            r#"<p style="margin: 5px 0;">Tax: &#8377;{}</p>"#,
            email.tax
        )
    } else {
        String::new()
    };
    let shipping_html = if email.shipping_cost > Decimal::ZERO {
        format!(
            r#"<p style="margin: 5px 0;">Shipping: &#8377;{}</p>"#,
            email.shipping_cost
        )
    } else {
        String::new()
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>Order Confirmation</title>
</head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px;">
  <div style="background-color: #14b8a6; color: white; padding: 20px; text-align: center; border-radius: 8px 8px 0 0;">
    <h1 style="margin: 0;">{brand}</h1>
    <p style="margin: 10px 0 0 0;">Order Confirmation</p>
  </div>
  <div style="background-color: #f9fafb; padding: 30px; border-radius: 0 0 8px 8px;">
    <p>Dear {customer_name},</p>
    <p>Thank you for your order! We've received your order and will begin processing it shortly.</p>
    <div style="background-color: white; padding: 20px; border-radius: 8px; margin-bottom: 20px;">
      <h2 style="margin-top: 0; color: #14b8a6;">Order Details</h2>
      <p style="margin: 5px 0;"><strong>Order Number:</strong> {order_number}</p>
      <p style="margin: 5px 0;"><strong>Order Date:</strong> {order_date}</p>
      <p style="margin: 5px 0;"><strong>Payment Method:</strong> {payment_method}</p>
    </div>
    <div style="background-color: white; padding: 20px; border-radius: 8px; margin-bottom: 20px;">
      <h3 style="margin-top: 0; color: #14b8a6;">Order Items</h3>
      {items}
    </div>
    <div style="background-color: white; padding: 20px; border-radius: 8px; margin-bottom: 20px;">
      <h3 style="margin-top: 0; color: #14b8a6;">Shipping Address</h3>
      <p style="margin: 5px 0;">{address}</p>
      <p style="margin: 5px 0;">{city}, {state} {pincode}</p>
      <p style="margin: 5px 0;">{country}</p>
    </div>
    <div style="background-color: white; padding: 20px; border-radius: 8px; text-align: right;">
      <p style="margin: 5px 0;">Subtotal: &#8377;{subtotal}</p>
      {tax}
      {shipping}
      <p style="margin: 10px 0; font-size: 18px; font-weight: bold; color: #14b8a6;">Total: &#8377;{total}</p>
    </div>
    <p style="font-size: 14px; color: #6b7280; margin-top: 30px;">Estimated delivery: 5-7 business days. We'll send a tracking number once your order ships.</p>
  </div>
</body>
</html>
"#,
        brand = brand,
        customer_name = email.customer_name,
        order_number = email.order_number,
        order_date = email.order_date,
        payment_method = payment_method_text,
        items = items_html,
        address = email.shipping_address.address,
        city = email.shipping_address.city,
        state = email.shipping_address.state,
        pincode = email.shipping_address.pincode,
        country = email.shipping_address.country,
        subtotal = email.subtotal,
        tax = tax_html,
        shipping = shipping_html,
        total = email.total_amount,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    fn sample_email() -> OrderConfirmationEmail {
        OrderConfirmationEmail {
            order_number: "ORD-00000042".into(),
            customer_name: "Asha Rao".into(),
            customer_email: "asha@example.com".into(),
            order_date: "5 August 2026".into(),
            items: vec![EmailLineItem {
                name: "Handcrafted Wall Clock".into(),
                image: None,
                size: "12in".into(),
                quantity: 2,
                unit_price: dec!(100),
                total_price: dec!(200),
            }],
            subtotal: dec!(200),
            tax: dec!(0),
            shipping_cost: dec!(0),
            total_amount: dec!(200),
            payment_method: "cash_on_delivery".into(),
            shipping_address: EmailShippingAddress {
                address: "12 MG Road".into(),
                city: "Bengaluru".into(),
                state: "Karnataka".into(),
                pincode: "560001".into(),
                country: "India".into(),
            },
        }
    }

    /// Mailer that replays a scripted sequence of results and records how
    /// many times it was called.
    struct ScriptedMailer {
        script: Mutex<Vec<Result<(), MailerError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedMailer {
        fn new(script: Vec<Result<(), MailerError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl Mailer for ScriptedMailer {
        async fn send(&self, _message: &OutboundEmail) -> Result<(), MailerError> {
            *self.calls.lock().unwrap() += 1;
            self.script.lock().unwrap().remove(0)
        }
    }

    fn connection_reset() -> MailerError {
        MailerError::Connection("ECONNRESET: connection reset by peer".into())
    }

    fn auth_failure() -> MailerError {
        MailerError::Api {
            status: 401,
            code: Some("unauthorized".into()),
            message: "API key invalid".into(),
        }
    }

    #[test]
    fn classification_matches_retry_policy() {
        assert!(connection_reset().is_transient());
        assert!(MailerError::Timeout(Duration::from_secs(60)).is_transient());
        assert!(MailerError::Connection("dns error: failed to lookup".into()).is_transient());
        assert!(!auth_failure().is_transient());
        assert!(!MailerError::Other("malformed payload".into()).is_transient());
    }

    #[tokio::test]
    async fn retries_transient_failure_and_succeeds_on_third_attempt() {
        let mailer = ScriptedMailer::new(vec![
            Err(connection_reset()),
            Err(connection_reset()),
            Ok(()),
        ]);
        let dispatcher =
            NotificationDispatcher::with_mailer(mailer.clone(), 3, Duration::from_millis(0));

        let outcome = dispatcher.send_order_confirmation(&sample_email()).await;

        assert!(outcome.success);
        assert_eq!(mailer.calls(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_attempt_ceiling() {
        let mailer = ScriptedMailer::new(vec![
            Err(connection_reset()),
            Err(connection_reset()),
            Err(connection_reset()),
        ]);
        let dispatcher =
            NotificationDispatcher::with_mailer(mailer.clone(), 3, Duration::from_millis(0));

        let outcome = dispatcher.send_order_confirmation(&sample_email()).await;

        assert!(!outcome.success);
        assert_eq!(mailer.calls(), 3);
    }

    #[tokio::test]
    async fn does_not_retry_authentication_failure() {
        let mailer = ScriptedMailer::new(vec![Err(auth_failure()), Ok(())]);
        let dispatcher =
            NotificationDispatcher::with_mailer(mailer.clone(), 3, Duration::from_millis(0));

        let outcome = dispatcher.send_order_confirmation(&sample_email()).await;

        assert!(!outcome.success);
        assert_eq!(mailer.calls(), 1);
        assert_eq!(outcome.error_code.as_deref(), Some("unauthorized"));
    }

    #[tokio::test]
    async fn unconfigured_provider_is_a_soft_failure() {
        let cfg = crate::config::AppConfig::for_tests();
        let dispatcher = NotificationDispatcher::new(None, &cfg);

        let outcome = dispatcher.send_order_confirmation(&sample_email()).await;

        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("Email service not configured"));
    }

    #[test]
    fn rendered_email_contains_order_facts() {
        let html = render_order_confirmation_html(&sample_email(), "MS CRAFTS");
        assert!(html.contains("ORD-00000042"));
        assert!(html.contains("Handcrafted Wall Clock"));
        assert!(html.contains("Cash on Delivery"));
        assert!(html.contains("Bengaluru"));
        assert!(html.contains("MS CRAFTS"));
        // zero tax and shipping rows are suppressed
        assert!(!html.contains("Tax:"));
        assert!(!html.contains("Shipping:"));
    }
}
