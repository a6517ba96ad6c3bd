use std::time::Duration;

use anyhow::{anyhow, Result};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use tracing::info;

type HmacSha256 = Hmac<Sha256>;

/// A hosted payment link, delivered to the customer out-of-band via SMS.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentLink {
    pub id: String,
    pub short_url: String,
}

/// Client for the hosted payment-link provider.
pub struct PaymentGateway {
    http: Client,
    key_id: String,
    key_secret: String,
}

impl PaymentGateway {
    const PAYMENT_LINKS_URL: &'static str = "https://api.razorpay.com/v1/payment_links";

    pub fn new(key_id: String, key_secret: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            http,
            key_id,
            key_secret,
        })
    }

    /// Creates a payment link for `amount_inr`, referenced by the order id,
    /// with an SMS notification to the customer's phone.
    pub async fn create_payment_link(
        &self,
        amount_inr: f64,
        reference_id: &str,
        phone: &str,
        description: &str,
    ) -> Result<PaymentLink> {
        let amount_paise = (amount_inr * 100.0).round() as i64;
        let body = json!({
            "amount": amount_paise,
            "currency": "INR",
            "reference_id": reference_id,
            "description": description,
            "customer": { "contact": format!("+91{phone}") },
            "notify": { "sms": true },
        });

        info!(reference_id, amount_paise, "creating payment link");
        let resp = self
            .http
            .post(Self::PAYMENT_LINKS_URL)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(anyhow!("payment gateway returned {status}: {text}"));
        }
        serde_json::from_str(&text)
            .map_err(|_| anyhow!("unexpected payment link response: {text}"))
    }
}

/// Verifies the gateway's HMAC-SHA256 hex signature over the raw request
/// body. `verify_slice` compares in constant time.
pub fn verify_webhook_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}

/// The webhook payload shape, reduced to the fields the receiver acts on.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    #[serde(default)]
    pub payload: WebhookPayload,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    pub payment_link: Option<WebhookPaymentLink>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookPaymentLink {
    pub entity: WebhookPaymentLinkEntity,
}

#[derive(Debug, Deserialize)]
pub struct WebhookPaymentLinkEntity {
    pub id: String,
}

impl WebhookEvent {
    pub const PAYMENT_LINK_PAID: &'static str = "payment_link.paid";

    pub fn payment_link_id(&self) -> Option<&str> {
        self.payload
            .payment_link
            .as_ref()
            .map(|pl| pl.entity.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn fresh_signature_is_accepted() {
        let secret = "whsec_test";
        let body = br#"{"event":"payment_link.paid"}"#;
        let sig = sign(secret, body);
        assert!(verify_webhook_signature(secret, body, &sig));
    }

    #[test]
    fn tampered_body_with_original_signature_is_rejected() {
        let secret = "whsec_test";
        let body = br#"{"event":"payment_link.paid","amount":7000}"#;
        let sig = sign(secret, body);
        let tampered = br#"{"event":"payment_link.paid","amount":1}"#;
        assert!(!verify_webhook_signature(secret, tampered, &sig));
    }

    #[test]
    fn malformed_signatures_are_rejected() {
        assert!(!verify_webhook_signature("whsec_test", b"{}", "not-hex"));
        assert!(!verify_webhook_signature("whsec_test", b"{}", ""));
    }

    #[test]
    fn webhook_event_extracts_payment_link_id() {
        let event: WebhookEvent = serde_json::from_str(
            r#"{
                "event": "payment_link.paid",
                "payload": { "payment_link": { "entity": { "id": "plink_N5" } } }
            }"#,
        )
        .unwrap();
        assert_eq!(event.event, WebhookEvent::PAYMENT_LINK_PAID);
        assert_eq!(event.payment_link_id(), Some("plink_N5"));
    }

    #[test]
    fn webhook_event_tolerates_missing_payload() {
        let event: WebhookEvent =
            serde_json::from_str(r#"{"event": "payment.captured"}"#).unwrap();
        assert_eq!(event.payment_link_id(), None);
    }
}
