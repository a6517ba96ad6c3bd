use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::info;

/// Remote order status, folded into the handful of states the poller acts
/// on. Anything unrecognized is reported verbatim as in-progress.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteStatus {
    Completed,
    Canceled,
    Partial { remains: String },
    InProgress(String),
}

impl RemoteStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RemoteStatus::InProgress(_))
    }

    fn from_response(body: &Value) -> Self {
        let status = body
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string();
        match status.to_lowercase().as_str() {
            "completed" => RemoteStatus::Completed,
            "canceled" | "fail" => RemoteStatus::Canceled,
            "partial" => RemoteStatus::Partial {
                remains: body
                    .get("remains")
                    .map(display_value)
                    .unwrap_or_else(|| "?".into()),
            },
            _ => RemoteStatus::InProgress(status),
        }
    }
}

fn display_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Boundary to the third-party fulfillment service. The production client
/// speaks the key-authenticated `action=` GET protocol; tests script this
/// trait directly.
#[async_trait]
pub trait FulfillmentApi: Send + Sync {
    async fn services(&self) -> Result<Vec<Value>>;
    async fn add_order(&self, service: i64, link: &str, quantity: u32) -> Result<i64>;
    async fn order_status(&self, remote_id: i64) -> Result<RemoteStatus>;
    async fn balance(&self) -> Result<f64>;
}

pub struct FulfillmentClient {
    http: Client,
    base_url: String,
    key: String,
}

impl FulfillmentClient {
    pub fn new(base_url: String, key: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            http,
            base_url,
            key,
        })
    }

    /// Every action is a GET on the same endpoint. Non-JSON and error bodies
    /// come back as recoverable errors, never panics.
    async fn call(&self, params: &[(&str, String)]) -> Result<Value> {
        let mut query: Vec<(&str, String)> = vec![("key", self.key.clone())];
        query.extend_from_slice(params);

        let resp = self
            .http
            .get(&self.base_url)
            .query(&query)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(anyhow!("fulfillment API returned {status}: {text}"));
        }
        serde_json::from_str(&text)
            .map_err(|_| anyhow!("fulfillment API returned non-JSON body: {text}"))
    }
}

#[async_trait]
impl FulfillmentApi for FulfillmentClient {
    async fn services(&self) -> Result<Vec<Value>> {
        let body = self.call(&[("action", "services".into())]).await?;
        body.as_array()
            .cloned()
            .ok_or_else(|| anyhow!("services response is not an array: {body}"))
    }

    async fn add_order(&self, service: i64, link: &str, quantity: u32) -> Result<i64> {
        info!(service, quantity, "placing fulfillment order");
        let body = self
            .call(&[
                ("action", "add".into()),
                ("service", service.to_string()),
                ("link", link.to_string()),
                ("quantity", quantity.to_string()),
            ])
            .await?;
        info!("fulfillment add response: {body}");
        parse_id(body.get("order"))
            .ok_or_else(|| anyhow!("fulfillment add did not return an order id: {body}"))
    }

    async fn order_status(&self, remote_id: i64) -> Result<RemoteStatus> {
        let body = self
            .call(&[
                ("action", "status".into()),
                ("order", remote_id.to_string()),
            ])
            .await?;
        Ok(RemoteStatus::from_response(&body))
    }

    async fn balance(&self) -> Result<f64> {
        let body = self.call(&[("action", "balance".into())]).await?;
        match body.get("balance") {
            Some(Value::Number(n)) => n
                .as_f64()
                .ok_or_else(|| anyhow!("balance is not representable: {body}")),
            Some(Value::String(s)) => s
                .trim()
                .parse()
                .map_err(|_| anyhow!("balance is not a number: {body}")),
            _ => Err(anyhow!("balance response missing balance field: {body}")),
        }
    }
}

fn parse_id(v: Option<&Value>) -> Option<i64> {
    match v? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_parsing_covers_terminal_states() {
        assert_eq!(
            RemoteStatus::from_response(&json!({"status": "Completed"})),
            RemoteStatus::Completed
        );
        assert_eq!(
            RemoteStatus::from_response(&json!({"status": "canceled"})),
            RemoteStatus::Canceled
        );
        assert_eq!(
            RemoteStatus::from_response(&json!({"status": "fail"})),
            RemoteStatus::Canceled
        );
        assert_eq!(
            RemoteStatus::from_response(&json!({"status": "Partial", "remains": 120})),
            RemoteStatus::Partial {
                remains: "120".into()
            }
        );
    }

    #[test]
    fn unknown_statuses_stay_in_progress() {
        let status = RemoteStatus::from_response(&json!({"status": "In progress"}));
        assert!(!status.is_terminal());
        assert_eq!(status, RemoteStatus::InProgress("In progress".into()));

        let missing = RemoteStatus::from_response(&json!({}));
        assert!(!missing.is_terminal());
    }

    #[test]
    fn order_ids_parse_from_numbers_and_strings() {
        assert_eq!(parse_id(Some(&json!(991))), Some(991));
        assert_eq!(parse_id(Some(&json!("991"))), Some(991));
        assert_eq!(parse_id(Some(&json!({"nested": 1}))), None);
        assert_eq!(parse_id(None), None);
    }
}
