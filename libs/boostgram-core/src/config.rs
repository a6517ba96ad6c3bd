use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::pricing::MarkupMode;

/// How a confirmed order collects payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMode {
    /// Self-service UPI: QR code in chat, screenshot proof, admin approval.
    UpiQr,
    /// Hosted payment link dispatched via SMS, confirmed by webhook.
    PaymentLink,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub admin_ids: Vec<i64>,
    pub fulfillment_url: String,
    pub fulfillment_key: String,
    pub upi_id: String,
    pub payment_mode: PaymentMode,
    pub markup_mode: MarkupMode,
    pub data_dir: PathBuf,
    pub gateway: Option<GatewayConfig>,
    pub webhook_bind: SocketAddr,
    pub poll_interval: Duration,
    pub sweep_interval: Duration,
}

impl Config {
    /// Builds the configuration from environment variables. Missing required
    /// variables are a startup-fatal error.
    pub fn from_env() -> Result<Self> {
        let bot_token = require("BOT_TOKEN")?;
        let admin_ids = parse_admin_ids(&require("ADMIN_IDS")?)?;
        let fulfillment_url = require("FULFILLMENT_API_URL")?;
        let fulfillment_key = require("FULFILLMENT_API_KEY")?;
        let upi_id = require("UPI_ID")?;

        let payment_mode = match env::var("PAYMENT_MODE").as_deref() {
            Err(_) | Ok("upi_qr") => PaymentMode::UpiQr,
            Ok("payment_link") => PaymentMode::PaymentLink,
            Ok(other) => bail!("PAYMENT_MODE must be upi_qr or payment_link, got '{other}'"),
        };

        let markup_mode = match env::var("MARKUP_MODE").as_deref() {
            Err(_) | Ok("factor") => MarkupMode::Factor,
            Ok("added_percent") => MarkupMode::AddedPercent,
            Ok(other) => bail!("MARKUP_MODE must be factor or added_percent, got '{other}'"),
        };

        let gateway = match (env::var("RAZORPAY_KEY_ID"), env::var("RAZORPAY_KEY_SECRET")) {
            (Ok(key_id), Ok(key_secret)) => Some(GatewayConfig {
                key_id,
                key_secret,
                webhook_secret: env::var("RAZORPAY_WEBHOOK_SECRET").ok(),
            }),
            _ => None,
        };
        if payment_mode == PaymentMode::PaymentLink && gateway.is_none() {
            bail!("PAYMENT_MODE=payment_link requires RAZORPAY_KEY_ID and RAZORPAY_KEY_SECRET");
        }

        let data_dir = PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "data".into()));

        let webhook_bind = env::var("WEBHOOK_BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:5000".into())
            .parse()
            .context("WEBHOOK_BIND_ADDR is not a valid socket address")?;

        Ok(Self {
            bot_token,
            admin_ids,
            fulfillment_url,
            fulfillment_key,
            upi_id,
            payment_mode,
            markup_mode,
            data_dir,
            gateway,
            webhook_bind,
            poll_interval: duration_from_env("POLL_INTERVAL_SECS", 300)?,
            sweep_interval: duration_from_env("SWEEP_INTERVAL_SECS", 600)?,
        })
    }

    pub fn data_file(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    pub fn proofs_dir(&self) -> PathBuf {
        self.data_dir.join("payment_proofs")
    }

    pub fn is_admin(&self, chat_id: i64) -> bool {
        self.admin_ids.contains(&chat_id)
    }
}

fn require(key: &str) -> Result<String> {
    let val = env::var(key).with_context(|| format!("{key} is not set"))?;
    if val.trim().is_empty() {
        bail!("{key} is empty");
    }
    Ok(val)
}

fn parse_admin_ids(raw: &str) -> Result<Vec<i64>> {
    let ids: Vec<i64> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().with_context(|| format!("bad admin id '{s}'")))
        .collect::<Result<_>>()?;
    if ids.is_empty() {
        bail!("ADMIN_IDS contains no ids");
    }
    Ok(ids)
}

fn duration_from_env(key: &str, default_secs: u64) -> Result<Duration> {
    match env::var(key) {
        Err(_) => Ok(Duration::from_secs(default_secs)),
        Ok(raw) => {
            let secs: u64 = raw
                .parse()
                .with_context(|| format!("{key} must be a number of seconds"))?;
            Ok(Duration::from_secs(secs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::parse_admin_ids;

    #[test]
    fn admin_ids_parse_comma_list() {
        assert_eq!(
            parse_admin_ids("123, 456,789").unwrap(),
            vec![123, 456, 789]
        );
    }

    #[test]
    fn admin_ids_reject_garbage() {
        assert!(parse_admin_ids("123,abc").is_err());
        assert!(parse_admin_ids("").is_err());
    }
}
