use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{Platform, Service};
use crate::pricing::{self, Margin};

/// A checkout-complete order. Carries its own service snapshot (name,
/// platform, prices) so a catalog reload cannot change what was quoted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub chat_id: i64,
    pub service_id: i64,
    pub service_name: String,
    pub platform: Platform,
    pub category: String,
    pub link: String,
    pub quantity: u32,
    /// User-facing total, margin included.
    pub amount: f64,
    /// Wholesale cost against the fulfillment balance.
    pub cost: f64,
    /// Proof screenshot path or hosted payment-link id.
    pub payment_reference: Option<String>,
    pub remote_fulfillment_id: Option<i64>,
}

impl Order {
    /// Order ids are minted per user and timestamp and never reused;
    /// idempotent processing keys on them.
    pub fn mint_id(chat_id: i64, now: DateTime<Utc>) -> String {
        format!("{}_{}", chat_id, now.timestamp())
    }

    pub fn build(
        order_id: String,
        chat_id: i64,
        service: &Service,
        link: String,
        quantity: u32,
        margin: Margin,
    ) -> Self {
        Self {
            order_id,
            chat_id,
            service_id: service.id,
            service_name: service.name.clone(),
            platform: service.platform,
            category: service.category.clone(),
            link,
            quantity,
            amount: pricing::quote(service.base_price_per_1000, quantity, margin),
            cost: pricing::wholesale_cost(service.base_price_per_1000, quantity),
            payment_reference: None,
            remote_fulfillment_id: None,
        }
    }

    pub fn profit(&self) -> f64 {
        self.amount - self.cost
    }
}

/// Durable record of an order that cleared payment but could not be
/// submitted because the remote balance was short.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub order: Order,
    pub queued_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::MarkupMode;

    fn service() -> Service {
        Service {
            id: 42,
            platform: Platform::Instagram,
            category: "Followers".into(),
            name: "Instagram Followers".into(),
            base_price_per_1000: 100.0,
            min_quantity: 100,
            max_quantity: 10_000,
            supports_refill: false,
            supports_cancel: false,
        }
    }

    #[test]
    fn build_snapshots_price_and_cost() {
        let order = Order::build(
            "9_1700000000".into(),
            9,
            &service(),
            "https://instagram.com/u".into(),
            500,
            Margin::new(MarkupMode::Factor, 1.4),
        );
        assert!((order.amount - 70.0).abs() < 1e-9);
        assert!((order.cost - 50.0).abs() < 1e-9);
        assert!((order.profit() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn mint_id_is_chat_scoped() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(Order::mint_id(12345, now), "12345_1700000000");
    }
}
