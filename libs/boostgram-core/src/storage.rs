use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::order::{Order, PendingOrder};
use crate::pricing::{Margin, MarkupMode};

/// Flat-file JSON persistence. The bot and the webhook receiver share one
/// data directory, so every store re-reads its file under the lock before
/// mutating and writes through a temp file.
fn read_json<T: DeserializeOwned + Default>(path: &Path) -> T {
    match fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!("could not parse {}: {e}; starting empty", path.display());
                T::default()
            }
        },
        Err(_) => T::default(),
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let raw = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, raw).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

/// Exactly-once guard for payment confirmations. Both confirmation paths
/// (admin approval, webhook) insert here before any remote call.
pub struct ProcessedOrders {
    path: PathBuf,
    inner: Mutex<HashSet<String>>,
}

impl ProcessedOrders {
    pub fn open(path: PathBuf) -> Self {
        let initial: HashSet<String> = read_json(&path);
        Self {
            path,
            inner: Mutex::new(initial),
        }
    }

    /// Claims `order_id` for processing. Returns false if some path already
    /// claimed it, making duplicate deliveries a no-op.
    pub async fn try_begin(&self, order_id: &str) -> bool {
        let mut set = self.inner.lock().await;
        let on_disk: HashSet<String> = read_json(&self.path);
        set.extend(on_disk);
        if !set.insert(order_id.to_string()) {
            return false;
        }
        if let Err(e) = write_json(&self.path, &*set) {
            warn!("could not persist processed-order set: {e}");
        }
        true
    }

    pub async fn contains(&self, order_id: &str) -> bool {
        self.inner.lock().await.contains(order_id)
    }
}

/// Durable queue of orders deferred on insufficient balance.
pub struct PendingQueue {
    path: PathBuf,
    inner: Mutex<Vec<PendingOrder>>,
}

impl PendingQueue {
    pub fn open(path: PathBuf) -> Self {
        let initial: Vec<PendingOrder> = read_json(&path);
        Self {
            path,
            inner: Mutex::new(initial),
        }
    }

    pub async fn enqueue(&self, order: Order) -> Result<()> {
        let mut queue = self.inner.lock().await;
        *queue = read_json(&self.path);
        queue.push(PendingOrder {
            order,
            queued_at: Utc::now(),
        });
        write_json(&self.path, &*queue)
    }

    /// Oldest-first view for the sweep.
    pub async fn snapshot(&self) -> Vec<PendingOrder> {
        let mut queue = self.inner.lock().await;
        *queue = read_json(&self.path);
        queue.clone()
    }

    pub async fn remove(&self, order_id: &str) -> Result<()> {
        let mut queue = self.inner.lock().await;
        *queue = read_json(&self.path);
        queue.retain(|entry| entry.order.order_id != order_id);
        write_json(&self.path, &*queue)
    }

    pub async fn len(&self) -> usize {
        self.snapshot().await.len()
    }
}

/// Payment-link id to chat / order-detail mappings for the webhook path.
/// Reloaded from disk before every lookup so a restart or a concurrent
/// writer never leaves the handler acting on a stale copy.
pub struct LinkMappings {
    chat_path: PathBuf,
    order_path: PathBuf,
    lock: Mutex<()>,
}

impl LinkMappings {
    pub fn open(chat_path: PathBuf, order_path: PathBuf) -> Self {
        Self {
            chat_path,
            order_path,
            lock: Mutex::new(()),
        }
    }

    pub async fn insert(&self, payment_link_id: &str, chat_id: i64, order: &Order) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut chats: HashMap<String, i64> = read_json(&self.chat_path);
        let mut orders: HashMap<String, Order> = read_json(&self.order_path);
        chats.insert(payment_link_id.to_string(), chat_id);
        orders.insert(payment_link_id.to_string(), order.clone());
        write_json(&self.chat_path, &chats)?;
        write_json(&self.order_path, &orders)
    }

    /// Resolves and removes a payment link in one step; a second delivery
    /// for the same link id finds nothing.
    pub async fn take(&self, payment_link_id: &str) -> Option<(i64, Order)> {
        let _guard = self.lock.lock().await;
        let mut chats: HashMap<String, i64> = read_json(&self.chat_path);
        let mut orders: HashMap<String, Order> = read_json(&self.order_path);
        let chat_id = chats.remove(payment_link_id)?;
        let order = orders.remove(payment_link_id)?;
        if let Err(e) = write_json(&self.chat_path, &chats) {
            warn!("could not persist link->chat mapping: {e}");
        }
        if let Err(e) = write_json(&self.order_path, &orders) {
            warn!("could not persist link->order mapping: {e}");
        }
        Some((chat_id, order))
    }
}

/// Everyone who has ever started the bot; the broadcast audience.
pub struct KnownUsers {
    path: PathBuf,
    inner: Mutex<HashSet<i64>>,
}

impl KnownUsers {
    pub fn open(path: PathBuf) -> Self {
        let initial: HashSet<i64> = read_json(&path);
        Self {
            path,
            inner: Mutex::new(initial),
        }
    }

    pub async fn add(&self, chat_id: i64) {
        let mut set = self.inner.lock().await;
        let on_disk: HashSet<i64> = read_json(&self.path);
        set.extend(on_disk);
        if set.insert(chat_id) {
            if let Err(e) = write_json(&self.path, &*set) {
                warn!("could not persist known users: {e}");
            }
        }
    }

    pub async fn all(&self) -> Vec<i64> {
        let mut set = self.inner.lock().await;
        let on_disk: HashSet<i64> = read_json(&self.path);
        set.extend(on_disk);
        set.iter().copied().collect()
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Stats {
    total_orders: u64,
}

/// Running totals shown on the admin panel.
pub struct StatsStore {
    path: PathBuf,
    inner: Mutex<Stats>,
}

impl StatsStore {
    pub fn open(path: PathBuf) -> Self {
        let initial: Stats = read_json(&path);
        Self {
            path,
            inner: Mutex::new(initial),
        }
    }

    pub async fn record_order(&self) -> u64 {
        let mut stats = self.inner.lock().await;
        *stats = read_json(&self.path);
        stats.total_orders += 1;
        if let Err(e) = write_json(&self.path, &*stats) {
            warn!("could not persist stats: {e}");
        }
        stats.total_orders
    }

    pub async fn total_orders(&self) -> u64 {
        let mut stats = self.inner.lock().await;
        *stats = read_json(&self.path);
        stats.total_orders
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MarginFile {
    value: f64,
}

/// The single persisted margin number. Interpretation (factor vs added
/// percent) is fixed by deployment configuration, not stored.
pub struct MarginStore {
    path: PathBuf,
    mode: MarkupMode,
    inner: Mutex<f64>,
}

impl MarginStore {
    pub fn open(path: PathBuf, mode: MarkupMode) -> Self {
        let value = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<MarginFile>(&raw) {
                Ok(file) => file.value,
                Err(_) => {
                    warn!(
                        "could not parse {}; using default margin",
                        path.display()
                    );
                    mode.default_value()
                }
            },
            Err(_) => mode.default_value(),
        };
        info!("margin loaded: {value} ({mode:?})");
        Self {
            path,
            mode,
            inner: Mutex::new(value),
        }
    }

    pub async fn margin(&self) -> Margin {
        Margin::new(self.mode, *self.inner.lock().await)
    }

    pub async fn set_percent(&self, percent: f64) -> Result<Margin> {
        let margin = Margin::from_percent(self.mode, percent);
        let mut value = self.inner.lock().await;
        *value = margin.value;
        write_json(&self.path, &MarginFile { value: margin.value })?;
        info!("margin updated to {} ({:?})", margin.value, self.mode);
        Ok(margin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Platform;
    use tempfile::tempdir;

    fn order(id: &str, cost: f64) -> Order {
        Order {
            order_id: id.into(),
            chat_id: 77,
            service_id: 5,
            service_name: "Instagram Likes".into(),
            platform: Platform::Instagram,
            category: "Likes".into(),
            link: "https://instagram.com/p/x".into(),
            quantity: 500,
            amount: cost * 1.4,
            cost,
            payment_reference: None,
            remote_fulfillment_id: None,
        }
    }

    #[tokio::test]
    async fn processed_set_claims_each_id_once() {
        let dir = tempdir().unwrap();
        let set = ProcessedOrders::open(dir.path().join("processed.json"));
        assert!(set.try_begin("77_1").await);
        assert!(!set.try_begin("77_1").await);
        assert!(set.try_begin("77_2").await);
    }

    #[tokio::test]
    async fn processed_set_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("processed.json");
        {
            let set = ProcessedOrders::open(path.clone());
            assert!(set.try_begin("77_1").await);
        }
        let reopened = ProcessedOrders::open(path);
        assert!(!reopened.try_begin("77_1").await);
    }

    #[tokio::test]
    async fn pending_queue_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pending.json");
        {
            let queue = PendingQueue::open(path.clone());
            queue.enqueue(order("77_1", 50.0)).await.unwrap();
            queue.enqueue(order("77_2", 30.0)).await.unwrap();
        }
        let reopened = PendingQueue::open(path);
        let entries = reopened.snapshot().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].order.order_id, "77_1");

        reopened.remove("77_1").await.unwrap();
        assert_eq!(reopened.len().await, 1);
        assert_eq!(reopened.snapshot().await[0].order.order_id, "77_2");
    }

    #[tokio::test]
    async fn link_mappings_take_is_single_shot() {
        let dir = tempdir().unwrap();
        let maps = LinkMappings::open(
            dir.path().join("chat.json"),
            dir.path().join("order.json"),
        );
        maps.insert("plink_abc", 77, &order("77_1", 50.0)).await.unwrap();

        let (chat, taken) = maps.take("plink_abc").await.unwrap();
        assert_eq!(chat, 77);
        assert_eq!(taken.order_id, "77_1");
        assert!(maps.take("plink_abc").await.is_none());
    }

    #[tokio::test]
    async fn margin_store_defaults_then_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("margin.json");
        let store = MarginStore::open(path.clone(), MarkupMode::Factor);
        assert!((store.margin().await.factor() - 1.4).abs() < 1e-9);

        store.set_percent(25.0).await.unwrap();
        let reopened = MarginStore::open(path, MarkupMode::Factor);
        assert!((reopened.margin().await.factor() - 1.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn stats_count_orders() {
        let dir = tempdir().unwrap();
        let stats = StatsStore::open(dir.path().join("stats.json"));
        assert_eq!(stats.record_order().await, 1);
        assert_eq!(stats.record_order().await, 2);
        assert_eq!(stats.total_orders().await, 2);
    }
}
