use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::fulfillment::FulfillmentApi;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Platform {
    Instagram,
    YouTube,
    Telegram,
    Twitter,
    Facebook,
    TikTok,
}

impl Platform {
    pub const ALL: [Platform; 6] = [
        Platform::Instagram,
        Platform::YouTube,
        Platform::Telegram,
        Platform::Twitter,
        Platform::Facebook,
        Platform::TikTok,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Instagram => "Instagram",
            Platform::YouTube => "YouTube",
            Platform::Telegram => "Telegram",
            Platform::Twitter => "Twitter",
            Platform::Facebook => "Facebook",
            Platform::TikTok => "TikTok",
        }
    }

    pub fn parse(raw: &str) -> Option<Platform> {
        Platform::ALL.iter().copied().find(|p| p.as_str() == raw)
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Platform::Instagram => "📸",
            Platform::YouTube => "🎬",
            Platform::Telegram => "✈️",
            Platform::Twitter => "🐦",
            Platform::Facebook => "📘",
            Platform::TikTok => "🎵",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized remote catalog entry. Immutable once loaded; a reload
/// replaces the whole index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: i64,
    pub platform: Platform,
    pub category: String,
    pub name: String,
    pub base_price_per_1000: f64,
    pub min_quantity: u32,
    pub max_quantity: u32,
    pub supports_refill: bool,
    pub supports_cancel: bool,
}

impl Service {
    /// Watch-time style products run for a fixed duration; the quantity step
    /// is skipped and this implicit quantity applies.
    pub const FIXED_DURATION_QUANTITY: u32 = 1000;

    pub fn is_fixed_duration(&self) -> bool {
        self.platform == Platform::YouTube && self.category == "Watch Time"
    }

    /// Engagement unit for example-price lines, derived from the name.
    pub fn unit_label(&self) -> &'static str {
        let name = self.name.to_lowercase();
        if name.contains("follower") {
            "followers"
        } else if name.contains("subscribe") {
            "subscribers"
        } else if name.contains("member") {
            "members"
        } else if name.contains("like") {
            "likes"
        } else if name.contains("view") {
            "views"
        } else {
            "units"
        }
    }
}

/// Derives (platform, category) from a remote service name. Services for
/// unsupported platforms are skipped by the loader.
pub fn classify(name: &str) -> Option<(Platform, String)> {
    let name = name.to_lowercase();

    let platform = if name.contains("instagram") {
        Platform::Instagram
    } else if name.contains("youtube") {
        Platform::YouTube
    } else if name.contains("telegram") {
        Platform::Telegram
    } else if name.contains("twitter") {
        Platform::Twitter
    } else if name.contains("facebook") {
        Platform::Facebook
    } else if name.contains("tiktok") {
        Platform::TikTok
    } else {
        return None;
    };

    let category = match platform {
        Platform::Instagram => {
            if name.contains("follower") {
                "Followers"
            } else if name.contains("like") {
                "Likes"
            } else if name.contains("view") {
                "Views"
            } else if name.contains("comment") {
                "Comments"
            } else if name.contains("story") {
                "Story"
            } else if name.contains("share") || name.contains("save") {
                "Shares/Saves"
            } else {
                "Uncategorized"
            }
        }
        Platform::YouTube => {
            if name.contains("watch") || name.contains("time") {
                "Watch Time"
            } else if name.contains("subscribe") {
                "Subscribers"
            } else if name.contains("short") {
                "Shorts Likes/Views"
            } else if name.contains("live") || name.contains("stream") {
                "Livestream"
            } else if name.contains("like") || name.contains("view") {
                "Video Likes/Views"
            } else {
                "Uncategorized"
            }
        }
        Platform::Telegram => {
            if name.contains("member") {
                "Members"
            } else if name.contains("reaction") {
                "Reactions"
            } else if name.contains("view") {
                "Views"
            } else {
                "Uncategorized"
            }
        }
        Platform::Twitter => {
            if name.contains("view") {
                "Views"
            } else if name.contains("like") {
                "Likes"
            } else {
                "Uncategorized"
            }
        }
        Platform::Facebook => {
            if name.contains("follower") {
                "Followers"
            } else if name.contains("like") {
                "Likes"
            } else if name.contains("view") {
                "Views"
            } else {
                "Uncategorized"
            }
        }
        Platform::TikTok => {
            if name.contains("follower") {
                "Followers"
            } else if name.contains("like") {
                "Likes"
            } else if name.contains("save") || name.contains("share") {
                "Engagement"
            } else {
                "Uncategorized"
            }
        }
    };

    Some((platform, category.to_string()))
}

/// The remote API is loose with types (ids and rates arrive as strings or
/// numbers), so normalization goes through `Value`.
pub fn normalize(raw: &Value) -> Option<Service> {
    let name = raw.get("name")?.as_str()?.to_string();
    let (platform, category) = classify(&name)?;
    let id = value_as_i64(raw.get("service")?)?;
    let base_price_per_1000 = value_as_f64(raw.get("rate")?)?;

    Some(Service {
        id,
        platform,
        category,
        name,
        base_price_per_1000,
        min_quantity: raw.get("min").and_then(value_as_i64).unwrap_or(1) as u32,
        max_quantity: raw
            .get("max")
            .and_then(value_as_i64)
            .unwrap_or(1_000_000) as u32,
        supports_refill: raw
            .get("refill")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        supports_cancel: raw
            .get("cancel")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

fn value_as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Default)]
struct CatalogIndex {
    by_platform: BTreeMap<Platform, BTreeMap<String, Vec<Service>>>,
    by_id: HashMap<i64, Service>,
}

impl CatalogIndex {
    fn build(raw_services: &[Value]) -> Self {
        let mut index = CatalogIndex::default();
        for raw in raw_services {
            let Some(service) = normalize(raw) else {
                debug!("skipping unclassifiable catalog entry: {raw}");
                continue;
            };
            index
                .by_platform
                .entry(service.platform)
                .or_default()
                .entry(service.category.clone())
                .or_default()
                .push(service.clone());
            index.by_id.insert(service.id, service);
        }
        index
    }
}

/// In-memory service index fed from the fulfillment API. Conversations hold
/// service ids, never `Service` values, so a reload mid-conversation turns
/// into a "service outdated" refusal rather than stale data.
pub struct Catalog {
    api: Arc<dyn FulfillmentApi>,
    inner: RwLock<CatalogIndex>,
}

impl Catalog {
    /// Initial load. An unreachable or unparsable catalog fails startup.
    pub async fn load(api: Arc<dyn FulfillmentApi>) -> Result<Self> {
        let raw = api
            .services()
            .await
            .context("could not fetch the service catalog")?;
        let index = CatalogIndex::build(&raw);
        if index.by_id.is_empty() {
            anyhow::bail!("service catalog is empty after normalization");
        }
        info!("loaded {} services from the catalog", index.by_id.len());
        Ok(Self {
            api,
            inner: RwLock::new(index),
        })
    }

    /// Replaces the whole index. Used after a margin change or on demand.
    pub async fn reload(&self) -> Result<usize> {
        let raw = self
            .api
            .services()
            .await
            .context("could not refresh the service catalog")?;
        let index = CatalogIndex::build(&raw);
        let count = index.by_id.len();
        *self.inner.write().await = index;
        info!("reloaded catalog with {count} services");
        Ok(count)
    }

    pub async fn find(&self, id: i64) -> Option<Service> {
        self.inner.read().await.by_id.get(&id).cloned()
    }

    pub async fn platforms(&self) -> Vec<Platform> {
        self.inner.read().await.by_platform.keys().copied().collect()
    }

    pub async fn categories(&self, platform: Platform) -> Vec<String> {
        self.inner
            .read()
            .await
            .by_platform
            .get(&platform)
            .map(|cats| cats.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn services_in(&self, platform: Platform, category: &str) -> Vec<Service> {
        self.inner
            .read()
            .await
            .by_platform
            .get(&platform)
            .and_then(|cats| cats.get(category))
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classify_detects_platform_and_category() {
        assert_eq!(
            classify("Instagram Followers [Real]"),
            Some((Platform::Instagram, "Followers".into()))
        );
        assert_eq!(
            classify("YouTube WatchTime 4000h"),
            Some((Platform::YouTube, "Watch Time".into()))
        );
        assert_eq!(
            classify("Telegram Channel Members"),
            Some((Platform::Telegram, "Members".into()))
        );
        assert_eq!(classify("Spotify Plays"), None);
    }

    #[test]
    fn normalize_tolerates_string_typed_fields() {
        let raw = json!({
            "service": "1234",
            "name": "TikTok Likes Instant",
            "rate": "0.90",
            "min": "10",
            "max": "50000",
            "refill": true
        });
        let service = normalize(&raw).unwrap();
        assert_eq!(service.id, 1234);
        assert_eq!(service.platform, Platform::TikTok);
        assert_eq!(service.category, "Likes");
        assert!((service.base_price_per_1000 - 0.90).abs() < 1e-9);
        assert_eq!(service.min_quantity, 10);
        assert!(service.supports_refill);
        assert!(!service.supports_cancel);
    }

    #[test]
    fn normalize_skips_entries_without_usable_fields() {
        assert!(normalize(&json!({ "name": "Instagram Likes" })).is_none());
        assert!(normalize(&json!({ "service": 5, "rate": 1.0 })).is_none());
    }

    #[test]
    fn watch_time_services_are_fixed_duration() {
        let service = normalize(&json!({
            "service": 9,
            "name": "YouTube Watch Time 1000 Hours",
            "rate": 800.0,
        }))
        .unwrap();
        assert!(service.is_fixed_duration());
    }
}
