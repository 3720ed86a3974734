//! Per-route, per-client token buckets.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::config::{Quota, RateLimitsConfig};

#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Bucket capacity and refill rate derived from a [`Quota`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketConfig {
    pub capacity: f64,
    pub refill_per_sec: f64,
}

impl From<Quota> for BucketConfig {
    fn from(quota: Quota) -> Self {
        let capacity = f64::from(quota.requests);
        Self {
            capacity,
            refill_per_sec: capacity / quota.per_secs.max(1) as f64,
        }
    }
}

/// How often idle buckets are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct Buckets {
    map: HashMap<(String, IpAddr), Bucket>,
    last_sweep: Instant,
}

pub struct RateLimiter {
    config: RateLimitsConfig,
    buckets: Mutex<Buckets>,
}

impl RateLimiter {
    pub fn new(config: RateLimitsConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(Buckets {
                map: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    /// Take one token from `client`'s bucket for `route`. `false` means rejected.
    pub async fn allow(&self, route: &str, client: IpAddr) -> bool {
        self.allow_at(route, client, Instant::now()).await
    }

    async fn allow_at(&self, route: &str, client: IpAddr, now: Instant) -> bool {
        if !self.config.enabled {
            return true;
        }
        let cfg = BucketConfig::from(self.config.quota_for(route));

        let mut lock = self.buckets.lock().await;
        if now.saturating_duration_since(lock.last_sweep) >= SWEEP_INTERVAL {
            self.sweep(&mut lock, now);
        }
        let bucket = lock
            .map
            .entry((route.to_string(), client))
            .or_insert_with(|| Bucket {
                tokens: cfg.capacity,
                last_refill: now,
            });
        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.last_refill = now;
        bucket.tokens = (bucket.tokens + (elapsed * cfg.refill_per_sec)).min(cfg.capacity);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Drop buckets that would be full by `now`; a fresh bucket starts full anyway.
    fn sweep(&self, buckets: &mut Buckets, now: Instant) {
        let before = buckets.map.len();
        buckets.map.retain(|(route, _), bucket| {
            let cfg = BucketConfig::from(self.config.quota_for(route));
            let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
            bucket.tokens + elapsed * cfg.refill_per_sec < cfg.capacity
        });
        buckets.last_sweep = now;
        let dropped = before - buckets.map.len();
        if dropped > 0 {
            tracing::debug!(dropped, remaining = buckets.map.len(), "swept idle rate limit buckets");
        }
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.buckets.lock().await.map.len()
    }
}
