// =============================================================================
// ORDER CACHE
// =============================================================================
// Redis cache for single-order lookups (`order:<orderId>`).
//
// Cache errors are logged and otherwise ignored: Redis being down makes
// reads slower, never wrong.
// =============================================================================

use std::time::{Duration, Instant};

use redis::aio::ConnectionManager;

use crate::metrics;
use crate::models::Order;

#[derive(Clone)]
pub struct OrderCache {
    conn: ConnectionManager,
    ttl: Duration,
}

fn cache_key(order_id: &str) -> String {
    format!("order:{order_id}")
}

impl OrderCache {
    pub fn new(conn: ConnectionManager, ttl: Duration) -> Self {
        Self { conn, ttl }
    }

    pub async fn get(&self, order_id: &str) -> Option<Order> {
        let start = Instant::now();
        let cached: Option<String> = redis::cmd("GET")
            .arg(cache_key(order_id))
            .query_async(&mut self.conn.clone())
            .await
            .map_err(|e| tracing::warn!(error = %e, "Order cache read failed"))
            .ok()
            .flatten();
        metrics::record_redis_operation("get", start.elapsed().as_secs_f64());

        cached.and_then(|json| serde_json::from_str(&json).ok())
    }

    pub async fn put(&self, order: &Order) {
        let Ok(json) = serde_json::to_string(order) else {
            return;
        };
        let start = Instant::now();
        let result: Result<(), _> = redis::cmd("SETEX")
            .arg(cache_key(&order.order_id))
            .arg(self.ttl.as_secs())
            .arg(json)
            .query_async(&mut self.conn.clone())
            .await;
        metrics::record_redis_operation("set", start.elapsed().as_secs_f64());

        if let Err(e) = result {
            tracing::warn!(order_id = %order.order_id, error = %e, "Order cache write failed");
        }
    }

    pub async fn invalidate(&self, order_id: &str) {
        let start = Instant::now();
        let result: Result<(), _> = redis::cmd("DEL")
            .arg(cache_key(order_id))
            .query_async(&mut self.conn.clone())
            .await;
        metrics::record_redis_operation("delete", start.elapsed().as_secs_f64());

        if let Err(e) = result {
            tracing::warn!(order_id = %order_id, error = %e, "Order cache invalidation failed");
        }
    }

    pub async fn ping(&self) -> bool {
        redis::cmd("PING")
            .query_async::<_, String>(&mut self.conn.clone())
            .await
            .is_ok()
    }
}
