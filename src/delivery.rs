use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::models::delivery::{DeliveryPayload, DeliveryQueueItem, HttpMethod};
use crate::store::{self, DbPool};

pub const LOCATION_UPDATE_ENDPOINT: &str = "/location/update";
pub const ALERT_NOTIFICATION_ENDPOINT: &str = "/alerts/notification";
pub const PHOTO_UPLOAD_ENDPOINT: &str = "/alerts/photo";

pub fn alert_update_endpoint(alert_id: Uuid) -> String {
    format!("/alerts/{}", alert_id)
}

/// One wire hop to the backend. Production uses HTTP via reqwest; tests
/// substitute recording fakes.
#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    async fn dispatch(
        &self,
        method: HttpMethod,
        url: &str,
        payload: &DeliveryPayload,
    ) -> Result<()>;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeliveryTransport for HttpTransport {
    async fn dispatch(
        &self,
        method: HttpMethod,
        url: &str,
        payload: &DeliveryPayload,
    ) -> Result<()> {
        let request = match method {
            HttpMethod::Post => self.client.post(url),
            HttpMethod::Put => self.client.put(url),
        };

        let request = match payload {
            DeliveryPayload::Json { body } => request.json(body),
            DeliveryPayload::PhotoUpload { photo, alert_id } => {
                let bytes = tokio::fs::read(&photo.url).await?;
                let form = reqwest::multipart::Form::new()
                    .part(
                        "photo",
                        reqwest::multipart::Part::bytes(bytes)
                            .file_name(format!("{}.jpg", photo.id))
                            .mime_str("image/jpeg")?,
                    )
                    .text("photoId", photo.id.to_string())
                    .text("alertId", alert_id.to_string())
                    .text("camera", photo.camera.to_string())
                    .text("timestamp", photo.timestamp.to_rfc3339())
                    .text("location", serde_json::to_string(&photo.location)?);
                request.multipart(form)
            }
        };

        let response = request.send().await?;
        response.error_for_status()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Queued,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DrainReport {
    pub delivered: usize,
    pub remaining: usize,
}

#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub queue_capacity: i64,
}

impl DeliveryConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            base_url: config.api_base_url.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            max_attempts: config.send_max_attempts,
            backoff_base: Duration::from_millis(config.send_backoff_base_ms),
            queue_capacity: config.delivery_queue_capacity,
        }
    }
}

/// At-least-once outbound channel. Immediate sends retry with exponential
/// backoff; exhausted sends are parked in the durable queue and drained in
/// strict FIFO order once connectivity returns.
#[derive(Clone)]
pub struct DeliveryQueue {
    transport: Arc<dyn DeliveryTransport>,
    pool: DbPool,
    config: DeliveryConfig,
}

impl DeliveryQueue {
    pub fn new(transport: Arc<dyn DeliveryTransport>, pool: DbPool, config: DeliveryConfig) -> Self {
        Self {
            transport,
            pool,
            config,
        }
    }

    async fn attempt(&self, method: HttpMethod, endpoint: &str, payload: &DeliveryPayload) -> Result<()> {
        let url = format!("{}{}", self.config.base_url, endpoint);
        tokio::time::timeout(
            self.config.request_timeout,
            self.transport.dispatch(method, &url, payload),
        )
        .await
        .map_err(|_| anyhow!("request timed out after {:?}", self.config.request_timeout))?
    }

    /// Tries to deliver now; parks the payload in the durable queue when all
    /// immediate attempts fail. The payload is never silently dropped.
    pub async fn send(
        &self,
        method: HttpMethod,
        endpoint: &str,
        payload: DeliveryPayload,
    ) -> Result<DeliveryOutcome> {
        for attempt in 0..self.config.max_attempts {
            match self.attempt(method, endpoint, &payload).await {
                Ok(()) => {
                    debug!("Delivered {} {} (attempt {})", method, endpoint, attempt + 1);
                    return Ok(DeliveryOutcome::Delivered);
                }
                Err(e) => {
                    warn!(
                        "Send failed for {} {} (attempt {} / {}): {}",
                        method,
                        endpoint,
                        attempt + 1,
                        self.config.max_attempts,
                        e
                    );
                }
            }
            if attempt + 1 < self.config.max_attempts {
                let delay = self.config.backoff_base * 2u32.saturating_pow(attempt);
                tokio::time::sleep(delay).await;
            }
        }

        let item = DeliveryQueueItem {
            id: Uuid::new_v4(),
            method,
            endpoint: endpoint.to_string(),
            payload,
            timestamp: Utc::now(),
        };
        self.enqueue_for_retry(item).await?;
        Ok(DeliveryOutcome::Queued)
    }

    pub async fn enqueue_for_retry(&self, item: DeliveryQueueItem) -> Result<()> {
        info!("Queued {} {} for retry ({})", item.method, item.endpoint, item.id);
        store::enqueue_delivery(&self.pool, &item, self.config.queue_capacity).await
    }

    /// Replays queued items in insertion order, removing each only after the
    /// remote accepts it. Stops at the first failure so partial connectivity
    /// never reorders deliveries.
    pub async fn drain(&self) -> Result<DrainReport> {
        let items = store::queued_deliveries(&self.pool).await?;
        let total = items.len();
        let mut delivered = 0usize;

        for item in items {
            match self.attempt(item.method, &item.endpoint, &item.payload).await {
                Ok(()) => {
                    store::delete_delivery(&self.pool, item.id).await?;
                    delivered += 1;
                }
                Err(e) => {
                    warn!(
                        "Drain stopped at {} {} ({}): {}",
                        item.method, item.endpoint, item.id, e
                    );
                    break;
                }
            }
        }

        if delivered > 0 {
            info!("Drained {} of {} queued deliveries", delivered, total);
        }
        Ok(DrainReport {
            delivered,
            remaining: total - delivered,
        })
    }

    pub async fn queue_len(&self) -> Result<i64> {
        store::queue_len(&self.pool).await
    }
}

#[cfg(test)]
pub mod test_util {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Transport fake that fails the first `fail_first` dispatches and
    /// records every accepted payload.
    pub struct FlakyTransport {
        fail_first: AtomicUsize,
        calls: AtomicUsize,
        pub accepted: Mutex<Vec<(HttpMethod, String)>>,
    }

    impl FlakyTransport {
        pub fn failing_first(n: usize) -> Arc<Self> {
            Arc::new(Self {
                fail_first: AtomicUsize::new(n),
                calls: AtomicUsize::new(0),
                accepted: Mutex::new(Vec::new()),
            })
        }

        pub fn reliable() -> Arc<Self> {
            Self::failing_first(0)
        }

        pub fn unreachable() -> Arc<Self> {
            Self::failing_first(usize::MAX)
        }

        pub fn accepted_endpoints(&self) -> Vec<String> {
            self.accepted
                .lock()
                .unwrap()
                .iter()
                .map(|(_, url)| url.clone())
                .collect()
        }
    }

    #[async_trait]
    impl DeliveryTransport for FlakyTransport {
        async fn dispatch(
            &self,
            method: HttpMethod,
            url: &str,
            _payload: &DeliveryPayload,
        ) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first.load(Ordering::SeqCst) {
                return Err(anyhow!("simulated network failure"));
            }
            self.accepted
                .lock()
                .unwrap()
                .push((method, url.to_string()));
            Ok(())
        }
    }

    pub fn test_config() -> DeliveryConfig {
        DeliveryConfig {
            base_url: "http://backend.test".to_string(),
            request_timeout: Duration::from_secs(5),
            max_attempts: 2,
            backoff_base: Duration::from_millis(1),
            queue_capacity: 10,
        }
    }

    pub fn json_payload(tag: &str) -> DeliveryPayload {
        DeliveryPayload::Json {
            body: serde_json::json!({ "tag": tag }),
        }
    }
}
