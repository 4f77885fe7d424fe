use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::delivery::{DeliveryQueue, LOCATION_UPDATE_ENDPOINT};
use crate::models::delivery::{DeliveryPayload, HttpMethod};
use crate::models::location::{Location, LocationFix};
use crate::store::{self, DbPool};

/// Platform geolocation watcher. `next_fix` resolves with the next raw
/// reading, or `None` once the watch ends (permission revoked, source shut
/// down).
#[async_trait]
pub trait GeoSource: Send + Sync {
    async fn next_fix(&self) -> Option<LocationFix>;
}

#[derive(Debug, Clone)]
pub struct LocationConfig {
    pub accuracy_threshold_m: f64,
    pub history_capacity: i64,
    pub device_id: String,
}

struct Inner {
    source: Arc<dyn GeoSource>,
    queue: DeliveryQueue,
    pool: DbPool,
    config: LocationConfig,
    last_known: watch::Sender<Option<Location>>,
    tracker: Mutex<Option<JoinHandle<()>>>,
}

/// Keeps the single mutable "last known location" slot plus a bounded
/// diagnostic history. Fixes that fail validation are discarded silently and
/// the previous value is retained.
#[derive(Clone)]
pub struct LocationProvider {
    inner: Arc<Inner>,
}

impl LocationProvider {
    pub fn new(
        source: Arc<dyn GeoSource>,
        queue: DeliveryQueue,
        pool: DbPool,
        config: LocationConfig,
    ) -> Self {
        let (last_known, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                source,
                queue,
                pool,
                config,
                last_known,
                tracker: Mutex::new(None),
            }),
        }
    }

    /// Most recent accepted fix, if any. Readers may observe a slightly
    /// stale value while a new fix is being processed; that is tolerated.
    pub fn last_known(&self) -> Option<Location> {
        self.inner.last_known.borrow().clone()
    }

    /// Validates and accepts one raw reading. Returns whether the fix was
    /// accepted into the last-known slot.
    pub async fn report_fix(&self, fix: LocationFix) -> bool {
        let location = fix.into_location(&self.inner.config.device_id);

        if !location.in_valid_range() {
            debug!(
                "Discarding out-of-range fix ({}, {})",
                location.latitude, location.longitude
            );
            return false;
        }
        if location.accuracy > self.inner.config.accuracy_threshold_m {
            debug!(
                "Discarding low-accuracy fix ({:.1}m > {:.1}m)",
                location.accuracy, self.inner.config.accuracy_threshold_m
            );
            return false;
        }

        self.inner.last_known.send_replace(Some(location.clone()));

        if let Err(e) =
            store::push_location_history(&self.inner.pool, &location, self.inner.config.history_capacity)
                .await
        {
            warn!("Failed to persist location history: {}", e);
        }

        let payload = DeliveryPayload::Json {
            body: serde_json::json!({
                "location": location,
                "timestamp": Utc::now().to_rfc3339(),
            }),
        };
        if let Err(e) = self
            .inner
            .queue
            .send(HttpMethod::Post, LOCATION_UPDATE_ENDPOINT, payload)
            .await
        {
            warn!("Failed to forward location update: {}", e);
        }

        true
    }

    /// Newest-first history of accepted fixes.
    pub async fn history(&self) -> Result<Vec<Location>> {
        store::location_history(&self.inner.pool).await
    }

    /// Starts pulling fixes from the platform source. No-op if already
    /// tracking.
    pub fn start_tracking(&self) {
        let mut tracker = self.inner.tracker.lock().unwrap();
        if tracker.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("Location tracking already running");
            return;
        }

        info!("Starting location tracking");
        let provider = self.clone();
        *tracker = Some(tokio::spawn(async move {
            while let Some(fix) = provider.inner.source.next_fix().await {
                provider.report_fix(fix).await;
            }
            info!("Location source ended");
        }));
    }

    pub fn stop_tracking(&self) {
        let mut tracker = self.inner.tracker.lock().unwrap();
        if let Some(handle) = tracker.take() {
            handle.abort();
            info!("Stopped location tracking");
        }
    }
}
