use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use uuid::Uuid;

use crate::models::alert::{Alert, AlertStats};
use crate::models::delivery::DeliveryQueueItem;
use crate::models::location::Location;
use crate::models::settings::OptimizationSettings;

pub mod queries;

pub type DbPool = Pool<Sqlite>;

/// Opens the on-device database and creates the schema if missing.
pub async fn init_pool(database_url: &str) -> Result<DbPool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;
    create_schema(&pool).await?;
    Ok(pool)
}

async fn create_schema(pool: &DbPool) -> Result<()> {
    for ddl in [
        queries::CREATE_ALERTS,
        queries::CREATE_DELIVERY_QUEUE,
        queries::CREATE_LOCATION_HISTORY,
        queries::CREATE_PIN_CREDENTIAL,
        queries::CREATE_OPTIMIZATION_SETTINGS,
    ] {
        sqlx::query(ddl).execute(pool).await?;
    }
    Ok(())
}

// ---- Alert record store ----

/// Appends a finalized alert and evicts the oldest entries beyond capacity.
pub async fn append_alert(pool: &DbPool, alert: &Alert, capacity: i64) -> Result<()> {
    let payload = serde_json::to_string(alert)?;

    let mut tx = pool.begin().await?;
    sqlx::query(queries::INSERT_ALERT)
        .bind(alert.id.to_string())
        .bind(alert.alert_type.to_string())
        .bind(alert.timestamp.to_rfc3339())
        .bind(alert.photos.len() as i64)
        .bind(payload)
        .execute(&mut *tx)
        .await?;
    sqlx::query(queries::TRIM_ALERTS)
        .bind(capacity)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(())
}

/// All stored alerts, newest first.
pub async fn list_alerts(pool: &DbPool) -> Result<Vec<Alert>> {
    let rows = sqlx::query(queries::SELECT_ALERTS_NEWEST_FIRST)
        .fetch_all(pool)
        .await?;

    let mut alerts = Vec::with_capacity(rows.len());
    for row in rows {
        let payload: String = row.try_get("payload")?;
        alerts.push(serde_json::from_str(&payload)?);
    }
    Ok(alerts)
}

pub async fn alert_stats(pool: &DbPool) -> Result<AlertStats> {
    let row = sqlx::query(queries::SELECT_ALERT_STATS)
        .fetch_one(pool)
        .await?;

    let total: i64 = row.try_get("total")?;
    let photos: i64 = row.try_get("photos")?;
    let last_time: Option<String> = row.try_get("last_time")?;
    let last_alert_time = last_time
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc));

    Ok(AlertStats {
        total_alerts: total as usize,
        last_alert_time,
        total_photos: photos as usize,
    })
}

// ---- Durable delivery queue ----

/// Parks a failed send for later drain. Oldest items are dropped first once
/// the configured capacity is exceeded, to bound storage.
pub async fn enqueue_delivery(
    pool: &DbPool,
    item: &DeliveryQueueItem,
    capacity: i64,
) -> Result<()> {
    let payload = serde_json::to_string(item)?;

    let mut tx = pool.begin().await?;
    sqlx::query(queries::INSERT_QUEUE_ITEM)
        .bind(item.id.to_string())
        .bind(item.method.to_string())
        .bind(&item.endpoint)
        .bind(item.timestamp.to_rfc3339())
        .bind(payload)
        .execute(&mut *tx)
        .await?;
    sqlx::query(queries::TRIM_QUEUE)
        .bind(capacity)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(())
}

/// Queued items in strict insertion order.
pub async fn queued_deliveries(pool: &DbPool) -> Result<Vec<DeliveryQueueItem>> {
    let rows = sqlx::query(queries::SELECT_QUEUE_FIFO).fetch_all(pool).await?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        let payload: String = row.try_get("payload")?;
        items.push(serde_json::from_str(&payload)?);
    }
    Ok(items)
}

/// Removes a queue item after its payload was accepted by the remote.
pub async fn delete_delivery(pool: &DbPool, id: Uuid) -> Result<()> {
    sqlx::query(queries::DELETE_QUEUE_ITEM)
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn queue_len(pool: &DbPool) -> Result<i64> {
    let row = sqlx::query(queries::COUNT_QUEUE_ITEMS).fetch_one(pool).await?;
    Ok(row.try_get("total")?)
}

// ---- Location history ----

pub async fn push_location_history(
    pool: &DbPool,
    location: &Location,
    capacity: i64,
) -> Result<()> {
    let payload = serde_json::to_string(location)?;

    let mut tx = pool.begin().await?;
    sqlx::query(queries::INSERT_LOCATION)
        .bind(location.id.to_string())
        .bind(location.timestamp.to_rfc3339())
        .bind(payload)
        .execute(&mut *tx)
        .await?;
    sqlx::query(queries::TRIM_LOCATION_HISTORY)
        .bind(capacity)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(())
}

pub async fn location_history(pool: &DbPool) -> Result<Vec<Location>> {
    let rows = sqlx::query(queries::SELECT_LOCATION_HISTORY)
        .fetch_all(pool)
        .await?;

    let mut locations = Vec::with_capacity(rows.len());
    for row in rows {
        let payload: String = row.try_get("payload")?;
        locations.push(serde_json::from_str(&payload)?);
    }
    Ok(locations)
}

// ---- PIN credential ----

pub async fn load_pin(pool: &DbPool) -> Result<Option<String>> {
    let row = sqlx::query(queries::SELECT_PIN).fetch_optional(pool).await?;
    match row {
        Some(row) => Ok(Some(row.try_get("encrypted")?)),
        None => Ok(None),
    }
}

pub async fn store_pin(pool: &DbPool, encrypted: &str) -> Result<()> {
    sqlx::query(queries::UPSERT_PIN)
        .bind(encrypted)
        .execute(pool)
        .await?;
    Ok(())
}

// ---- Optimization settings ----

pub async fn load_optimization_settings(pool: &DbPool) -> Result<OptimizationSettings> {
    let row = sqlx::query(queries::SELECT_OPTIMIZATION_SETTINGS)
        .fetch_optional(pool)
        .await?;
    match row {
        Some(row) => {
            let payload: String = row.try_get("payload")?;
            Ok(serde_json::from_str(&payload)?)
        }
        None => Ok(OptimizationSettings::default()),
    }
}

pub async fn save_optimization_settings(
    pool: &DbPool,
    settings: &OptimizationSettings,
) -> Result<()> {
    sqlx::query(queries::UPSERT_OPTIMIZATION_SETTINGS)
        .bind(serde_json::to_string(settings)?)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
pub mod test_util {
    use super::*;

    /// Opens a throwaway database for tests. The TempDir must outlive the
    /// pool, so it is returned alongside. The single connection is opened
    /// eagerly here, while the clock still runs: connection setup happens on
    /// the blocking pool, which a paused test clock times out instead of
    /// waiting for. Expiry and the before-acquire ping are disabled for the
    /// same reason: either would make `acquire` wait on the sqlite worker
    /// thread under the paused clock (see the clock ticker in
    /// `alarm::orchestrator::test_util`).
    pub async fn temp_pool() -> (tempfile::TempDir, DbPool) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}/test.db?mode=rwc", dir.path().display());
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .test_before_acquire(false)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(&url)
            .await
            .unwrap();
        create_schema(&pool).await.unwrap();
        (dir, pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::alert::{AlertType, DeviceInfo};

    fn device_info() -> DeviceInfo {
        DeviceInfo {
            device_id: "dev-1".into(),
            model: "test".into(),
            os_version: "1.0".into(),
        }
    }

    fn resolved_alert(alert_type: AlertType) -> Alert {
        let mut alert = Alert::new(alert_type, Location::unknown("dev-1"), device_info());
        alert.is_resolved = true;
        alert
    }

    #[tokio::test]
    async fn alert_log_evicts_oldest_first() {
        let (_dir, pool) = test_util::temp_pool().await;

        let mut ids = Vec::new();
        for _ in 0..5 {
            let alert = resolved_alert(AlertType::ManualTrigger);
            ids.push(alert.id);
            append_alert(&pool, &alert, 3).await.unwrap();
        }

        let stored = list_alerts(&pool).await.unwrap();
        assert_eq!(stored.len(), 3);
        // Newest first; the two oldest were evicted.
        assert_eq!(stored[0].id, ids[4]);
        assert_eq!(stored[1].id, ids[3]);
        assert_eq!(stored[2].id, ids[2]);
    }

    #[tokio::test]
    async fn stats_aggregate_counts_and_last_time() {
        let (_dir, pool) = test_util::temp_pool().await;

        let empty = alert_stats(&pool).await.unwrap();
        assert_eq!(empty.total_alerts, 0);
        assert!(empty.last_alert_time.is_none());

        let a = resolved_alert(AlertType::TheftAttempt);
        append_alert(&pool, &a, 10).await.unwrap();
        let b = resolved_alert(AlertType::UnauthorizedAccess);
        append_alert(&pool, &b, 10).await.unwrap();

        let stats = alert_stats(&pool).await.unwrap();
        assert_eq!(stats.total_alerts, 2);
        assert!(stats.last_alert_time.is_some());
    }

    #[tokio::test]
    async fn pin_roundtrip() {
        let (_dir, pool) = test_util::temp_pool().await;

        assert!(load_pin(&pool).await.unwrap().is_none());
        store_pin(&pool, "aabbcc").await.unwrap();
        assert_eq!(load_pin(&pool).await.unwrap().as_deref(), Some("aabbcc"));
        store_pin(&pool, "ddeeff").await.unwrap();
        assert_eq!(load_pin(&pool).await.unwrap().as_deref(), Some("ddeeff"));
    }

    #[tokio::test]
    async fn optimization_settings_default_on_first_read() {
        let (_dir, pool) = test_util::temp_pool().await;

        let settings = load_optimization_settings(&pool).await.unwrap();
        assert!(!settings.low_power_mode);

        let updated = OptimizationSettings {
            low_power_mode: true,
            capture_interval_override_secs: Some(30),
        };
        save_optimization_settings(&pool, &updated).await.unwrap();
        let reread = load_optimization_settings(&pool).await.unwrap();
        assert!(reread.low_power_mode);
        assert_eq!(reread.capture_interval_override_secs, Some(30));
    }
}
