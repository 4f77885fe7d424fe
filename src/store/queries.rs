pub const CREATE_ALERTS: &str = r#"
CREATE TABLE IF NOT EXISTS alerts (
    alert_id   TEXT NOT NULL UNIQUE,
    alert_type TEXT NOT NULL,
    timestamp  TEXT NOT NULL,
    photo_count INTEGER NOT NULL DEFAULT 0,
    payload    TEXT NOT NULL
);
"#;

pub const CREATE_DELIVERY_QUEUE: &str = r#"
CREATE TABLE IF NOT EXISTS delivery_queue (
    item_id   TEXT NOT NULL UNIQUE,
    method    TEXT NOT NULL,
    endpoint  TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    payload   TEXT NOT NULL
);
"#;

pub const CREATE_LOCATION_HISTORY: &str = r#"
CREATE TABLE IF NOT EXISTS location_history (
    location_id TEXT NOT NULL UNIQUE,
    timestamp   TEXT NOT NULL,
    payload     TEXT NOT NULL
);
"#;

pub const CREATE_PIN_CREDENTIAL: &str = r#"
CREATE TABLE IF NOT EXISTS pin_credential (
    id        INTEGER PRIMARY KEY CHECK (id = 1),
    encrypted TEXT NOT NULL
);
"#;

pub const CREATE_OPTIMIZATION_SETTINGS: &str = r#"
CREATE TABLE IF NOT EXISTS optimization_settings (
    id      INTEGER PRIMARY KEY CHECK (id = 1),
    payload TEXT NOT NULL
);
"#;

pub const INSERT_ALERT: &str = r#"
INSERT INTO alerts (alert_id, alert_type, timestamp, photo_count, payload)
VALUES (?1, ?2, ?3, ?4, ?5);
"#;

// Ring-buffer eviction: keep the newest N rows by insertion order.
pub const TRIM_ALERTS: &str = r#"
DELETE FROM alerts
WHERE rowid NOT IN (SELECT rowid FROM alerts ORDER BY rowid DESC LIMIT ?1);
"#;

pub const SELECT_ALERTS_NEWEST_FIRST: &str = r#"
SELECT payload FROM alerts ORDER BY rowid DESC;
"#;

pub const SELECT_ALERT_STATS: &str = r#"
SELECT COUNT(*) AS total, COALESCE(SUM(photo_count), 0) AS photos, MAX(timestamp) AS last_time
FROM alerts;
"#;

pub const INSERT_QUEUE_ITEM: &str = r#"
INSERT INTO delivery_queue (item_id, method, endpoint, timestamp, payload)
VALUES (?1, ?2, ?3, ?4, ?5);
"#;

pub const TRIM_QUEUE: &str = r#"
DELETE FROM delivery_queue
WHERE rowid NOT IN (SELECT rowid FROM delivery_queue ORDER BY rowid DESC LIMIT ?1);
"#;

pub const SELECT_QUEUE_FIFO: &str = r#"
SELECT payload FROM delivery_queue ORDER BY rowid ASC;
"#;

pub const DELETE_QUEUE_ITEM: &str = r#"
DELETE FROM delivery_queue WHERE item_id = ?1;
"#;

pub const COUNT_QUEUE_ITEMS: &str = r#"
SELECT COUNT(*) AS total FROM delivery_queue;
"#;

pub const INSERT_LOCATION: &str = r#"
INSERT INTO location_history (location_id, timestamp, payload)
VALUES (?1, ?2, ?3);
"#;

pub const TRIM_LOCATION_HISTORY: &str = r#"
DELETE FROM location_history
WHERE rowid NOT IN (SELECT rowid FROM location_history ORDER BY rowid DESC LIMIT ?1);
"#;

pub const SELECT_LOCATION_HISTORY: &str = r#"
SELECT payload FROM location_history ORDER BY rowid DESC;
"#;

pub const SELECT_PIN: &str = r#"
SELECT encrypted FROM pin_credential WHERE id = 1;
"#;

pub const UPSERT_PIN: &str = r#"
INSERT INTO pin_credential (id, encrypted) VALUES (1, ?1)
ON CONFLICT (id) DO UPDATE SET encrypted = ?1;
"#;

pub const SELECT_OPTIMIZATION_SETTINGS: &str = r#"
SELECT payload FROM optimization_settings WHERE id = 1;
"#;

pub const UPSERT_OPTIMIZATION_SETTINGS: &str = r#"
INSERT INTO optimization_settings (id, payload) VALUES (1, ?1)
ON CONFLICT (id) DO UPDATE SET payload = ?1;
"#;
