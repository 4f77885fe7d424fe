use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::photo::Photo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Post,
    Put,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpMethod::Post => write!(f, "POST"),
            HttpMethod::Put => write!(f, "PUT"),
        }
    }
}

/// Body of an outbound request. Photo uploads carry the artifact reference
/// rather than the bytes so a queued item stays small; the transport reads
/// the file at send time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryPayload {
    Json { body: serde_json::Value },
    PhotoUpload { photo: Photo, alert_id: Uuid },
}

/// A send that exhausted its immediate retries, parked in the durable queue.
/// Deleted only once the remote endpoint has accepted the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryQueueItem {
    pub id: Uuid,
    pub method: HttpMethod,
    pub endpoint: String,
    pub payload: DeliveryPayload,
    pub timestamp: DateTime<Utc>,
}
