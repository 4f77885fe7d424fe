use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::location::LocationProvider;
use crate::models::location::Location;
use crate::models::photo::{CameraFacing, Photo};

/// Raw image artifact produced by the platform camera, stored on device
/// until uploaded.
#[derive(Debug, Clone)]
pub struct CapturedImage {
    pub path: String,
}

/// Platform camera access. `None` covers denied permission, missing
/// hardware and user cancellation alike; callers skip the capture.
#[async_trait]
pub trait CameraPort: Send + Sync {
    async fn take_photo(&self, facing: CameraFacing) -> Option<CapturedImage>;
}

/// Camera stub for hosts without one.
pub struct UnavailableCamera;

#[async_trait]
impl CameraPort for UnavailableCamera {
    async fn take_photo(&self, facing: CameraFacing) -> Option<CapturedImage> {
        debug!("[camera] {} unavailable on this host", facing);
        None
    }
}

/// Wraps camera access and stamps each image with capture time and the best
/// known location (or the unknown sentinel). Does not enqueue anything for
/// delivery; that is the caller's job.
#[derive(Clone)]
pub struct EvidenceCapture {
    camera: Arc<dyn CameraPort>,
    locations: LocationProvider,
    device_id: String,
}

impl EvidenceCapture {
    pub fn new(camera: Arc<dyn CameraPort>, locations: LocationProvider, device_id: String) -> Self {
        Self {
            camera,
            locations,
            device_id,
        }
    }

    pub async fn capture(&self, facing: CameraFacing) -> Option<Photo> {
        let image = self.camera.take_photo(facing).await?;
        let location = self
            .locations
            .last_known()
            .unwrap_or_else(|| Location::unknown(&self.device_id));

        Some(Photo {
            id: Uuid::new_v4(),
            url: image.path,
            camera: facing,
            timestamp: Utc::now(),
            location,
        })
    }
}

#[cfg(test)]
pub mod test_util {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Camera fake producing a numbered artifact path per shot.
    pub struct StubCamera {
        shots: AtomicUsize,
    }

    impl StubCamera {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                shots: AtomicUsize::new(0),
            })
        }

        pub fn shot_count(&self) -> usize {
            self.shots.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CameraPort for StubCamera {
        async fn take_photo(&self, facing: CameraFacing) -> Option<CapturedImage> {
            let n = self.shots.fetch_add(1, Ordering::SeqCst);
            Some(CapturedImage {
                path: format!("/tmp/capture-{}-{}.jpg", facing, n),
            })
        }
    }

    /// Camera fake whose shots block until explicitly released, to park a
    /// caller mid-capture.
    pub struct GatedCamera {
        permits: tokio::sync::Semaphore,
    }

    impl GatedCamera {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                permits: tokio::sync::Semaphore::new(0),
            })
        }

        pub fn release(&self, shots: usize) {
            self.permits.add_permits(shots);
        }
    }

    #[async_trait]
    impl CameraPort for GatedCamera {
        async fn take_photo(&self, facing: CameraFacing) -> Option<CapturedImage> {
            let permit = self.permits.acquire().await.ok()?;
            permit.forget();
            Some(CapturedImage {
                path: format!("/tmp/capture-{}.jpg", facing),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_util::*;
    use super::*;
    use crate::delivery::test_util::{test_config, FlakyTransport};
    use crate::delivery::DeliveryQueue;
    use crate::location::test_util::{fix, ScriptedSource};
    use crate::location::LocationConfig;
    use crate::store::test_util::temp_pool;

    async fn capture_with_provider() -> (tempfile::TempDir, EvidenceCapture, LocationProvider) {
        let (dir, pool) = temp_pool().await;
        let queue = DeliveryQueue::new(FlakyTransport::reliable(), pool.clone(), test_config());
        let provider = LocationProvider::new(
            ScriptedSource::empty(),
            queue,
            pool,
            LocationConfig {
                accuracy_threshold_m: 50.0,
                history_capacity: 10,
                device_id: "dev-1".into(),
            },
        );
        let capture = EvidenceCapture::new(StubCamera::new(), provider.clone(), "dev-1".into());
        (dir, capture, provider)
    }

    #[tokio::test]
    async fn capture_without_fix_uses_sentinel() {
        let (_dir, capture, _provider) = capture_with_provider().await;

        let photo = capture.capture(CameraFacing::Front).await.unwrap();
        assert_eq!(photo.camera, CameraFacing::Front);
        assert!(photo.location.is_unknown());
    }

    #[tokio::test]
    async fn capture_attaches_best_known_location() {
        let (_dir, capture, provider) = capture_with_provider().await;
        provider.report_fix(fix(20.65, -100.39, 8.0)).await;

        let photo = capture.capture(CameraFacing::Back).await.unwrap();
        assert_eq!(photo.location.latitude, 20.65);
        assert!(!photo.location.is_unknown());
    }

    #[tokio::test]
    async fn unavailable_camera_yields_none() {
        let (_dir, _capture, provider) = capture_with_provider().await;
        let capture = EvidenceCapture::new(
            Arc::new(UnavailableCamera),
            provider,
            "dev-1".into(),
        );
        assert!(capture.capture(CameraFacing::Front).await.is_none());
    }
}
