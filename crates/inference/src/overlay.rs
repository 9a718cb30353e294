use crate::types::BoundingBox;
use std::sync::Arc;
use tokio::sync::watch;

/// Consumer of per-frame detection results.
///
/// Called from the detection worker, never from a UI thread; implementations
/// hand the boxes over to their own rendering context. An empty list means "no
/// detections in this frame".
pub trait OverlaySink {
    fn set_bounding_boxes(&mut self, boxes: Vec<BoundingBox>);
}

/// Single-slot publication of the latest box list.
///
/// Each publish replaces the whole list at once, so readers never see a
/// partially updated result.
pub fn overlay_channel() -> (OverlayPublisher, OverlayReceiver) {
    let empty: Arc<[BoundingBox]> = Arc::from(Vec::new());
    let (tx, rx) = watch::channel(empty);
    (OverlayPublisher { tx }, OverlayReceiver { rx })
}

pub struct OverlayPublisher {
    tx: watch::Sender<Arc<[BoundingBox]>>,
}

impl OverlaySink for OverlayPublisher {
    fn set_bounding_boxes(&mut self, boxes: Vec<BoundingBox>) {
        self.tx.send_replace(boxes.into());
    }
}

#[derive(Clone)]
pub struct OverlayReceiver {
    rx: watch::Receiver<Arc<[BoundingBox]>>,
}

impl OverlayReceiver {
    /// The most recently published list.
    pub fn latest(&self) -> Arc<[BoundingBox]> {
        self.rx.borrow().clone()
    }

    /// Wait for the next publication. `None` once the publisher is gone.
    pub async fn changed(&mut self) -> Option<Arc<[BoundingBox]>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}
