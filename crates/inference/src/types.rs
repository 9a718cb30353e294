use serde::{Deserialize, Serialize};

/// A detection in the coordinate space handed to the renderer.
///
/// Always satisfies `0 <= left < right` and `0 <= top < bottom`, bounded by the
/// frame it was mapped onto.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub confidence: f32,
    pub class_id: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl BoundingBox {
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }
}
