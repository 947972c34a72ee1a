use crate::math::Point3;

slotmap::new_key_type! {
    /// Unique identifier for a point in a [`Detail`](super::Detail).
    pub struct PointId;
}

/// Data associated with a point.
#[derive(Debug, Clone)]
pub struct PointData {
    /// The 3D position of the point.
    pub position: Point3,
}

impl PointData {
    /// Creates a new point at the given position.
    #[must_use]
    pub fn new(position: Point3) -> Self {
        Self { position }
    }
}
