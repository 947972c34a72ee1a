pub mod plane;

pub use plane::ProjectionPlane;
