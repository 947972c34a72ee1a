pub mod convex;
pub mod offset;
