pub mod detail;
pub mod diagnostics;
pub mod error;
pub mod geometry;
pub mod math;
pub mod operations;
pub mod skeleton;

pub use error::{Result, SkelformError};
pub use skeleton::{SkeletonParams, StraightSkeleton};
