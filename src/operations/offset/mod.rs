mod build_offset;
mod curves;
mod surfaces;
mod writer;

pub use build_offset::{BuildOffsetGeometry, OffsetGeoType, OffsetResult};
