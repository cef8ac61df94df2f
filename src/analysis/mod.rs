//! Graph algorithms and unit algebra shared by the resolvers and the equality checks.
pub mod topology;
pub mod units;

pub use units::MeasureSet;
