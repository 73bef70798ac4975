//! Shipping pipeline module.

mod shipper;
mod stats;

pub use shipper::{Shipper, ShipperOptions};
pub use stats::ShipStats;
