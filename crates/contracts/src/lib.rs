//! # Contracts
//!
//! Frozen interface contracts shared by the producer, the config loader and
//! the CLI. Business crates depend on this crate only, never on each other in
//! reverse.
//!
//! ## Size Model
//! - Every byte counter in the pipeline is driven by [`LogEntry::size`]
//! - Batches are grouped by [`RoutingKey`]; callbacks never take part in
//!   key equality

mod config;
mod error;
mod log_entry;
mod report;
mod routing;
mod transport;

pub use config::*;
pub use error::*;
pub use log_entry::*;
pub use report::*;
pub use routing::RoutingKey;
pub use transport::*;
