//! Batch sinks for target storage backends.

mod discard;
mod postgres;

pub use discard::DiscardSink;
pub use postgres::{HealthCheck, PgSink};
