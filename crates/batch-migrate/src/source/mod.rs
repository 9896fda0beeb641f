//! Row sources feeding the batch writer.

mod ndjson;

pub use ndjson::NdjsonReader;
