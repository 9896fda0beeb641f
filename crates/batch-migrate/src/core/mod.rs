//! Core data types shared by the write engine and its collaborators.
//!
//! - [`value`]: target-typed column values with payload size estimates
//! - [`row`]: immutable rows addressed to a target table

pub mod row;
pub mod value;

pub use row::Row;
pub use value::{SqlNullType, SqlValue};
