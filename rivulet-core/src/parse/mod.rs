//! Adapters from external parser output to the typed algebra.

mod json;

pub use json::{parse_query, parse_update, JsonError};
