//! Storage domain layer.

pub mod models;
pub mod ports;
