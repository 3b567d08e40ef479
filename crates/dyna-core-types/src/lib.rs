//! Core types shared across the dynastate facilities
//!
//! This crate provides foundational types used by the store and guard
//! crates:
//!
//! - **Correlation types**: RequestId for tying a pipeline run together in logs
//! - **Sensitive data**: Sensitive<T> marker for automatic redaction
//! - **Schema constants**: Canonical field keys and event names

pub mod correlation;
pub mod schema;
pub mod sensitive;

pub use correlation::RequestId;
pub use sensitive::Sensitive;
