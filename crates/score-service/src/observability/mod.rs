//! Observability for the score service.
//!
//! Provides metrics definitions and recording helpers.

pub mod metrics;
