//! HTTP request handlers for the score service.

pub mod health;
pub mod me;
pub mod metrics;

pub use health::{health_check, root};
pub use me::get_me;
pub use metrics::metrics_handler;
