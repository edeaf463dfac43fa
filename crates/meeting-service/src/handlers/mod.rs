//! HTTP request handlers for the meeting service.

pub mod health;
pub mod meetings;
pub mod metrics;

pub use health::health_check;
pub use meetings::{create_meeting, delete_meeting, get_meeting, submit_satisfaction};
pub use metrics::metrics_handler;
