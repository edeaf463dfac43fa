//! Background tasks for the meeting service.
//!
//! # Tasks
//!
//! - `expiry_sweep` - Periodically deletes expired meetings
//! - `call_events` - Attaches finished calls to their meetings

pub mod call_events;
pub mod expiry_sweep;

pub use call_events::start_call_event_consumer;
pub use expiry_sweep::{start_expiry_sweep, ExpirySweepConfig};
