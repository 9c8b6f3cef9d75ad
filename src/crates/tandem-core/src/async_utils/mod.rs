//! Deadline and polling helpers shared by every blocking call
//!
//! - [`Deadline`] - one wall-clock budget per public call, split across stages
//! - [`PollPolicy`] - bounded exponential backoff between polls
//! - [`poll_until`] - check, sleep, repeat until a value appears or the
//!   deadline would be crossed by the next sleep

mod backoff;
mod deadline;

pub use backoff::{poll_until, PollPolicy};
pub use deadline::Deadline;
