//! # Follow-On Events
//!
//! Outbound notifications published once a filing has been committed.

pub mod publisher;

pub use publisher::{FollowOnEvent, OutcomePublisher, PublishReport, RevocationReason};
