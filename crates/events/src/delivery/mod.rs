//! Outbound delivery of notifications.

pub mod dispatcher;
pub mod webhook;
