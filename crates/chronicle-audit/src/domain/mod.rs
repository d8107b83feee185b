//! Commands and event payloads of the audit context.

pub mod commands;
pub mod events;
