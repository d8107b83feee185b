//! Chronicle Core: shared abstractions.
//!
//! This crate defines the traits and types that the event store, cache,
//! circuit breaker and audit context depend on. It contains no
//! infrastructure code.

pub mod audit;
pub mod cache;
pub mod clock;
pub mod command;
pub mod error;
pub mod event;
pub mod observability;
pub mod repository;
