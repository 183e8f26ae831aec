//! Offline resource cache and deferred sync layer for storefront clients.
//!
//! The host application routes every outgoing GET through
//! [`Gateway::handle`] (or the [`Agent`] wrapping it); non-GET requests
//! pass through untouched. Responses are served from three named cache
//! tiers by per-class strategies, with synthesized fallbacks when both
//! network and cache come up empty. Mutations that failed while offline
//! are queued durably and replayed when connectivity returns.

pub mod agent;
pub mod cache;
pub mod config;
pub mod event;
pub mod gateway;
pub mod http;
pub mod lifecycle;
pub mod notify;
pub mod router;
pub mod strategy;
pub mod sync;

pub use agent::Agent;
pub use gateway::{FetchOutcome, Gateway};
