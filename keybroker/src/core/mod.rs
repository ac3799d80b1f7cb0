//! Core components of the keybroker credential broker
//!
//! This module contains the fundamental building blocks:
//! - [`plan`]: plan policy mapping subscription plans to limits and spacing
//! - [`key`]: the per-key quota document and its window arithmetic
//! - [`store`]: the key document store contract and the in-process backend
//! - [`engine`]: quota-aware key selection with compare-and-set reservations
//! - [`sweeper`]: periodic window and day counter resets
//! - [`queue`]: the fair wait queue in front of the engine
//! - [`registry`]: administrative key registration and projections

pub mod engine;
pub mod error;
pub mod key;
pub mod plan;
pub mod queue;
pub mod registry;
pub mod store;
pub mod sweeper;

#[cfg(test)]
mod tests;

pub use engine::{Reservation, ReservationEngine};
pub use error::{BrokerError, Result, StoreError};
pub use key::{epoch_ms_now, ApiKey, KeyStatus, DAY_MS, WINDOW_MS};
pub use plan::{Plan, PlanLimits, PlanPolicy};
pub use queue::{WaitQueue, WaitQueueConfig};
pub use registry::{KeyLimitsView, KeyRegistry, KeyStatusView, Registered};
pub use store::{KeyFilter, KeyStore, KeyUpdate, MemoryStore};
pub use sweeper::Sweeper;
