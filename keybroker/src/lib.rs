pub mod core;

pub use crate::core::{
    epoch_ms_now, ApiKey, BrokerError, KeyFilter, KeyLimitsView, KeyRegistry, KeyStatus,
    KeyStatusView, KeyStore, KeyUpdate, MemoryStore, Plan, PlanLimits, PlanPolicy, Registered,
    Reservation, ReservationEngine, Result, StoreError, Sweeper, WaitQueue, WaitQueueConfig,
    DAY_MS, WINDOW_MS,
};

// Re-export the store module so external adapters can implement the contract
pub use crate::core::store;
