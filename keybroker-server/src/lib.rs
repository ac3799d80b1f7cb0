//! # Keybroker Server
//!
//! A shared credential broker: multiplexes a pool of third-party API
//! subscription keys across many concurrent callers while honoring each
//! key's per-window and per-day quotas.
//!
//! Callers ask "give me a key I may use right now" and receive either a
//! key descriptor (with the earliest moment the same key can be asked for
//! again) or a wait hint. Callers that prefer to block can go through the
//! fair wait queue, which serves requesters in arrival order under a
//! bounded concurrency.
//!
//! ## Quick start
//!
//! ```bash
//! # Serve on port 3000 with two preloaded keys
//! MAILTESTER_KEYS_WITH_PLAN="sub_abc:pro,sub_def:ultimate" keybroker-server
//!
//! # Same, via CLI
//! keybroker-server --port 3000 --keys-with-plan "sub_abc:pro,sub_def:ultimate"
//!
//! # List all environment variables
//! keybroker-server --list-env-vars
//! ```
//!
//! ## Endpoints
//!
//! - `GET /key/available` — non-blocking reservation
//! - `GET /key/available/queued` — blocking reservation via the wait queue
//! - `GET /status` — every key with full metadata
//! - `GET /limits` — limits-only projection
//! - `POST /keys` — register or update a key
//! - `DELETE /keys/{id}` — remove a key
//! - `GET /health` — liveness
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐
//! │ HTTP handler │   │ HTTP handler     │
//! │ (immediate)  │   │ (queued)         │
//! └──────┬───────┘   └───────┬──────────┘
//!        │                   │
//!        │             ┌─────▼─────┐
//!        │             │ WaitQueue │  FIFO + bounded concurrency
//!        │             └─────┬─────┘
//!        │                   │
//!        └───────┬───────────┘
//!          ┌─────▼─────┐
//!          │  Engine   │  snapshot + filtered CAS commit
//!          └─────┬─────┘
//!          ┌─────▼─────┐       ┌─────────┐
//!          │ Key store │◄──────┤ Sweeper │  30 s / 60 s resets
//!          └───────────┘       └─────────┘
//! ```
//!
//! The engine holds no locks: every mutation is a filtered update that
//! pins the counters it read, so any number of handlers and replicas can
//! contend safely over the same store.

pub mod config;
pub mod transport;
pub mod types;
