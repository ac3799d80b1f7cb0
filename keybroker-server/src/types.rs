//! Wire types for the HTTP surface.
//!
//! Reservation and projection payloads serialize from the core types
//! directly; the envelopes here add the `status` discriminator clients
//! switch on.

use keybroker::Reservation;
use serde::{Deserialize, Serialize};

/// Success envelope: a key the caller may use right now.
///
/// ```json
/// {
///   "status": "ok",
///   "key": {
///     "subscriptionId": "sub_abc",
///     "plan": "pro",
///     "avgRequestIntervalMs": 860,
///     "lastUsed": 1700000000000,
///     "nextRequestAllowedAt": 1700000000860
///   }
/// }
/// ```
#[derive(Debug, Serialize, Deserialize)]
pub struct ReservedResponse {
    pub status: String,
    pub key: Reservation,
}

impl ReservedResponse {
    pub fn new(key: Reservation) -> Self {
        ReservedResponse {
            status: "ok".to_string(),
            key,
        }
    }
}

/// Wait envelope: no key is free; retry after `waitMs`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitResponse {
    pub status: String,
    pub wait_ms: u64,
}

impl WaitResponse {
    pub fn new(wait_ms: u64) -> Self {
        WaitResponse {
            status: "wait".to_string(),
            wait_ms,
        }
    }
}

/// Body of `POST /keys`. The id may arrive as `subscriptionId` or `id`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterKeyRequest {
    #[serde(alias = "id")]
    pub subscription_id: Option<String>,
    pub plan: Option<String>,
}

/// Generic success message.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Error response format.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
