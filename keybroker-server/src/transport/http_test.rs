#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::to_bytes;
    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::response::Response;
    use axum::Json;
    use keybroker::{
        KeyRegistry, KeyStatusView, MemoryStore, PlanPolicy, ReservationEngine, WaitQueue,
        WaitQueueConfig,
    };
    use serde::de::DeserializeOwned;

    use super::super::http::{
        available, available_queued, delete_key, health, limits, register_key, status, AppState,
    };
    use crate::types::{
        ErrorResponse, MessageResponse, RegisterKeyRequest, ReservedResponse, WaitResponse,
    };

    fn test_state() -> AppState<MemoryStore> {
        let store = MemoryStore::new();
        let policy = PlanPolicy::default();
        let engine = Arc::new(ReservationEngine::new(store.clone()));
        let queue = WaitQueue::spawn(
            engine.clone(),
            WaitQueueConfig {
                concurrency: 5,
                backoff: Duration::from_millis(10),
                max_wait: None,
            },
        );
        AppState {
            engine,
            registry: Arc::new(KeyRegistry::new(store, policy.clone())),
            queue,
            wait_hint_ms: policy.wait_hint_ms(),
            request_timeout: Some(Duration::from_millis(100)),
        }
    }

    async fn body_json<T: DeserializeOwned>(response: Response) -> T {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn register_then_reserve() {
        let state = test_state();

        let response = register_key(
            State(state.clone()),
            Ok(Json(RegisterKeyRequest {
                subscription_id: Some("sub_http_test".to_string()),
                plan: Some("pro".to_string()),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let message: MessageResponse = body_json(response).await;
        assert!(message.message.contains("sub_http_test"));

        let response = available(State(state.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let reserved: ReservedResponse = body_json(response).await;
        assert_eq!(reserved.status, "ok");
        assert_eq!(reserved.key.subscription_id, "sub_http_test");
        assert_eq!(reserved.key.avg_interval_ms, 860);

        // Immediately again: the key is cooling down.
        let response = available(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let wait: WaitResponse = body_json(response).await;
        assert_eq!(wait.status, "wait");
        assert_eq!(wait.wait_ms, 170);
    }

    #[tokio::test]
    async fn register_rejects_missing_id() {
        let state = test_state();

        let response = register_key(
            State(state),
            Ok(Json(RegisterKeyRequest {
                subscription_id: None,
                plan: Some("pro".to_string()),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error: ErrorResponse = body_json(response).await;
        assert!(error.error.contains("subscription id"));
    }

    #[tokio::test]
    async fn empty_pool_returns_wait_hint() {
        let state = test_state();

        let response = available(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let wait: WaitResponse = body_json(response).await;
        assert_eq!(wait.status, "wait");
        assert_eq!(wait.wait_ms, 170);
    }

    #[tokio::test]
    async fn queued_request_times_out_with_429() {
        let state = test_state();
        // No keys at all: the queued caller can only wait out its deadline.
        let response = available_queued(State(state)).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let wait: WaitResponse = body_json(response).await;
        assert_eq!(wait.status, "wait");
    }

    #[tokio::test]
    async fn status_and_limits_list_registered_keys() {
        let state = test_state();
        state.registry.register("sub_1", "pro").await.unwrap();

        let response = status(State(state.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let keys: Vec<KeyStatusView> = body_json(response).await;
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].subscription_id, "sub_1");

        let response = limits(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let keys: Vec<serde_json::Value> = body_json(response).await;
        assert_eq!(keys[0]["subscriptionId"], "sub_1");
        assert_eq!(keys[0]["avgIntervalMs"], 860);
        assert_eq!(keys[0]["nextRequestAllowedAt"], 0);
    }

    #[tokio::test]
    async fn delete_is_idempotent_over_http() {
        let state = test_state();
        state.registry.register("sub_1", "pro").await.unwrap();

        let response = delete_key(State(state.clone()), Path("sub_1".to_string())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let message: MessageResponse = body_json(response).await;
        assert!(message.message.contains("deleted"));

        let response = delete_key(State(state), Path("sub_1".to_string())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let message: MessageResponse = body_json(response).await;
        assert!(message.message.contains("not found"));
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = health().await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(response).await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn register_request_accepts_id_alias() {
        let json = r#"{"id": "sub_1", "plan": "pro"}"#;
        let request: RegisterKeyRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.subscription_id.as_deref(), Some("sub_1"));

        let json = r#"{"subscriptionId": "sub_2", "plan": "ultimate"}"#;
        let request: RegisterKeyRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.subscription_id.as_deref(), Some("sub_2"));
    }

    #[tokio::test]
    async fn reservation_wire_format() {
        let json = r#"{
            "status": "ok",
            "key": {
                "subscriptionId": "sub_abc",
                "plan": "pro",
                "avgRequestIntervalMs": 860,
                "lastUsed": 1700000000000,
                "nextRequestAllowedAt": 1700000000860
            }
        }"#;

        let response: ReservedResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.key.subscription_id, "sub_abc");
        assert_eq!(response.key.next_request_allowed_at, 1_700_000_000_860);

        let wait = serde_json::to_value(WaitResponse::new(170)).unwrap();
        assert_eq!(wait["status"], "wait");
        assert_eq!(wait["waitMs"], 170);
    }
}
