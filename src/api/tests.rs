//! Tests for the JSON-RPC surface
//!
//! Drives the axum router in-process with `tower::ServiceExt::oneshot`.

#[cfg(test)]
mod tests {
    use crate::{
        api::router,
        api::server::{
            BATCH_NOT_FOUND, INVALID_BATCH_ID, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND,
        },
        config::{RegistryConfig, UnknownBatchQuery},
        registry::BatchRegistry,
    };
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        Router,
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> Router {
        router(Arc::new(BatchRegistry::new(&RegistryConfig::default())))
    }

    /// Send one JSON-RPC request and decode the response body
    async fn call(app: &Router, method: &str, params: Value) -> Value {
        send(app, json!({ "jsonrpc": "2.0", "method": method, "params": params, "id": 7 })).await
    }

    async fn send(app: &Router, body: Value) -> Value {
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn error_code(response: &Value) -> i64 {
        response["error"]["code"].as_i64().expect("expected an error response")
    }

    #[tokio::test]
    async fn test_end_to_end_over_rpc() {
        let app = app();

        let registered = call(
            &app,
            "registerBatch",
            json!({ "cropType": "Wheat", "originFarm": "FarmA", "harvestDate": 1700000000u64 }),
        )
        .await;
        assert_eq!(registered["result"], json!({ "batchId": 1 }));
        assert_eq!(registered["id"], json!(7));

        let transferred = call(
            &app,
            "transferOwnership",
            json!({ "batchId": 1, "newOwner": "DistributorB" }),
        )
        .await;
        assert_eq!(transferred["result"], json!(true));

        let updated = call(&app, "updateStatus", json!({ "batchId": 1, "newStatus": "In Transit" })).await;
        assert_eq!(updated["result"], json!(true));

        let details = call(&app, "getBatchDetails", json!({ "batchId": 1 })).await;
        assert_eq!(
            details["result"],
            json!({
                "batchId": 1,
                "cropType": "Wheat",
                "originFarm": "FarmA",
                "harvestDate": 1700000000u64,
                "currentOwner": "DistributorB",
                "status": "In Transit"
            })
        );

        let rejected = call(&app, "transferOwnership", json!({ "batchId": 2, "newOwner": "X" })).await;
        assert_eq!(error_code(&rejected), INVALID_BATCH_ID as i64);
        assert!(rejected.get("result").is_none());

        let count = call(&app, "batchCount", Value::Null).await;
        assert_eq!(count["result"], json!(1));
    }

    #[tokio::test]
    async fn test_history_and_event_paging() {
        let app = app();
        call(&app, "registerBatch", json!({ "cropType": "Corn", "originFarm": "FarmB", "harvestDate": 5 })).await;
        call(&app, "transferOwnership", json!({ "batchId": 1, "newOwner": "CarrierX" })).await;

        let history = call(&app, "getBatchHistory", json!({ "batchId": 1 })).await;
        let events = history["result"].as_array().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["kind"], json!("Registered"));
        assert_eq!(events[0]["cropType"], json!("Corn"));
        assert_eq!(events[1]["kind"], json!("OwnershipTransferred"));
        assert_eq!(events[1]["newOwner"], json!("CarrierX"));
        assert_eq!(events[1]["sequence"], json!(2));

        let page = call(&app, "getEvents", json!({ "fromSequence": 2 })).await;
        assert_eq!(page["result"].as_array().unwrap().len(), 1);

        // Params may be omitted entirely
        let all = call(&app, "getEvents", Value::Null).await;
        assert_eq!(all["result"].as_array().unwrap().len(), 2);

        let missing = call(&app, "getBatchHistory", json!({ "batchId": 9 })).await;
        assert_eq!(error_code(&missing), INVALID_BATCH_ID as i64);
    }

    #[tokio::test]
    async fn test_unknown_batch_query_modes() {
        let strict = app();
        let response = call(&strict, "getBatchDetails", json!({ "batchId": 3 })).await;
        assert_eq!(error_code(&response), BATCH_NOT_FOUND as i64);

        let legacy = router(Arc::new(BatchRegistry::new(&RegistryConfig {
            unknown_batch_query: UnknownBatchQuery::DefaultRecord,
            ..RegistryConfig::default()
        })));
        let response = call(&legacy, "getBatchDetails", json!({ "batchId": 3 })).await;
        assert_eq!(response["result"]["batchId"], json!(0));
        assert_eq!(response["result"]["status"], json!(""));
        assert_eq!(response["result"]["currentOwner"], json!(""));
    }

    #[tokio::test]
    async fn test_pre_epoch_harvest_date_over_rpc() {
        let app = app();
        let registered = call(
            &app,
            "registerBatch",
            json!({ "cropType": "Barley", "originFarm": "FarmOld", "harvestDate": -315619200 }),
        )
        .await;
        assert_eq!(registered["result"], json!({ "batchId": 1 }));

        let details = call(&app, "getBatchDetails", json!({ "batchId": 1 })).await;
        assert_eq!(details["result"]["harvestDate"], json!(-315619200));
    }

    #[tokio::test]
    async fn test_audit_log() {
        let app = app();
        call(&app, "registerBatch", json!({ "cropType": "Rye", "originFarm": "FarmC", "harvestDate": 1 })).await;

        let report = call(&app, "auditLog", Value::Null).await;
        assert_eq!(report["result"], json!({ "batches": 1, "events": 1, "consistent": true }));
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let app = app();

        let unknown = call(&app, "deleteBatch", json!({ "batchId": 1 })).await;
        assert_eq!(error_code(&unknown), METHOD_NOT_FOUND as i64);

        let bad_params = call(&app, "registerBatch", json!({ "cropType": "Wheat" })).await;
        assert_eq!(error_code(&bad_params), INVALID_PARAMS as i64);

        let negative = call(&app, "updateStatus", json!({ "batchId": -1, "newStatus": "x" })).await;
        assert_eq!(error_code(&negative), INVALID_PARAMS as i64);

        let wrong_version = send(&app, json!({ "jsonrpc": "1.0", "method": "batchCount", "id": 1 })).await;
        assert_eq!(error_code(&wrong_version), INVALID_REQUEST as i64);

        // Nothing above touched the registry
        let count = call(&app, "batchCount", Value::Null).await;
        assert_eq!(count["result"], json!(0));
    }
}
