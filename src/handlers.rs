//! HTTP endpoints of the facilitator.
//!
//! Protocol endpoints (`/verify`, `/settle`) plus discovery endpoints (`/supported`,
//! `/discovery/resources`). Bodies follow the wire schemas in [`crate::types`] and are
//! compatible with the official x402 client SDKs.
//!
//! Failed payments are not HTTP errors: any payment-level failure is reported as a 200
//! with a structured `invalidReason`/`errorReason` body. Only malformed JSON is rejected
//! at the transport level.

use axum::extract::Query;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::Response;
use axum::{Extension, Json, response::IntoResponse};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;

use crate::discovery::DiscoveryIndex;
use crate::facilitator::Facilitator;
use crate::facilitator_local::FacilitatorLocal;
use crate::types::{ErrorResponse, SettleRequest, VerifyRequest, VerifyResponse};

/// `GET /verify`: machine-readable description of the `/verify` endpoint.
#[instrument(skip_all)]
pub async fn get_verify_info() -> impl IntoResponse {
    Json(json!({
        "endpoint": "/verify",
        "description": "POST to verify x402 payments",
        "body": {
            "paymentPayload": "PaymentPayload",
            "paymentRequirements": "PaymentRequirements",
        }
    }))
}

/// `GET /settle`: machine-readable description of the `/settle` endpoint.
#[instrument(skip_all)]
pub async fn get_settle_info() -> impl IntoResponse {
    Json(json!({
        "endpoint": "/settle",
        "description": "POST to settle x402 payments",
        "body": {
            "paymentPayload": "PaymentPayload",
            "paymentRequirements": "PaymentRequirements",
        }
    }))
}

/// `GET /supported`: payment kinds this facilitator serves, one per configured network.
#[instrument(skip_all)]
pub async fn get_supported(
    Extension(facilitator): Extension<FacilitatorLocal>,
) -> impl IntoResponse {
    match facilitator.supported().await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(error) => {
            tracing::error!(error = ?error, "Failed to list supported payment kinds");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Internal server error".to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Maps a body that fails the schema gate to `400` with an [`ErrorResponse`].
fn bad_request(rejection: JsonRejection) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: rejection.body_text(),
        }),
    )
        .into_response()
}

/// `POST /verify`: checks a payment payload against the declared requirements.
///
/// Responds with a [`VerifyResponse`]; verification failures carry the protocol
/// `invalidReason` and whatever payer identity was established before the failing check.
/// Bodies that fail the schema gate are rejected with `400`.
#[instrument(skip_all)]
pub async fn post_verify(
    Extension(facilitator): Extension<FacilitatorLocal>,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection),
    };
    match facilitator.verify(&body).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(error) => {
            tracing::warn!(
                error = %error,
                network = %body.payment_payload.network,
                "Verification failed"
            );
            (StatusCode::OK, Json(VerifyResponse::from(&error))).into_response()
        }
    }
}

/// `POST /settle`: executes a verified payment on-chain.
///
/// Returns a [`crate::types::SettleResponse`] with the transaction reference on success,
/// or `success: false` with the protocol `errorReason` on failure. Bodies that fail the
/// schema gate are rejected with `400`.
#[instrument(skip_all)]
pub async fn post_settle(
    Extension(facilitator): Extension<FacilitatorLocal>,
    body: Result<Json<SettleRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection),
    };
    let network = body.payment_payload.network;
    match facilitator.settle(&body).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(error) => {
            tracing::warn!(
                error = %error,
                network = %network,
                "Settlement failed"
            );
            (StatusCode::OK, Json(error.as_settle_response(network))).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DiscoveryQuery {
    #[serde(rename = "type")]
    pub resource_type: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// `GET /discovery/resources`: paginated listing of known payment-gated resources.
#[instrument(skip_all)]
pub async fn get_discovery_resources(
    Extension(index): Extension<Arc<DiscoveryIndex>>,
    Query(query): Query<DiscoveryQuery>,
) -> impl IntoResponse {
    let listing = index.list(query.resource_type.as_deref(), query.limit, query.offset);
    (StatusCode::OK, Json(listing))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider_cache::ProviderCache;
    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, header};
    use axum::routing::post;
    use std::collections::HashMap;
    use tower::ServiceExt;

    fn app() -> Router {
        let facilitator = FacilitatorLocal::new(ProviderCache::new(HashMap::new()));
        Router::new()
            .route("/verify", post(post_verify))
            .route("/settle", post(post_settle))
            .layer(Extension(facilitator))
    }

    async fn post_json(app: Router, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap();
        (status, value)
    }

    #[tokio::test]
    async fn malformed_body_is_a_400_with_error_json() {
        let (status, body) = post_json(app(), "/verify", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        // Well-formed JSON that fails the schema gate gets the same treatment.
        let (status, body) = post_json(app(), "/settle", r#"{"x402Version": 2}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn unserved_network_is_a_200_invalid_verify_response() {
        let request = serde_json::json!({
            "x402Version": 1,
            "paymentPayload": {
                "x402Version": 1,
                "scheme": "exact",
                "network": "base",
                "payload": {
                    "signature": format!("0x{}", "ab".repeat(65)),
                    "authorization": {
                        "from": "0x857b06519E91e3A54538791bDbb0E22373e36b66",
                        "to": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
                        "value": "10000",
                        "validAfter": "0",
                        "validBefore": "4294967295",
                        "nonce": format!("0x{}", "00".repeat(32))
                    }
                }
            },
            "paymentRequirements": {
                "scheme": "exact",
                "network": "base",
                "maxAmountRequired": "10000",
                "resource": "https://example.com/weather",
                "description": "",
                "mimeType": "application/json",
                "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
                "maxTimeoutSeconds": 60,
                "asset": "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"
            }
        });
        let (status, body) = post_json(app(), "/verify", &request.to_string()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isValid"], serde_json::json!(false));
        assert_eq!(body["invalidReason"], serde_json::json!("invalid_network"));
    }
}
