//! HTTP surface for the facilitator.
//!
//! Thin axum handlers over [`Facilitator`]: business outcomes
//! (rejections, failed settlements) are `200 OK` with structured reason
//! codes in the body, so sellers branch on data rather than status
//! codes. Undecodable requests fail at extraction with `4xx`.

use crate::facilitator::Facilitator;
use crate::types::{SettleRequest, VerifyRequest};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::instrument;

/// Name of the request header carrying the signed payment payload.
pub const PAYMENT_HEADER: &str = "X-PAYMENT";
/// Name of the response header carrying the settlement proof.
pub const PAYMENT_RESPONSE_HEADER: &str = "X-PAYMENT-RESPONSE";

/// Builds the facilitator router.
pub fn routes(facilitator: Arc<Facilitator>) -> Router {
    Router::new()
        .route("/", get(get_index))
        .route("/verify", post(post_verify))
        .route("/settle", post(post_settle))
        .route("/supported", get(get_supported))
        .route("/health", get(get_health))
        .route("/health/deep", get(get_deep_health))
        .layer(TraceLayer::new_for_http())
        .with_state(facilitator)
}

/// `GET /`: service banner with endpoint listing.
#[instrument(skip_all)]
async fn get_index() -> impl IntoResponse {
    Json(json!({
        "service": "x402 facilitator",
        "endpoints": {
            "/verify": "POST - verify a payment payload against its requirement",
            "/settle": "POST - execute a verified payment on-chain",
            "/supported": "GET - supported (scheme, network, asset) kinds",
            "/health": "GET - liveness",
            "/health/deep": "GET - per-network RPC connectivity",
        },
    }))
}

/// `POST /verify`: checks a payload against its requirement. Performs no
/// chain mutation.
#[instrument(skip_all)]
async fn post_verify(
    State(facilitator): State<Arc<Facilitator>>,
    Json(body): Json<VerifyRequest>,
) -> impl IntoResponse {
    let response = facilitator.verify(&body).await;
    if !response.is_valid {
        tracing::warn!(
            reason = %response.invalid_reason.map(|r| r.as_str()).unwrap_or("unknown"),
            payer = response.payer.as_deref().unwrap_or("unknown"),
            network = %body.payment_requirements.network,
            "verification rejected"
        );
    }
    (StatusCode::OK, Json(response))
}

/// `POST /settle`: executes a verified payment on-chain.
///
/// The settlement future runs as a detached task: a client that gives up
/// and drops the connection must not abort an in-flight broadcast, since
/// an abandoned broadcast can still land on-chain and is reconciled
/// through the nonce-consumption read on the next attempt.
#[instrument(skip_all)]
async fn post_settle(
    State(facilitator): State<Arc<Facilitator>>,
    Json(body): Json<SettleRequest>,
) -> impl IntoResponse {
    let network = body.payment_requirements.network.clone();
    let task = tokio::spawn(async move { facilitator.settle(&body).await });

    match task.await {
        Ok(response) => {
            if !response.success {
                tracing::warn!(
                    reason = %response.error_reason.map(|r| r.as_str()).unwrap_or("unknown"),
                    %network,
                    "settlement did not complete"
                );
            }
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(join_error) => {
            tracing::error!(error = %join_error, "settlement task aborted");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "settlement task failed" })),
            )
                .into_response()
        }
    }
}

/// `GET /supported`: static capability advertisement.
#[instrument(skip_all)]
async fn get_supported(State(facilitator): State<Arc<Facilitator>>) -> impl IntoResponse {
    (StatusCode::OK, Json(facilitator.supported()))
}

/// `GET /health`: liveness only, no chain dependency.
#[instrument(skip_all)]
async fn get_health(State(facilitator): State<Arc<Facilitator>>) -> impl IntoResponse {
    (StatusCode::OK, Json(facilitator.health()))
}

/// `GET /health/deep`: one read RPC per configured network.
#[instrument(skip_all)]
async fn get_deep_health(State(facilitator): State<Arc<Facilitator>>) -> impl IntoResponse {
    let providers = facilitator.deep_health().await;
    (StatusCode::OK, Json(json!({ "providers": providers })))
}
