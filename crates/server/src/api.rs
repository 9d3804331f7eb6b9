//! JSON API for inbound buyer messages.
//!
//! Endpoints:
//! - `POST /api/v1/negotiate` — run one negotiation turn for a listing

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use haggle_agent::runtime::NegotiationRuntime;
use haggle_core::domain::listing::ListingId;
use haggle_core::domain::session::BuyerId;
use haggle_core::errors::NegotiationError;

#[derive(Clone)]
pub struct ApiState {
    runtime: Arc<NegotiationRuntime>,
}

#[derive(Debug, Deserialize)]
pub struct NegotiateRequest {
    pub item_id: String,
    pub message: String,
    pub conversation_id: Option<String>,
    pub buyer_email: String,
}

#[derive(Debug, Serialize)]
pub struct NegotiateResponse {
    pub success: bool,
    pub conversation_id: Option<String>,
    pub response: String,
    pub offer_accepted: bool,
    pub offer_countered: bool,
    pub counter_offer_amount: Option<Decimal>,
    pub offer_amount: Option<Decimal>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub success: bool,
    pub error: String,
}

pub fn router(runtime: Arc<NegotiationRuntime>) -> Router {
    Router::new()
        .route("/api/v1/negotiate", post(negotiate))
        .with_state(ApiState { runtime })
}

pub async fn negotiate(
    State(state): State<ApiState>,
    Json(request): Json<NegotiateRequest>,
) -> Result<Json<NegotiateResponse>, (StatusCode, Json<ApiError>)> {
    let correlation_id = Uuid::new_v4().to_string();
    let listing_id = ListingId(request.item_id.clone());
    let buyer_id = BuyerId(request.buyer_email.trim().to_ascii_lowercase());

    if request.message.trim().is_empty() || buyer_id.0.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError {
                success: false,
                error: "message and buyer_email are required".to_string(),
            }),
        ));
    }

    info!(
        event_name = "api.negotiate.received",
        correlation_id = %correlation_id,
        listing_id = %listing_id.0,
        conversation_id = request.conversation_id.as_deref().unwrap_or("none"),
        "negotiation message received"
    );

    let outcome = state
        .runtime
        .handle_message(&listing_id, &buyer_id, &request.message, &correlation_id)
        .await
        .map_err(|error| {
            warn!(
                event_name = "api.negotiate.failed",
                correlation_id = %correlation_id,
                listing_id = %listing_id.0,
                error = %error,
                "negotiation turn failed"
            );
            (status_for(&error), Json(ApiError { success: false, error: error.user_message().to_string() }))
        })?;

    Ok(Json(NegotiateResponse {
        success: true,
        conversation_id: outcome.session_id.as_ref().map(|id| id.0.clone()),
        response: outcome.reply.clone(),
        offer_accepted: outcome.offer_accepted(),
        offer_countered: outcome.offer_countered(),
        counter_offer_amount: outcome.counter_amount,
        offer_amount: outcome.offer_amount,
    }))
}

fn status_for(error: &NegotiationError) -> StatusCode {
    match error {
        NegotiationError::ListingNotFound { .. } => StatusCode::NOT_FOUND,
        NegotiationError::ListingUnavailable { .. } => StatusCode::CONFLICT,
        NegotiationError::InvalidOfferInput(_) | NegotiationError::Domain(_) => {
            StatusCode::BAD_REQUEST
        }
        NegotiationError::ConcurrentAppendConflict { .. } | NegotiationError::Repository(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{extract::State, http::StatusCode, Json};
    use chrono::Duration;
    use rust_decimal::Decimal;

    use haggle_agent::directive::TemplateComposer;
    use haggle_agent::runtime::{NegotiationRuntime, RuntimeSettings};
    use haggle_core::audit::InMemoryAuditSink;
    use haggle_core::domain::listing::{Aggressiveness, Listing, ListingId, ListingStatus};
    use haggle_core::policy::{FixedRateStrategy, NegotiationPolicy};
    use haggle_db::repositories::{
        InMemoryListingRepository, InMemorySessionRepository, ListingRepository,
    };

    use super::{negotiate, ApiState, NegotiateRequest};

    async fn api_state() -> ApiState {
        let listings = Arc::new(InMemoryListingRepository::default());
        listings
            .save(Listing {
                id: ListingId("lst-bike".to_string()),
                title: "Road bike".to_string(),
                asking_price: Decimal::new(100, 0),
                minimum_price: Some(Decimal::new(70, 0)),
                aggressiveness: Aggressiveness::Balanced,
                status: ListingStatus::Active,
            })
            .await
            .expect("seed listing");

        let runtime = NegotiationRuntime::new(
            listings,
            Arc::new(InMemorySessionRepository::default()),
            Arc::new(NegotiationPolicy::with_limits(
                FixedRateStrategy(Decimal::new(70, 2)),
                3,
                Decimal::TEN,
                Duration::minutes(10),
            )),
            Arc::new(TemplateComposer),
            Arc::new(InMemoryAuditSink::default()),
            RuntimeSettings::default(),
        );

        ApiState { runtime: Arc::new(runtime) }
    }

    fn request(item_id: &str, message: &str) -> NegotiateRequest {
        NegotiateRequest {
            item_id: item_id.to_string(),
            message: message.to_string(),
            conversation_id: None,
            buyer_email: "Buyer@Example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn negotiate_returns_the_wire_contract_for_a_counter() {
        let state = api_state().await;

        let Json(payload) = negotiate(State(state), Json(request("lst-bike", "would you take 80?")))
            .await
            .expect("negotiate");

        assert!(payload.success);
        assert!(payload.offer_countered);
        assert!(!payload.offer_accepted);
        assert_eq!(payload.counter_offer_amount, Some(Decimal::new(94, 0)));
        assert_eq!(payload.offer_amount, Some(Decimal::new(80, 0)));
        assert!(payload.conversation_id.is_some());
        assert!(payload.response.contains("94"));
    }

    #[tokio::test]
    async fn negotiate_without_an_offer_still_succeeds() {
        let state = api_state().await;

        let Json(payload) = negotiate(State(state), Json(request("lst-bike", "is it heavy?")))
            .await
            .expect("negotiate");

        assert!(payload.success);
        assert!(!payload.offer_accepted);
        assert!(!payload.offer_countered);
        assert_eq!(payload.conversation_id, None);
        assert_eq!(payload.offer_amount, None);
    }

    #[tokio::test]
    async fn unknown_listing_maps_to_not_found() {
        let state = api_state().await;

        let (status, Json(payload)) =
            negotiate(State(state), Json(request("lst-ghost", "offer 80")))
                .await
                .expect_err("missing listing should fail");

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(!payload.success);
    }

    #[tokio::test]
    async fn blank_message_is_a_bad_request() {
        let state = api_state().await;

        let (status, _) = negotiate(State(state), Json(request("lst-bike", "   ")))
            .await
            .expect_err("blank message should fail");

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
