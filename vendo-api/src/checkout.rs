use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vendo_core::payment::CardData;
use vendo_order::{CheckoutOutcome, CheckoutRequest};
use vendo_order::orchestrator::CheckoutError;
use vendo_order::models::{NewOrderItem, ShippingAddress};
use vendo_shared::Masked;

use crate::{error::AppError, middleware::auth::CustomerClaims, state::AppState};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CheckoutPayload {
    pub items: Vec<CheckoutItemPayload>,
    pub method: String,
    pub payment_method_id: Option<String>,
    pub card: Option<CardPayload>,
    pub customer_email: Option<String>,
    pub shipping_address: ShippingAddress,
    pub currency: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutItemPayload {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CardPayload {
    pub number: String,
    pub exp_month: u32,
    pub exp_year: u32,
    pub cvc: String,
}

/// Discriminated checkout result. Every variant carries a `status` field so
/// clients can branch without inspecting HTTP codes alone.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckoutResponse {
    Succeeded {
        order_id: Uuid,
        order_number: String,
        transaction_id: String,
        message: String,
    },
    RequiresAction {
        client_secret: String,
    },
    PaymentFailed {
        code: String,
        message: String,
    },
    InsufficientStock {
        message: String,
    },
}

fn validate(payload: &CheckoutPayload) -> Result<(), AppError> {
    if payload.items.is_empty() {
        return Err(AppError::ValidationError("Order must contain at least one item".into()));
    }
    for item in &payload.items {
        if item.quantity <= 0 {
            return Err(AppError::ValidationError(format!(
                "Invalid quantity {} for product {}",
                item.quantity, item.product_id
            )));
        }
        if item.unit_price <= Decimal::ZERO {
            return Err(AppError::ValidationError(format!(
                "Invalid unit price for product {}",
                item.product_id
            )));
        }
    }
    if payload.method.trim().is_empty() {
        return Err(AppError::ValidationError("Payment method is required".into()));
    }
    Ok(())
}

// ============================================================================
// Handler
// ============================================================================

/// POST /v1/checkout
pub async fn checkout(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Json(payload): Json<CheckoutPayload>,
) -> Result<Response, AppError> {
    validate(&payload)?;

    let identity = claims
        .identity()
        .ok_or_else(|| AppError::AuthenticationError("Token carries no usable identity".into()))?;

    let customer_email = payload
        .customer_email
        .or_else(|| claims.email.clone())
        .map(Masked::new);

    let request = CheckoutRequest {
        identity,
        session_id: payload.session_id,
        items: payload
            .items
            .into_iter()
            .map(|item| NewOrderItem {
                product_id: item.product_id,
                product_name: item.product_name,
                quantity: item.quantity,
                unit_price: item.unit_price,
                image_url: item.image_url,
            })
            .collect(),
        method: payload.method,
        payment_method_id: payload.payment_method_id,
        card: payload.card.map(|card| CardData {
            number: Masked::new(card.number),
            exp_month: card.exp_month,
            exp_year: card.exp_year,
            cvc: Masked::new(card.cvc),
        }),
        customer_email,
        shipping_address: payload.shipping_address,
        currency: payload.currency.unwrap_or_else(|| state.default_currency.clone()),
    };

    let outcome = match state.orchestrator.checkout(request).await {
        Ok(outcome) => outcome,
        Err(CheckoutError::Identity(err)) => {
            return Err(AppError::AuthenticationError(err.to_string()))
        }
        Err(CheckoutError::AmountOverflow) => {
            return Err(AppError::ValidationError("Order total is out of range".into()))
        }
        Err(CheckoutError::PaymentUnknown(err)) => {
            tracing::error!(%err, "Checkout abandoned with payment state unknown");
            return Err(AppError::BadGatewayError("payment_unknown".into()));
        }
        Err(CheckoutError::Store(err)) => {
            return Err(AppError::InternalServerError(err.to_string()))
        }
    };

    Ok(match outcome {
        CheckoutOutcome::Succeeded { order_id, order_number, transaction_id } => (
            StatusCode::OK,
            Json(CheckoutResponse::Succeeded {
                order_id,
                order_number,
                transaction_id,
                message: "Order placed successfully".into(),
            }),
        )
            .into_response(),
        CheckoutOutcome::RequiresAction { client_secret } => (
            StatusCode::OK,
            Json(CheckoutResponse::RequiresAction { client_secret }),
        )
            .into_response(),
        CheckoutOutcome::PaymentFailed { code, message } => (
            StatusCode::BAD_REQUEST,
            Json(CheckoutResponse::PaymentFailed { code, message }),
        )
            .into_response(),
        CheckoutOutcome::InsufficientStock { message } => (
            StatusCode::BAD_REQUEST,
            Json(CheckoutResponse::InsufficientStock { message }),
        )
            .into_response(),
    })
}
