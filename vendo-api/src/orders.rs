use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vendo_order::models::{Order, OrderItem, OrderStatus, PaymentStatus, ShippingAddress};
use vendo_order::refund::RefundError;
use vendo_order::store::StoreError;

use crate::{error::AppError, middleware::auth::CustomerClaims, state::AppState};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub total_amount: Decimal,
    pub currency: String,
    pub transaction_id: Option<String>,
    pub items: Vec<OrderItemResponse>,
    pub shipping_address: Option<ShippingAddress>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct OrderItemResponse {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub image_url: Option<String>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            order_number: order.order_number,
            status: order.status,
            payment_status: order.payment_status,
            total_amount: order.total_amount,
            currency: order.currency,
            transaction_id: order.transaction_id,
            items: order.items.into_iter().map(OrderItemResponse::from).collect(),
            shipping_address: order.shipping_address,
            created_at: order.created_at,
        }
    }
}

impl From<OrderItem> for OrderItemResponse {
    fn from(item: OrderItem) -> Self {
        Self {
            product_id: item.product_id,
            product_name: item.product_name,
            quantity: item.quantity,
            unit_price: item.unit_price,
            image_url: item.image_url,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RefundPayload {
    pub amount: Decimal,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RefundResponse {
    pub refund_id: Uuid,
    pub message: String,
}

/// Discriminated refund failure body, so clients branch on a stable code
/// instead of parsing prose.
#[derive(Debug, Serialize)]
pub struct RefundFailure {
    pub error_code: String,
    pub message: String,
}

// ============================================================================
// Handlers
// ============================================================================

async fn resolve_user(state: &AppState, claims: &CustomerClaims) -> Result<Uuid, AppError> {
    let identity = claims
        .identity()
        .ok_or_else(|| AppError::AuthenticationError("Token carries no usable identity".into()))?;
    state
        .identity
        .resolve(&identity)
        .await
        .map_err(|err| AppError::AuthenticationError(err.to_string()))
}

fn store_err(err: StoreError) -> AppError {
    AppError::InternalServerError(err.to_string())
}

/// GET /v1/orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let user_id = resolve_user(&state, &claims).await?;

    let order = state
        .store
        .get_order(order_id)
        .await
        .map_err(store_err)?
        .ok_or_else(|| AppError::NotFoundError(format!("Order {order_id} not found")))?;

    if order.user_id != user_id {
        return Err(AppError::AuthorizationError("Order belongs to another customer".into()));
    }

    Ok(Json(OrderResponse::from(order)))
}

/// GET /v1/orders
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
) -> Result<Json<Vec<OrderResponse>>, AppError> {
    let user_id = resolve_user(&state, &claims).await?;

    let orders = state.store.list_orders(user_id).await.map_err(store_err)?;

    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}

fn refund_failure(status: StatusCode, error_code: &str, message: String) -> Response {
    (status, Json(RefundFailure { error_code: error_code.into(), message })).into_response()
}

/// POST /v1/orders/{id}/refund
pub async fn refund_order(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<RefundPayload>,
) -> Result<Response, AppError> {
    if payload.amount <= Decimal::ZERO {
        return Ok(refund_failure(
            StatusCode::BAD_REQUEST,
            "invalid_amount",
            "Refund amount must be positive".into(),
        ));
    }

    let user_id = resolve_user(&state, &claims).await?;

    let order = state
        .store
        .get_order(order_id)
        .await
        .map_err(store_err)?
        .ok_or_else(|| AppError::NotFoundError(format!("Order {order_id} not found")))?;
    if order.user_id != user_id {
        return Err(AppError::AuthorizationError("Order belongs to another customer".into()));
    }

    let receipt = match state.refunds.refund(order_id, payload.amount, payload.reason).await {
        Ok(receipt) => receipt,
        Err(RefundError::NotFound(id)) => {
            return Ok(refund_failure(
                StatusCode::NOT_FOUND,
                "order_not_found",
                format!("Order {id} not found"),
            ))
        }
        Err(RefundError::MissingTransaction(id)) => {
            return Ok(refund_failure(
                StatusCode::BAD_REQUEST,
                "missing_transaction",
                format!("Order {id} has no payment transaction to refund"),
            ))
        }
        Err(RefundError::Declined { code, message }) => {
            return Ok(refund_failure(StatusCode::BAD_REQUEST, &code, message))
        }
        Err(RefundError::Unknown(err)) => {
            tracing::error!(%err, %order_id, "Refund abandoned with gateway state unknown");
            return Err(AppError::BadGatewayError("refund_unknown".into()));
        }
        Err(RefundError::Store(err)) => {
            return Err(AppError::InternalServerError(err.to_string()))
        }
    };

    Ok((
        StatusCode::OK,
        Json(RefundResponse {
            refund_id: receipt.refund_id,
            message: format!("Refund {} issued", receipt.refund_reference),
        }),
    )
        .into_response())
}
