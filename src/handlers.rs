// =============================================================================
// HANDLERS MODULE
// =============================================================================
// HTTP request handlers (controller layer). Business rules live in
// `orders.rs`; handlers authenticate, call the service, manage the order
// cache and record request metrics.
// =============================================================================

use axum::{
    extract::{FromRequest, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::time::Instant;

use crate::auth::{AdminUser, AuthUser};
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::*;
use crate::orders::ensure_visible_to;
use crate::store::Page;
use crate::AppState;

/// `Json` body extractor whose rejections (missing fields, wrong types,
/// missing content type) are reported as `400` in the error envelope.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Record request count and latency for a finished handler.
fn observe<T>(method: &str, endpoint: &str, start: Instant, ok_status: StatusCode, result: &AppResult<T>) {
    let status = match result {
        Ok(_) => ok_status,
        Err(e) => e.status_code(),
    };
    metrics::record_http_request(method, endpoint, status.as_u16(), start.elapsed().as_secs_f64());
}

// =============================================================================
// HEALTH CHECK ENDPOINTS
// =============================================================================

/// Liveness probe
///
/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "order-service".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness probe: database and Redis must both answer.
///
/// GET /ready
pub async fn readiness_check(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, StatusCode> {
    let db_healthy = state.db.health_check().await;
    let redis_healthy = state.cache.ping().await;

    let all_healthy = db_healthy && redis_healthy;
    let response = ReadinessResponse {
        status: if all_healthy { "ready" } else { "not_ready" }.to_string(),
        checks: ReadinessChecks {
            database: db_healthy,
            redis: redis_healthy,
        },
    };

    if all_healthy {
        Ok(Json(response))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

/// Prometheus metrics endpoint
///
/// GET /metrics
pub async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}

// =============================================================================
// ORDER API ENDPOINTS
// =============================================================================

/// Query parameters for list endpoints
///
/// # Example
/// GET /api/orders?page=2&per_page=20
#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default = "default_page")]
    pub page: i32,

    /// Items per page (default: 20, max: 100)
    #[serde(default = "default_per_page")]
    pub per_page: i32,
}

fn default_page() -> i32 {
    1
}
fn default_per_page() -> i32 {
    20
}

impl ListParams {
    fn page(&self) -> Page {
        Page {
            page: self.page.max(1),
            per_page: self.per_page.clamp(1, 100),
        }
    }
}

// -----------------------------------------------------------------------------
// CREATE ORDER
// -----------------------------------------------------------------------------
/// Submit a checkout for the authenticated user
///
/// POST /api/orders
///
/// # Response
/// - 201 Created: order persisted (PREPAID orders carry `razorpayOrderId`)
/// - 400 Bad Request: invalid payment mode, delivery date, cart or amounts
/// - 500: payment gateway or database failure; no order is left behind
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<CreateOrderRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Order>>)> {
    let start = Instant::now();

    tracing::info!(
        user_id = %user.user_id,
        payment_mode = %request.payment_mode,
        items = request.cart_items.len(),
        "Creating order"
    );

    let result = state.orders.create_order(&user.user_id, request).await;
    observe("POST", "/api/orders", start, StatusCode::CREATED, &result);

    let order = result?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message("Order created successfully", order)),
    ))
}

// -----------------------------------------------------------------------------
// VERIFY PAYMENT
// -----------------------------------------------------------------------------
/// Payment callback from the checkout page
///
/// POST /api/orders/verify-payment
///
/// No bearer token: the HMAC signature authenticates the call.
///
/// # Request Body
/// ```json
/// {
///   "razorpay_order_id": "order_N5Ax...",
///   "razorpay_payment_id": "pay_N5Ay...",
///   "razorpay_signature": "9f2c..."
/// }
/// ```
pub async fn verify_payment(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<VerifyPaymentRequest>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let start = Instant::now();

    let result = state.orders.verify_payment(request).await;
    observe("POST", "/api/orders/verify-payment", start, StatusCode::OK, &result);

    let order = result?;
    state.cache.invalidate(&order.order_id).await;

    Ok(Json(ApiResponse::with_message(
        "Payment verified successfully",
        order,
    )))
}

// -----------------------------------------------------------------------------
// LIST MY ORDERS
// -----------------------------------------------------------------------------
/// Settled orders (COD or PAID) of the authenticated user, newest first
///
/// GET /api/orders/user?page=1&per_page=20
pub async fn list_user_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<ListParams>,
) -> AppResult<Json<ApiResponse<OrderListResponse>>> {
    let start = Instant::now();

    let result = state
        .orders
        .list_user_orders(&user.user_id, params.page())
        .await;
    observe("GET", "/api/orders/user", start, StatusCode::OK, &result);

    Ok(Json(ApiResponse::ok(result?)))
}

// -----------------------------------------------------------------------------
// GET SINGLE ORDER
// -----------------------------------------------------------------------------
/// Single order by its public identifier
///
/// GET /api/orders/:orderId
///
/// # Response
/// - 200 OK
/// - 403 Forbidden: the caller neither owns the order nor is an admin
/// - 404 Not Found
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<String>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let start = Instant::now();

    let result = match state.cache.get(&order_id).await {
        Some(order) => Ok(order),
        None => {
            let fetched = state.orders.get_order(&order_id).await;
            if let Ok(order) = &fetched {
                state.cache.put(order).await;
            }
            fetched
        }
    }
    .and_then(|order| ensure_visible_to(&order, &user).map(|_| order));
    observe("GET", "/api/orders/:orderId", start, StatusCode::OK, &result);

    Ok(Json(ApiResponse::ok(result?)))
}

// -----------------------------------------------------------------------------
// LIST ALL ORDERS (ADMIN)
// -----------------------------------------------------------------------------
/// All settled orders, newest first
///
/// GET /api/orders?page=1&per_page=20
pub async fn list_all_orders(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(params): Query<ListParams>,
) -> AppResult<Json<ApiResponse<OrderListResponse>>> {
    let start = Instant::now();

    let result = state.orders.list_all_orders(params.page()).await;
    observe("GET", "/api/orders", start, StatusCode::OK, &result);

    Ok(Json(ApiResponse::ok(result?)))
}

// -----------------------------------------------------------------------------
// UPDATE ORDER STATUS (ADMIN)
// -----------------------------------------------------------------------------
/// Change the fulfilment status
///
/// PATCH /api/orders/admin/:orderId/status
///
/// # Request Body
/// ```json
/// { "status": "Shipped" }
/// ```
///
/// Accepted values: Pending, Processing, Shipped, Delivered, Cancelled.
pub async fn update_order_status(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(order_id): Path<String>,
    ApiJson(request): ApiJson<UpdateStatusRequest>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let start = Instant::now();

    tracing::info!(
        order_id = %order_id,
        status = %request.status,
        admin_id = %admin.user_id,
        "Updating order status"
    );

    let result = state
        .orders
        .update_order_status(&order_id, &request.status)
        .await;
    observe(
        "PATCH",
        "/api/orders/admin/:orderId/status",
        start,
        StatusCode::OK,
        &result,
    );

    let order = result?;
    state.cache.invalidate(&order.order_id).await;

    Ok(Json(ApiResponse::with_message("Order status updated", order)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header::CONTENT_TYPE, Request};
    use axum::response::IntoResponse;

    fn json_request(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/orders")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn body_without_delivery_date_is_a_bad_request() {
        let body = serde_json::json!({
            "shippingAddress": { "firstName": "Asha" },
            "cartItems": [],
            "paymentMode": "COD",
            "totalPrice": 100
        });

        let err = ApiJson::<CreateOrderRequest>::from_request(json_request(body), &())
            .await
            .err()
            .unwrap();

        assert!(matches!(&err, AppError::BadRequest(msg) if msg.contains("deliveryDate")));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "application/json"
        );
    }

    #[tokio::test]
    async fn mistyped_field_is_a_bad_request() {
        let body = serde_json::json!({ "status": 3 });
        let err = ApiJson::<UpdateStatusRequest>::from_request(json_request(body), &())
            .await
            .err()
            .unwrap();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn well_formed_body_is_extracted() {
        let body = serde_json::json!({ "status": "Shipped" });
        let ApiJson(request) = ApiJson::<UpdateStatusRequest>::from_request(json_request(body), &())
            .await
            .ok()
            .unwrap();
        assert_eq!(request.status, "Shipped");
    }

    #[test]
    fn list_params_are_clamped() {
        let params = ListParams { page: 0, per_page: 500 };
        assert_eq!(params.page(), Page { page: 1, per_page: 100 });

        let params = ListParams { page: 3, per_page: 0 };
        assert_eq!(params.page(), Page { page: 3, per_page: 1 });
    }
}
