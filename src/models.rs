// =============================================================================
// MODELS MODULE
// =============================================================================
// Data structures shared by the order lifecycle, the storage layer and the
// HTTP handlers.
//
// LEARNING NOTES:
// - Closed enums (OrderStatus, PaymentStatus, PaymentMode) make invalid
//   states unrepresentable; strings only exist at the JSON/SQL edges
// - Field names follow the storefront's JSON contract (camelCase for the
//   order, snake_case inside cart items)
// =============================================================================

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// ENUMERATIONS
// =============================================================================

/// Error returned when a string does not name a known enum variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {} value: {}", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

// -----------------------------------------------------------------------------
// PAYMENT MODE
// -----------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentMode {
    /// Cash on delivery
    Cod,
    /// Paid through the payment gateway before fulfilment
    Prepaid,
}

impl PaymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMode::Cod => "COD",
            PaymentMode::Prepaid => "PREPAID",
        }
    }
}

impl FromStr for PaymentMode {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COD" => Ok(PaymentMode::Cod),
            "PREPAID" => Ok(PaymentMode::Prepaid),
            other => Err(UnknownVariant {
                kind: "payment mode",
                value: other.to_string(),
            }),
        }
    }
}

// -----------------------------------------------------------------------------
// PAYMENT STATUS
// -----------------------------------------------------------------------------
/// Payment capture stage.
///
/// `Pending -> Paid` is the only forward transition and `Paid` is terminal.
/// COD orders start and stay at `Cod`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Cod,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Cod => "COD",
        }
    }

    /// Whether orders in this state show up in order listings.
    pub fn is_listable(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Cod)
    }
}

impl FromStr for PaymentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PaymentStatus::Pending),
            "PAID" => Ok(PaymentStatus::Paid),
            "COD" => Ok(PaymentStatus::Cod),
            other => Err(UnknownVariant {
                kind: "payment status",
                value: other.to_string(),
            }),
        }
    }
}

// -----------------------------------------------------------------------------
// ORDER STATUS
// -----------------------------------------------------------------------------
/// Fulfilment status, independent of the payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Processing => "Processing",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
        }
    }

    /// Statuses that assume the goods have left the warehouse.
    pub fn requires_settled_payment(&self) -> bool {
        matches!(self, OrderStatus::Shipped | OrderStatus::Delivered)
    }
}

impl FromStr for OrderStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "order status",
                value: s.to_string(),
            })
    }
}

// =============================================================================
// ORDER
// =============================================================================

/// Postal address attached to an order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Address {
    pub first_name: String,
    pub last_name: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub phone: String,
    /// Only meaningful for shipping addresses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
}

/// Add-on selected together with a cart item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddOnSelection {
    pub name: String,
    pub selling_price: Decimal,
    pub quantity: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// One ordered line item, priced by the client at checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    #[serde(rename = "productId")]
    pub product_id: String,
    pub name: String,
    #[serde(default)]
    pub variant_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub selling_price: Decimal,
    pub original_price: Decimal,
    pub quantity: i32,
    #[serde(default)]
    pub add_ons: Vec<AddOnSelection>,
}

/// A persisted order.
///
/// `id` is the database record identifier; `order_id` is the public,
/// server-generated identifier that never changes once assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub order_id: String,
    pub user_id: String,
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
    pub cart_items: Vec<CartItem>,
    pub payment_mode: PaymentMode,
    pub payment_status: PaymentStatus,
    pub delivery_date: NaiveDate,
    pub delivery_slot: Option<String>,
    pub shipping_charges: Decimal,
    pub coupan_applied: Option<String>,
    pub coupan_discount: Decimal,
    pub total_shipment_price: Decimal,
    pub total_product_price: Decimal,
    pub total_price: Decimal,
    pub order_note: String,
    pub order_status: OrderStatus,
    pub razorpay_order_id: Option<String>,
    pub razorpay_payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Order fields known before the first write.
///
/// Built by the lifecycle manager; the store assigns `id` and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub order_id: String,
    pub user_id: String,
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
    pub cart_items: Vec<CartItem>,
    pub payment_mode: PaymentMode,
    pub payment_status: PaymentStatus,
    pub delivery_date: NaiveDate,
    pub delivery_slot: Option<String>,
    pub shipping_charges: Decimal,
    pub coupan_applied: Option<String>,
    pub coupan_discount: Decimal,
    pub total_shipment_price: Decimal,
    pub total_product_price: Decimal,
    pub total_price: Decimal,
    pub order_note: String,
    pub razorpay_order_id: Option<String>,
}

// =============================================================================
// API REQUEST/RESPONSE STRUCTURES
// =============================================================================

// -----------------------------------------------------------------------------
// CREATE ORDER REQUEST
// -----------------------------------------------------------------------------
/// Checkout submission.
///
/// `paymentMode` and `deliveryDate` arrive as raw strings and are validated
/// by the lifecycle manager so malformed values produce a 400 with a clear
/// message instead of a body rejection.
///
/// # Example JSON
/// ```json
/// {
///   "shippingAddress": { "firstName": "Asha", "city": "Pune", ... },
///   "cartItems": [{ "productId": "p1", "name": "Cake", "selling_price": 500,
///                   "original_price": 600, "quantity": 1, "add_ons": [] }],
///   "paymentMode": "PREPAID",
///   "deliveryDate": "05-03-25",
///   "deliverySlot": "10AM-12PM",
///   "totalPrice": 500
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub shipping_address: Address,
    #[serde(default)]
    pub billing_address: Option<Address>,
    pub cart_items: Vec<CartItem>,
    pub payment_mode: String,
    pub delivery_date: String,
    #[serde(default)]
    pub delivery_slot: Option<String>,
    #[serde(default)]
    pub shipping_charges: Decimal,
    #[serde(default)]
    pub coupan_applied: Option<String>,
    #[serde(default)]
    pub coupan_discount: Decimal,
    #[serde(default)]
    pub total_shipment_price: Decimal,
    #[serde(default)]
    pub total_product_price: Decimal,
    pub total_price: Decimal,
    #[serde(default)]
    pub order_note: String,
}

/// Payment callback delivered after the customer pays.
///
/// Fields are optional so a missing one is reported as a validation error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyPaymentRequest {
    #[serde(default)]
    pub razorpay_order_id: Option<String>,
    #[serde(default)]
    pub razorpay_payment_id: Option<String>,
    #[serde(default)]
    pub razorpay_signature: Option<String>,
}

/// Admin status change.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

// -----------------------------------------------------------------------------
// RESPONSE ENVELOPES
// -----------------------------------------------------------------------------
/// Success envelope returned by every order endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data,
        }
    }

    pub fn with_message(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data,
        }
    }
}

/// One page of orders.
#[derive(Debug, Clone, Serialize)]
pub struct OrderListResponse {
    pub items: Vec<Order>,
    pub total: i64,
    pub page: i32,
    pub per_page: i32,
}

// =============================================================================
// HEALTH CHECK RESPONSES
// =============================================================================

/// Simple health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Detailed readiness check response
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
}

#[derive(Debug, Serialize)]
pub struct ReadinessChecks {
    pub database: bool,
    pub redis: bool,
}

// =============================================================================
// ERROR RESPONSES
// =============================================================================

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,

    /// Error type/code
    pub error: String,

    /// Human-readable error message
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            message: message.into(),
        }
    }
}
