// =============================================================================
// ORDER LIFECYCLE
// =============================================================================
// Checkout, payment verification and fulfilment status changes.
//
// PAYMENT FLOW:
// - COD:     persist with payment status COD, redeem the coupon right away
// - PREPAID: create the gateway intent first, persist as PENDING; the coupon
//            is redeemed only when the payment is verified
//
// LEARNING NOTE:
// The service only sees the storage and gateway traits, so the whole flow is
// unit tested against in-memory fakes.
// =============================================================================

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::{
    CreateOrderRequest, NewOrder, Order, OrderListResponse, OrderStatus, PaymentMode,
    PaymentStatus, VerifyPaymentRequest,
};
use crate::payment::PaymentGateway;
use crate::store::{normalize_coupon_code, ListScope, OrderStore, Page};

/// How many fresh identifiers to try when an insert hits a duplicate.
const ORDER_ID_ATTEMPTS: usize = 5;

const ORDER_ID_PREFIX: &str = "ORDRH";

// =============================================================================
// HELPERS
// =============================================================================

/// `ORDRH<unix millis><4 random digits>`.
///
/// Not unique on its own; the UNIQUE constraint plus retry makes it so.
pub fn generate_order_id() -> String {
    let millis = Utc::now().timestamp_millis();
    let suffix: u16 = rand::thread_rng().gen_range(1000..=9999);
    format!("{ORDER_ID_PREFIX}{millis}{suffix}")
}

/// Parse `DD-MM-YY` or `DD-MM-YYYY`; two-digit years are read as 20YY.
pub fn parse_delivery_date(raw: &str) -> AppResult<NaiveDate> {
    let invalid = || {
        AppError::BadRequest(format!(
            "Invalid deliveryDate '{raw}', expected DD-MM-YY or DD-MM-YYYY"
        ))
    };

    let parts: Vec<&str> = raw.trim().split('-').collect();
    let [day, month, year] = parts.as_slice() else {
        return Err(invalid());
    };
    if day.len() != 2 || month.len() != 2 || !matches!(year.len(), 2 | 4) {
        return Err(invalid());
    }
    if ![day, month, year].iter().all(|p| p.bytes().all(|b| b.is_ascii_digit())) {
        return Err(invalid());
    }

    let year = if year.len() == 2 {
        format!("20{year}")
    } else {
        year.to_string()
    };

    NaiveDate::parse_from_str(&format!("{day}-{month}-{year}"), "%d-%m-%Y").map_err(|_| invalid())
}

/// Amount in the smallest currency unit (paise for INR).
pub fn to_minor_units(amount: Decimal) -> AppResult<i64> {
    (amount * Decimal::ONE_HUNDRED)
        .round()
        .to_i64()
        .ok_or_else(|| AppError::BadRequest(format!("totalPrice out of range: {amount}")))
}

/// Owners see their own orders; admins see everything.
pub fn ensure_visible_to(order: &Order, user: &AuthUser) -> AppResult<()> {
    if user.is_admin() || order.user_id == user.user_id {
        Ok(())
    } else {
        Err(AppError::Forbidden("Not allowed to view this order".to_string()))
    }
}

/// Largest amount a `NUMERIC(12, 2)` column holds.
const MAX_AMOUNT: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 2);

/// Money must be non-negative, fit the column and carry at most two decimals,
/// so the stored value and the amount charged are the same number.
fn check_amount(field: &str, value: Decimal) -> AppResult<()> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(AppError::BadRequest(format!("{field} must not be negative")));
    }
    if value.normalize().scale() > 2 {
        return Err(AppError::BadRequest(format!(
            "{field} must have at most two decimal places"
        )));
    }
    if value > MAX_AMOUNT {
        return Err(AppError::BadRequest(format!("{field} is too large")));
    }
    Ok(())
}

fn validate_request(req: &CreateOrderRequest) -> AppResult<(PaymentMode, NaiveDate)> {
    let payment_mode = req.payment_mode.parse::<PaymentMode>().map_err(|_| {
        AppError::BadRequest(format!(
            "Invalid paymentMode '{}', expected COD or PREPAID",
            req.payment_mode
        ))
    })?;
    let delivery_date = parse_delivery_date(&req.delivery_date)?;

    if req.cart_items.is_empty() {
        return Err(AppError::BadRequest("cartItems must not be empty".to_string()));
    }
    for item in &req.cart_items {
        if item.quantity < 1 {
            return Err(AppError::BadRequest(format!(
                "Invalid quantity {} for product {}",
                item.quantity, item.product_id
            )));
        }
        check_amount("selling_price", item.selling_price)?;
        check_amount("original_price", item.original_price)?;

        for add_on in &item.add_ons {
            if add_on.quantity < 1 {
                return Err(AppError::BadRequest(format!(
                    "Invalid quantity {} for add-on {}",
                    add_on.quantity, add_on.name
                )));
            }
            check_amount("add-on selling_price", add_on.selling_price)?;
        }
    }

    check_amount("shippingCharges", req.shipping_charges)?;
    check_amount("coupanDiscount", req.coupan_discount)?;
    check_amount("totalShipmentPrice", req.total_shipment_price)?;
    check_amount("totalProductPrice", req.total_product_price)?;
    check_amount("totalPrice", req.total_price)?;

    if payment_mode == PaymentMode::Prepaid && to_minor_units(req.total_price)? < 1 {
        return Err(AppError::BadRequest(
            "totalPrice must be greater than zero for PREPAID orders".to_string(),
        ));
    }

    Ok((payment_mode, delivery_date))
}

// =============================================================================
// SERVICE
// =============================================================================

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl OrderService {
    pub fn new(store: Arc<dyn OrderStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { store, gateway }
    }

    // -------------------------------------------------------------------------
    // CREATE
    // -------------------------------------------------------------------------
    /// Validate and persist a checkout for `user_id`.
    ///
    /// For PREPAID orders the gateway intent is requested before anything is
    /// written, so a gateway failure leaves no order behind. A COD coupon is
    /// redeemed in the insert transaction; prepaid coupons wait for payment
    /// verification.
    pub async fn create_order(&self, user_id: &str, req: CreateOrderRequest) -> AppResult<Order> {
        let (payment_mode, delivery_date) = validate_request(&req)?;
        let coupon = req
            .coupan_applied
            .as_deref()
            .map(normalize_coupon_code)
            .filter(|code| !code.is_empty());

        let order_id = generate_order_id();

        let (payment_status, razorpay_order_id) = match payment_mode {
            PaymentMode::Prepaid => {
                let amount = to_minor_units(req.total_price)?;
                let intent = self.gateway.create_intent(amount, &order_id).await?;
                (PaymentStatus::Pending, Some(intent.id))
            }
            PaymentMode::Cod => (PaymentStatus::Cod, None),
        };

        let mut new_order = NewOrder {
            order_id,
            user_id: user_id.to_string(),
            shipping_address: req.shipping_address,
            billing_address: req.billing_address,
            cart_items: req.cart_items,
            payment_mode,
            payment_status,
            delivery_date,
            delivery_slot: req.delivery_slot,
            shipping_charges: req.shipping_charges,
            coupan_applied: coupon,
            coupan_discount: req.coupan_discount,
            total_shipment_price: req.total_shipment_price,
            total_product_price: req.total_product_price,
            total_price: req.total_price,
            order_note: req.order_note,
            razorpay_order_id,
        };

        let redeem_coupon = payment_mode == PaymentMode::Cod;
        let order = self
            .insert_with_fresh_ids(&mut new_order, redeem_coupon)
            .await?;
        metrics::record_order_created(payment_mode.as_str());
        tracing::info!(
            order_id = %order.order_id,
            user_id = %order.user_id,
            payment_mode = payment_mode.as_str(),
            total_price = %order.total_price,
            "Order created"
        );

        Ok(order)
    }

    async fn insert_with_fresh_ids(
        &self,
        new_order: &mut NewOrder,
        redeem_coupon: bool,
    ) -> AppResult<Order> {
        let mut attempt = 1;
        loop {
            match self.store.insert_order(new_order, redeem_coupon).await {
                Err(AppError::Conflict(_)) if attempt < ORDER_ID_ATTEMPTS => {
                    tracing::warn!(
                        order_id = %new_order.order_id,
                        attempt,
                        "Order id collision, regenerating"
                    );
                    new_order.order_id = generate_order_id();
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    // -------------------------------------------------------------------------
    // PAYMENT VERIFICATION
    // -------------------------------------------------------------------------
    /// Accept a payment callback.
    ///
    /// Safe to call repeatedly: an order that is already PAID is returned
    /// unchanged and its coupon is not redeemed again.
    pub async fn verify_payment(&self, req: VerifyPaymentRequest) -> AppResult<Order> {
        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        let (Some(razorpay_order_id), Some(razorpay_payment_id), Some(signature)) = (
            non_empty(req.razorpay_order_id),
            non_empty(req.razorpay_payment_id),
            non_empty(req.razorpay_signature),
        ) else {
            return Err(AppError::BadRequest(
                "razorpay_order_id, razorpay_payment_id and razorpay_signature are required"
                    .to_string(),
            ));
        };

        let valid = self
            .gateway
            .verify_signature(&razorpay_order_id, &razorpay_payment_id, &signature)
            .await?;
        if !valid {
            metrics::record_payment_verification("rejected");
            tracing::warn!(
                razorpay_order_id = %razorpay_order_id,
                razorpay_payment_id = %razorpay_payment_id,
                "Payment signature mismatch"
            );
            return Err(AppError::InvalidSignature);
        }

        let order = self
            .store
            .find_by_razorpay_order_id(&razorpay_order_id)
            .await?
            .ok_or_else(|| order_not_found(&razorpay_order_id))?;

        if order.payment_status == PaymentStatus::Paid {
            metrics::record_payment_verification("already_paid");
            tracing::info!(order_id = %order.order_id, "Payment already verified");
            return Ok(order);
        }

        match self
            .store
            .settle_payment(&razorpay_order_id, &razorpay_payment_id)
            .await?
        {
            Some(order) => {
                metrics::record_payment_verification("paid");
                tracing::info!(
                    order_id = %order.order_id,
                    razorpay_payment_id = %razorpay_payment_id,
                    "Payment verified"
                );
                Ok(order)
            }
            // A concurrent verification settled it between our read and write
            None => {
                metrics::record_payment_verification("already_paid");
                self.store
                    .find_by_razorpay_order_id(&razorpay_order_id)
                    .await?
                    .ok_or_else(|| order_not_found(&razorpay_order_id))
            }
        }
    }

    // -------------------------------------------------------------------------
    // STATUS
    // -------------------------------------------------------------------------
    pub async fn update_order_status(&self, order_id: &str, raw_status: &str) -> AppResult<Order> {
        let status = raw_status
            .parse::<OrderStatus>()
            .map_err(|_| AppError::BadRequest(format!("Invalid status value: {raw_status}")))?;

        let current = self
            .store
            .find_by_order_id(order_id)
            .await?
            .ok_or_else(|| order_not_found(order_id))?;

        if status.requires_settled_payment() && current.payment_status == PaymentStatus::Pending {
            return Err(AppError::BadRequest(format!(
                "Order {order_id} is awaiting payment and cannot be marked {}",
                status.as_str()
            )));
        }

        let order = self
            .store
            .update_status(order_id, status)
            .await?
            .ok_or_else(|| order_not_found(order_id))?;

        metrics::record_status_update(status.as_str());
        tracing::info!(
            order_id = %order_id,
            from = current.order_status.as_str(),
            to = status.as_str(),
            "Order status updated"
        );

        Ok(order)
    }

    // -------------------------------------------------------------------------
    // READS
    // -------------------------------------------------------------------------
    pub async fn get_order(&self, order_id: &str) -> AppResult<Order> {
        self.store
            .find_by_order_id(order_id)
            .await?
            .ok_or_else(|| order_not_found(order_id))
    }

    pub async fn list_user_orders(&self, user_id: &str, page: Page) -> AppResult<OrderListResponse> {
        self.list(ListScope::User(user_id), page).await
    }

    pub async fn list_all_orders(&self, page: Page) -> AppResult<OrderListResponse> {
        self.list(ListScope::All, page).await
    }

    async fn list(&self, scope: ListScope<'_>, page: Page) -> AppResult<OrderListResponse> {
        let (items, total) = self.store.list_settled(scope, page).await?;
        Ok(OrderListResponse {
            items,
            total,
            page: page.page,
            per_page: page.per_page,
        })
    }
}

fn order_not_found(id: &str) -> AppError {
    AppError::NotFound(format!("Order not found: {id}"))
}
