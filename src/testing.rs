// =============================================================================
// TEST DOUBLES
// =============================================================================
// In-memory OrderStore and a scripted PaymentGateway, used by
// the lifecycle tests. Compiled only for `cargo test`.
// =============================================================================

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{NewOrder, Order, OrderStatus, PaymentStatus};
use crate::payment::{signature_matches, PaymentGateway, PaymentIntent};
use crate::store::{normalize_coupon_code, ListScope, OrderStore, Page};

pub const STUB_SECRET: &str = "stub_key_secret";

// -----------------------------------------------------------------------------
// MEMORY STORE
// -----------------------------------------------------------------------------

#[derive(Debug)]
struct StoredCoupon {
    code: String,
    is_used: bool,
}

#[derive(Default)]
struct StoreState {
    orders: Vec<Order>,
    coupons: HashMap<String, Vec<StoredCoupon>>,
    pending_conflicts: usize,
    failing_redemptions: bool,
    status_writes: usize,
    paid_writes: usize,
    redemptions: usize,
}

impl StoreState {
    fn redeem(&mut self, user_id: &str, code: &str) -> AppResult<bool> {
        if self.failing_redemptions {
            return Err(AppError::Internal("coupon write failed".to_string()));
        }
        let code = normalize_coupon_code(code);
        let coupon = self
            .coupons
            .get_mut(user_id)
            .and_then(|coupons| coupons.iter_mut().find(|c| c.code == code && !c.is_used));

        match coupon {
            Some(coupon) => {
                coupon.is_used = true;
                self.redemptions += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    fn state(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.state.lock().unwrap()
    }

    pub fn add_coupon(&self, user_id: &str, code: &str) {
        self.state()
            .coupons
            .entry(user_id.to_string())
            .or_default()
            .push(StoredCoupon {
                code: normalize_coupon_code(code),
                is_used: false,
            });
    }

    pub fn coupon_used(&self, user_id: &str, code: &str) -> Option<bool> {
        self.state()
            .coupons
            .get(user_id)?
            .iter()
            .find(|c| c.code == code)
            .map(|c| c.is_used)
    }

    /// Make the next `n` inserts fail as if the order id already existed.
    pub fn fail_next_inserts_with_conflict(&self, n: usize) {
        self.state().pending_conflicts = n;
    }

    /// Make every coupon write fail, like a dropped database connection.
    pub fn fail_redemptions(&self) {
        self.state().failing_redemptions = true;
    }

    pub fn order_count(&self) -> usize {
        self.state().orders.len()
    }

    pub fn status_writes(&self) -> usize {
        self.state().status_writes
    }

    pub fn paid_writes(&self) -> usize {
        self.state().paid_writes
    }

    pub fn redemptions(&self) -> usize {
        self.state().redemptions
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert_order(&self, order: &NewOrder, redeem_coupon: bool) -> AppResult<Order> {
        let mut state = self.state();
        if state.pending_conflicts > 0 || state.orders.iter().any(|o| o.order_id == order.order_id) {
            state.pending_conflicts = state.pending_conflicts.saturating_sub(1);
            return Err(AppError::Conflict(format!(
                "Order id already exists: {}",
                order.order_id
            )));
        }

        let now = Utc::now();
        let stored = Order {
            id: Uuid::new_v4(),
            order_id: order.order_id.clone(),
            user_id: order.user_id.clone(),
            shipping_address: order.shipping_address.clone(),
            billing_address: order.billing_address.clone(),
            cart_items: order.cart_items.clone(),
            payment_mode: order.payment_mode,
            payment_status: order.payment_status,
            delivery_date: order.delivery_date,
            delivery_slot: order.delivery_slot.clone(),
            shipping_charges: order.shipping_charges,
            coupan_applied: order.coupan_applied.clone(),
            coupan_discount: order.coupan_discount,
            total_shipment_price: order.total_shipment_price,
            total_product_price: order.total_product_price,
            total_price: order.total_price,
            order_note: order.order_note.clone(),
            order_status: OrderStatus::Pending,
            razorpay_order_id: order.razorpay_order_id.clone(),
            razorpay_payment_id: None,
            created_at: now,
            updated_at: now,
        };

        // Redeem before storing so a failed coupon write leaves nothing behind
        if redeem_coupon {
            if let Some(code) = stored.coupan_applied.as_deref() {
                state.redeem(&stored.user_id, code)?;
            }
        }
        state.orders.push(stored.clone());
        Ok(stored)
    }

    async fn find_by_order_id(&self, order_id: &str) -> AppResult<Option<Order>> {
        Ok(self
            .state()
            .orders
            .iter()
            .find(|o| o.order_id == order_id)
            .cloned())
    }

    async fn find_by_razorpay_order_id(&self, razorpay_order_id: &str) -> AppResult<Option<Order>> {
        Ok(self
            .state()
            .orders
            .iter()
            .find(|o| o.razorpay_order_id.as_deref() == Some(razorpay_order_id))
            .cloned())
    }

    async fn list_settled(&self, scope: ListScope<'_>, page: Page) -> AppResult<(Vec<Order>, i64)> {
        let state = self.state();
        let matching: Vec<Order> = state
            .orders
            .iter()
            .rev()
            .filter(|o| o.payment_status.is_listable())
            .filter(|o| match scope {
                ListScope::All => true,
                ListScope::User(user_id) => o.user_id == user_id,
            })
            .cloned()
            .collect();

        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.per_page as usize)
            .collect();
        Ok((items, total))
    }

    async fn update_status(&self, order_id: &str, status: OrderStatus) -> AppResult<Option<Order>> {
        let mut state = self.state();
        let Some(order) = state.orders.iter_mut().find(|o| o.order_id == order_id) else {
            return Ok(None);
        };
        order.order_status = status;
        order.updated_at = Utc::now();
        let updated = order.clone();
        state.status_writes += 1;
        Ok(Some(updated))
    }

    async fn settle_payment(
        &self,
        razorpay_order_id: &str,
        razorpay_payment_id: &str,
    ) -> AppResult<Option<Order>> {
        let mut state = self.state();
        let Some(index) = state.orders.iter().position(|o| {
            o.razorpay_order_id.as_deref() == Some(razorpay_order_id)
                && o.payment_status == PaymentStatus::Pending
        }) else {
            return Ok(None);
        };

        let mut settled = state.orders[index].clone();
        settled.payment_status = PaymentStatus::Paid;
        settled.razorpay_payment_id = Some(razorpay_payment_id.to_string());
        settled.order_status = OrderStatus::Processing;
        settled.updated_at = Utc::now();

        if let Some(code) = settled.coupan_applied.as_deref() {
            state.redeem(&settled.user_id, code)?;
        }
        state.orders[index] = settled.clone();
        state.paid_writes += 1;
        Ok(Some(settled))
    }
}

// -----------------------------------------------------------------------------
// STUB GATEWAY
// -----------------------------------------------------------------------------

#[derive(Default)]
struct GatewayState {
    intents: Vec<(i64, String)>,
    failure: Option<String>,
    signature_checks: usize,
}

/// Hands out `order_stub_<n>` ids and checks signatures against
/// [`STUB_SECRET`].
#[derive(Default)]
pub struct StubGateway {
    state: Mutex<GatewayState>,
}

impl StubGateway {
    pub fn fail_intents(&self, message: &str) {
        self.state.lock().unwrap().failure = Some(message.to_string());
    }

    /// `(amount_minor, receipt)` for every intent requested so far.
    pub fn intents(&self) -> Vec<(i64, String)> {
        self.state.lock().unwrap().intents.clone()
    }

    pub fn signature_checks(&self) -> usize {
        self.state.lock().unwrap().signature_checks
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_intent(&self, amount_minor: i64, receipt: &str) -> AppResult<PaymentIntent> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = &state.failure {
            return Err(AppError::Upstream(message.clone()));
        }
        state.intents.push((amount_minor, receipt.to_string()));
        Ok(PaymentIntent {
            id: format!("order_stub_{}", state.intents.len()),
        })
    }

    async fn verify_signature(
        &self,
        razorpay_order_id: &str,
        razorpay_payment_id: &str,
        signature: &str,
    ) -> AppResult<bool> {
        self.state.lock().unwrap().signature_checks += 1;
        Ok(signature_matches(
            STUB_SECRET,
            razorpay_order_id,
            razorpay_payment_id,
            signature,
        ))
    }
}
