// =============================================================================
// STORAGE TRAITS
// =============================================================================
// The order lifecycle talks to storage through these traits. `db.rs`
// implements them on PostgreSQL; tests use an in-memory implementation.
// =============================================================================

use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::{NewOrder, Order, OrderStatus};

/// Which orders a listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListScope<'a> {
    All,
    User(&'a str),
}

/// Page window, 1-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i32,
    pub per_page: i32,
}

impl Page {
    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.per_page)
    }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist a new order.
    ///
    /// With `redeem_coupon` set, the applied coupon is redeemed in the same
    /// transaction: either both writes land or neither does.
    ///
    /// Fails with `AppError::Conflict` when `order_id` is already taken.
    async fn insert_order(&self, order: &NewOrder, redeem_coupon: bool) -> AppResult<Order>;

    async fn find_by_order_id(&self, order_id: &str) -> AppResult<Option<Order>>;

    async fn find_by_razorpay_order_id(&self, razorpay_order_id: &str) -> AppResult<Option<Order>>;

    /// Orders whose payment is settled (`COD` or `PAID`), newest first,
    /// together with the total number of such orders in scope.
    async fn list_settled(&self, scope: ListScope<'_>, page: Page) -> AppResult<(Vec<Order>, i64)>;

    /// Set the fulfilment status; `None` when no order matches.
    async fn update_status(&self, order_id: &str, status: OrderStatus) -> AppResult<Option<Order>>;

    /// Move a `PENDING` order to `PAID`.
    ///
    /// Records the payment id, advances the order to `Processing` and redeems
    /// the applied coupon, atomically. Returns `None` if the order was not
    /// `PENDING` any more (another verification won the race).
    async fn settle_payment(
        &self,
        razorpay_order_id: &str,
        razorpay_payment_id: &str,
    ) -> AppResult<Option<Order>>;
}

/// Normalized form used to store and match coupon codes.
pub fn normalize_coupon_code(code: &str) -> String {
    code.trim().to_uppercase()
}
