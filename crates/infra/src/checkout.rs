//! Checkout orchestration.
//!
//! A checkout is one unit of work: decrement every cart line, snapshot the
//! catalog prices, redeem the discount code and insert the order. Any failure
//! rolls back all of it, so stock, discount usage and orders never disagree.
//! Contention reported by the store restarts the whole unit of work with a
//! linear backoff.
//!
//! The configured deadline bounds the work before commit only. Once a commit
//! starts it runs to completion, so a reported timeout always means nothing
//! was written.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use stockroom_auth::{Actor, Permission, authorize};
use stockroom_core::Money;
use stockroom_inventory::MovementKind;
use stockroom_orders::{AppliedDiscount, Cart, CartItem, CustomerDetails, NewOrder, Order, OrderId, OrderItem};

use crate::config::CheckoutConfig;
use crate::discount_engine::redeem_in;
use crate::error::{ServiceError, ServiceResult};
use crate::ledger::{StockChange, decrement_in};
use crate::store::{Store, UnitOfWork, finish};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub customer: CustomerDetails,
    pub items: Vec<CartItem>,
    pub discount_code: Option<String>,
}

#[derive(Clone)]
pub struct CheckoutOrchestrator {
    store: Arc<dyn Store>,
    config: CheckoutConfig,
}

impl CheckoutOrchestrator {
    pub fn new(store: Arc<dyn Store>, config: CheckoutConfig) -> Self {
        Self { store, config }
    }

    /// Turn a cart into a persisted `Processing` order.
    ///
    /// Cart and customer problems are reported before storage is touched.
    /// Stock shortfalls name the first short item in ascending id order.
    #[instrument(
        skip(self, actor, request),
        fields(tenant_id = %actor.tenant_id, user_id = %actor.user_id, lines = request.items.len()),
        err
    )]
    pub async fn checkout(&self, actor: &Actor, request: CheckoutRequest) -> ServiceResult<Order> {
        authorize(actor, &Permission::ORDERS_CHECKOUT)?;
        let cart = Cart::new(&request.items)?;
        request.customer.validate()?;
        let code = request
            .discount_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty());

        let deadline = Instant::now() + self.config.timeout;
        let mut attempt: u32 = 1;
        loop {
            match self.attempt(actor, &cart, &request.customer, code, deadline).await {
                Err(err) if err.is_transient() && attempt < self.config.max_attempts => {
                    warn!(attempt, error = %err, "checkout hit storage contention; retrying");
                    tokio::time::sleep(self.config.retry_backoff * attempt).await;
                    attempt += 1;
                }
                Ok(order) => {
                    info!(
                        order_id = %order.id_typed(),
                        total = order.total().minor_units(),
                        discount = order.discount_amount().minor_units(),
                        attempt,
                        "order placed"
                    );
                    return Ok(order);
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn attempt(
        &self,
        actor: &Actor,
        cart: &Cart,
        customer: &CustomerDetails,
        code: Option<&str>,
        deadline: Instant,
    ) -> ServiceResult<Order> {
        let prepared = tokio::time::timeout_at(deadline, async {
            let mut uow = self.store.begin().await?;
            let outcome = place_in(uow.as_mut(), actor, cart, customer, code, Utc::now()).await;
            Ok::<_, ServiceError>((uow, outcome))
        })
        .await;

        // Timing out drops the open unit of work, which rolls it back.
        let (uow, outcome) = match prepared {
            Ok(prepared) => prepared?,
            Err(_) => {
                warn!(timeout = ?self.config.timeout, "checkout deadline passed before commit");
                return Err(ServiceError::Timeout(self.config.timeout));
            }
        };
        finish(uow, outcome).await
    }
}

async fn place_in(
    uow: &mut dyn UnitOfWork,
    actor: &Actor,
    cart: &Cart,
    customer: &CustomerDetails,
    code: Option<&str>,
    now: DateTime<Utc>,
) -> ServiceResult<Order> {
    let order_id = OrderId::new();
    let mut items = Vec::with_capacity(cart.distinct_items());
    let mut subtotal = Money::ZERO;

    // Ascending id order; see the lock ordering note in `store`.
    for (item_id, quantity) in cart.lines() {
        let change = StockChange {
            item_id,
            quantity,
            kind: MovementKind::StockOut,
            reason: Some("checkout".to_string()),
            related_order_id: Some(order_id.0),
        };
        let (item, _) = decrement_in(uow, actor, &change, now).await?;

        let line = OrderItem {
            inventory_item_id: item_id,
            name: item.name().to_string(),
            sku: item.sku().clone(),
            quantity,
            price_at_purchase: item.unit_price(),
        };
        subtotal = subtotal.checked_add(line.line_total()?)?;
        items.push(line);
    }

    let discount = match code {
        Some(code) => {
            let quote = redeem_in(uow, actor.tenant_id, code, subtotal, cart.item_count(), now).await?;
            Some(AppliedDiscount {
                discount_id: quote.discount.id_typed(),
                amount: quote.discount_amount,
            })
        }
        None => None,
    };

    let order = Order::place(NewOrder {
        tenant_id: actor.tenant_id,
        order_id,
        customer: customer.clone(),
        items,
        discount,
        created_by: actor.user_id,
        occurred_at: now,
    })?;
    uow.insert_order(&order).await?;
    Ok(order)
}
