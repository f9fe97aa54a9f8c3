//! Order reads and status changes.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};

use stockroom_auth::{Actor, Permission, authorize};
use stockroom_inventory::MovementKind;
use stockroom_orders::{Order, OrderId, OrderStatus};

use crate::config::CheckoutConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::ledger::{StockChange, increase_in};
use crate::store::{OrderRepository, Store, finish};

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn Store>,
    restock_on_cancel: bool,
}

impl OrderService {
    pub fn new(store: Arc<dyn Store>, config: &CheckoutConfig) -> Self {
        Self {
            store,
            restock_on_cancel: config.restock_on_cancel,
        }
    }

    pub async fn get(&self, actor: &Actor, order_id: OrderId) -> ServiceResult<Order> {
        authorize(actor, &Permission::ORDERS_READ)?;
        let mut uow = self.store.begin().await?;
        let outcome = uow
            .get_order(actor.tenant_id, order_id)
            .await
            .map_err(ServiceError::from)
            .and_then(|order| order.ok_or_else(|| ServiceError::not_found("order", order_id)));
        finish(uow, outcome).await
    }

    /// Orders of the caller's tenant, newest first.
    pub async fn list(&self, actor: &Actor) -> ServiceResult<Vec<Order>> {
        authorize(actor, &Permission::ORDERS_READ)?;
        let mut uow = self.store.begin().await?;
        let outcome = uow.list_orders(actor.tenant_id).await.map_err(ServiceError::from);
        finish(uow, outcome).await
    }

    /// Move an order along the status graph.
    ///
    /// Refunds need the refund capability on top of the status one. With
    /// restocking enabled, a cancellation returns every line to stock in the
    /// same unit of work as the status change.
    #[instrument(
        skip(self, actor),
        fields(tenant_id = %actor.tenant_id, order_id = %order_id, to = %to),
        err
    )]
    pub async fn update_status(&self, actor: &Actor, order_id: OrderId, to: OrderStatus) -> ServiceResult<Order> {
        authorize(actor, &Permission::ORDERS_UPDATE_STATUS)?;
        if to == OrderStatus::Refunded {
            authorize(actor, &Permission::ORDERS_REFUND)?;
        }

        let mut uow = self.store.begin().await?;
        let outcome = async {
            let mut order = uow
                .lock_order(actor.tenant_id, order_id)
                .await?
                .ok_or_else(|| ServiceError::not_found("order", order_id))?;
            let now = Utc::now();
            let from = order.transition_to(to, now)?;

            if to == OrderStatus::Cancelled && self.restock_on_cancel {
                let mut lines: Vec<_> = order.items().iter().collect();
                lines.sort_by_key(|line| line.inventory_item_id);
                for line in lines {
                    let change = StockChange {
                        item_id: line.inventory_item_id,
                        quantity: line.quantity,
                        kind: MovementKind::Return,
                        reason: Some("order cancelled".to_string()),
                        related_order_id: Some(order_id.0),
                    };
                    increase_in(uow.as_mut(), actor, &change, now).await?;
                }
            }

            uow.update_order_status(&order).await?;
            Ok::<_, ServiceError>((from, order))
        }
        .await;
        let (from, order) = finish(uow, outcome).await?;

        info!(%from, "order status changed");
        Ok(order)
    }
}
