//! Integration tests for the checkout pipeline against the in-memory store.
//!
//! Tests: Actor → service → UnitOfWork → Store
//!
//! Verifies:
//! - A checkout either fully applies (stock, discount usage, order) or not at all
//! - Quantities never go negative and always reconcile with movement history
//! - Concurrent checkouts cannot oversell stock or overspend a discount
//! - Status changes follow the order graph; cancellation restocks

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use stockroom_auth::{Actor, AuthzError, Role};
    use stockroom_core::{Money, TenantId, UserId};
    use stockroom_discounts::{Discount, DiscountCode, DiscountConditions, DiscountError, DiscountId, DiscountRule};
    use stockroom_inventory::{
        InventoryItem, InventoryItemId, InventoryMovement, LowStockPolicy, MovementKind, reconcile,
    };
    use stockroom_orders::{CartItem, CustomerDetails, Order, OrderId, OrderStatus};

    use crate::config::CheckoutConfig;
    use crate::discount_engine::CreateDiscount;
    use crate::error::ServiceError;
    use crate::ledger::{CreateItem, StockChange};
    use crate::store::{DiscountRepository, ItemRepository, OrderRepository, Store, StoreError, UnitOfWork};
    use crate::{CheckoutOrchestrator, CheckoutRequest, DiscountEngine, InMemoryStore, InventoryLedger, OrderService};

    struct Harness {
        ledger: InventoryLedger,
        discounts: DiscountEngine,
        checkout: CheckoutOrchestrator,
        orders: OrderService,
        manager: Actor,
        staff: Actor,
    }

    fn harness_with(store: Arc<dyn Store>, config: CheckoutConfig) -> Harness {
        let tenant_id = TenantId::new();
        Harness {
            ledger: InventoryLedger::new(store.clone()),
            discounts: DiscountEngine::new(store.clone()),
            checkout: CheckoutOrchestrator::new(store.clone(), config.clone()),
            orders: OrderService::new(store, &config),
            manager: Actor::new(UserId::new(), tenant_id, vec![Role::MANAGER]),
            staff: Actor::new(UserId::new(), tenant_id, vec![Role::STAFF]),
        }
    }

    fn harness() -> Harness {
        harness_with(Arc::new(InMemoryStore::new()), fast_config())
    }

    fn fast_config() -> CheckoutConfig {
        CheckoutConfig {
            retry_backoff: Duration::from_millis(1),
            ..CheckoutConfig::default()
        }
    }

    fn customer() -> CustomerDetails {
        CustomerDetails {
            name: "Ada Lovelace".to_string(),
            contact: "+44 20 7946 0000".to_string(),
            address: "12 Analytical Row, London".to_string(),
            email: "ada@example.com".to_string(),
        }
    }

    fn request(lines: &[(InventoryItemId, i64)], code: Option<&str>) -> CheckoutRequest {
        CheckoutRequest {
            customer: customer(),
            items: lines
                .iter()
                .map(|(inventory_item_id, quantity)| CartItem {
                    inventory_item_id: *inventory_item_id,
                    quantity: *quantity,
                })
                .collect(),
            discount_code: code.map(str::to_string),
        }
    }

    impl Harness {
        async fn item(&self, sku: &str, price: u64, quantity: i64, threshold: i64) -> InventoryItem {
            self.ledger
                .create_item(
                    &self.manager,
                    CreateItem {
                        sku: sku.to_string(),
                        name: format!("Item {sku}"),
                        category: "general".to_string(),
                        unit_price: Money::from_minor(price),
                        opening_quantity: quantity,
                        low_stock_threshold: threshold,
                    },
                )
                .await
                .unwrap()
        }

        async fn code(&self, code: &str, rule: DiscountRule, conditions: DiscountConditions) -> Discount {
            self.discounts
                .create(
                    &self.manager,
                    CreateDiscount {
                        code: code.to_string(),
                        description: format!("{code} promotion"),
                        rule,
                        conditions,
                    },
                )
                .await
                .unwrap()
        }

        async fn quantity(&self, item_id: InventoryItemId) -> i64 {
            self.ledger.get_item(&self.manager, item_id).await.unwrap().quantity()
        }

        async fn movements(&self, item_id: InventoryItemId) -> Vec<InventoryMovement> {
            self.ledger.movements_for(&self.manager, item_id).await.unwrap()
        }

        async fn used_count(&self, code: &str) -> u32 {
            let code = DiscountCode::parse(code).unwrap();
            self.discounts
                .list(&self.manager)
                .await
                .unwrap()
                .into_iter()
                .find(|d| d.code() == &code)
                .unwrap()
                .used_count()
        }

        async fn order_count(&self) -> usize {
            self.orders.list(&self.manager).await.unwrap().len()
        }

        async fn assert_reconciles(&self, item_id: InventoryItemId) {
            let quantity = self.quantity(item_id).await;
            let history = self.movements(item_id).await;
            assert_eq!(quantity, reconcile(item_id, history.iter()));
            assert!(quantity >= 0);
        }
    }

    fn summer10() -> (DiscountRule, DiscountConditions) {
        (
            DiscountRule::Percentage { percent: 10 },
            DiscountConditions {
                min_spend: Some(Money::from_minor(10_000)),
                max_usage: Some(1),
                ..DiscountConditions::default()
            },
        )
    }

    #[tokio::test]
    async fn checkout_decrements_stock_and_records_a_stock_out() {
        let h = harness();
        let x = h.item("X-1", 1_000, 5, 2).await;

        let order = h
            .checkout
            .checkout(&h.staff, request(&[(x.id_typed(), 3)], None))
            .await
            .unwrap();

        assert_eq!(order.status(), OrderStatus::Processing);
        assert_eq!(order.subtotal(), Money::from_minor(3_000));
        assert_eq!(order.total(), Money::from_minor(3_000));
        assert_eq!(order.created_by(), h.staff.user_id);
        assert_eq!(h.quantity(x.id_typed()).await, 2);

        let stock_outs: Vec<_> = h
            .movements(x.id_typed())
            .await
            .into_iter()
            .filter(|m| m.kind == MovementKind::StockOut)
            .collect();
        assert_eq!(stock_outs.len(), 1);
        assert_eq!(stock_outs[0].delta, -3);
        assert_eq!(stock_outs[0].related_order_id, Some(order.id_typed().0));
        assert_eq!(stock_outs[0].actor, h.staff.user_id);

        let stored = h.orders.get(&h.staff, order.id_typed()).await.unwrap();
        assert_eq!(stored, order);
    }

    #[tokio::test]
    async fn insufficient_stock_changes_nothing() {
        let h = harness();
        let x = h.item("X-1", 1_000, 2, 0).await;

        let err = h
            .checkout
            .checkout(&h.staff, request(&[(x.id_typed(), 5)], None))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ServiceError::InsufficientStock {
                item_id: x.id_typed(),
                available: 2,
                requested: 5
            }
        );
        assert_eq!(h.quantity(x.id_typed()).await, 2);
        assert_eq!(h.order_count().await, 0);
    }

    #[tokio::test]
    async fn percentage_code_applies_once_then_hits_its_usage_limit() {
        let h = harness();
        let x = h.item("X-1", 5_000, 10, 0).await;
        let y = h.item("Y-1", 10_000, 10, 0).await;
        let (rule, conditions) = summer10();
        h.code("SUMMER10", rule, conditions).await;

        let first = h
            .checkout
            .checkout(&h.staff, request(&[(x.id_typed(), 3)], Some("SUMMER10")))
            .await
            .unwrap();
        assert_eq!(first.subtotal(), Money::from_minor(15_000));
        assert_eq!(first.discount_amount(), Money::from_minor(1_500));
        assert_eq!(first.total(), Money::from_minor(13_500));
        assert_eq!(h.used_count("SUMMER10").await, 1);

        let err = h
            .checkout
            .checkout(&h.staff, request(&[(y.id_typed(), 2)], Some("summer10")))
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::Discount(DiscountError::UsageLimitReached { max_usage: 1 }));

        assert_eq!(h.quantity(y.id_typed()).await, 10);
        assert_eq!(h.used_count("SUMMER10").await, 1);
        assert_eq!(h.order_count().await, 1);
    }

    #[tokio::test]
    async fn fixed_amount_is_capped_at_the_subtotal() {
        let h = harness();
        let x = h.item("X-1", 3_000, 5, 0).await;
        h.code(
            "50OFF",
            DiscountRule::FixedAmount {
                amount: Money::from_minor(5_000),
            },
            DiscountConditions::default(),
        )
        .await;

        let order = h
            .checkout
            .checkout(&h.staff, request(&[(x.id_typed(), 1)], Some("50OFF")))
            .await
            .unwrap();

        assert_eq!(order.subtotal(), Money::from_minor(3_000));
        assert_eq!(order.discount_amount(), Money::from_minor(3_000));
        assert_eq!(order.total(), Money::ZERO);
    }

    #[tokio::test]
    async fn processing_cannot_jump_to_delivered() {
        let h = harness();
        let x = h.item("X-1", 1_000, 5, 0).await;
        let order = h
            .checkout
            .checkout(&h.staff, request(&[(x.id_typed(), 1)], None))
            .await
            .unwrap();

        let err = h
            .orders
            .update_status(&h.staff, order.id_typed(), OrderStatus::Delivered)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ServiceError::IllegalTransition {
                from: OrderStatus::Processing,
                to: OrderStatus::Delivered
            }
        );

        let shipped = h
            .orders
            .update_status(&h.staff, order.id_typed(), OrderStatus::Shipped)
            .await
            .unwrap();
        assert_eq!(shipped.status(), OrderStatus::Shipped);
        let delivered = h
            .orders
            .update_status(&h.staff, order.id_typed(), OrderStatus::Delivered)
            .await
            .unwrap();
        assert_eq!(delivered.status(), OrderStatus::Delivered);
    }

    #[tokio::test]
    async fn one_short_line_rolls_back_every_line() {
        let h = harness();
        let a = h.item("A-1", 1_000, 10, 0).await;
        let b = h.item("B-1", 1_000, 1, 0).await;

        let err = h
            .checkout
            .checkout(&h.staff, request(&[(a.id_typed(), 4), (b.id_typed(), 3)], None))
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::InsufficientStock { item_id, .. } if item_id == b.id_typed()));
        assert_eq!(h.quantity(a.id_typed()).await, 10);
        assert_eq!(h.quantity(b.id_typed()).await, 1);
        assert_eq!(h.movements(a.id_typed()).await.len(), 1);
        assert_eq!(h.order_count().await, 0);
    }

    #[tokio::test]
    async fn discount_rejection_rolls_back_stock() {
        let h = harness();
        let x = h.item("X-1", 1_000, 10, 0).await;
        let (rule, conditions) = summer10();
        h.code("SUMMER10", rule, conditions).await;

        let err = h
            .checkout
            .checkout(&h.staff, request(&[(x.id_typed(), 2)], Some("SUMMER10")))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ServiceError::Discount(DiscountError::MinSpendNotMet {
                min_spend: Money::from_minor(10_000),
                subtotal: Money::from_minor(2_000)
            })
        );

        let err = h
            .checkout
            .checkout(&h.staff, request(&[(x.id_typed(), 2)], Some("NOPE")))
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::Discount(DiscountError::CodeNotFound("NOPE".to_string())));

        assert_eq!(h.quantity(x.id_typed()).await, 10);
        assert_eq!(h.used_count("SUMMER10").await, 0);
        assert_eq!(h.order_count().await, 0);
        h.assert_reconciles(x.id_typed()).await;
    }

    #[tokio::test]
    async fn inactive_and_expired_codes_are_refused() {
        let h = harness();
        let x = h.item("X-1", 1_000, 10, 0).await;
        let stale = h.code("STALE", DiscountRule::Percentage { percent: 5 }, DiscountConditions::default()).await;
        h.discounts.deactivate(&h.manager, stale.id_typed()).await.unwrap();
        h.code(
            "GONE",
            DiscountRule::Percentage { percent: 5 },
            DiscountConditions {
                valid_until: Some(chrono::Utc::now() - chrono::Duration::days(1)),
                ..DiscountConditions::default()
            },
        )
        .await;

        let err = h
            .checkout
            .checkout(&h.staff, request(&[(x.id_typed(), 1)], Some("STALE")))
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::Discount(DiscountError::Inactive));

        let err = h
            .checkout
            .checkout(&h.staff, request(&[(x.id_typed(), 1)], Some("GONE")))
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::Discount(DiscountError::Expired));
        assert_eq!(h.quantity(x.id_typed()).await, 10);
    }

    #[tokio::test]
    async fn invalid_carts_are_rejected_before_storage() {
        let h = harness();
        let x = h.item("X-1", 1_000, 10, 0).await;

        let err = h.checkout.checkout(&h.staff, request(&[], None)).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCart { ref field, .. } if field == "cart"));

        let err = h
            .checkout
            .checkout(&h.staff, request(&[(x.id_typed(), 1), (x.id_typed(), 0)], None))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCart { ref field, .. } if field == "cart[1].quantity"));

        assert_eq!(h.movements(x.id_typed()).await.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_lines_merge_into_one_order_line() {
        let h = harness();
        let x = h.item("X-1", 250, 10, 0).await;

        let order = h
            .checkout
            .checkout(&h.staff, request(&[(x.id_typed(), 1), (x.id_typed(), 2)], None))
            .await
            .unwrap();

        assert_eq!(order.items().len(), 1);
        assert_eq!(order.items()[0].quantity, 3);
        assert_eq!(order.subtotal(), Money::from_minor(750));
        assert_eq!(h.quantity(x.id_typed()).await, 7);
    }

    #[tokio::test]
    async fn price_at_purchase_survives_a_reprice() {
        let h = harness();
        let x = h.item("X-1", 1_000, 10, 0).await;
        let order = h
            .checkout
            .checkout(&h.staff, request(&[(x.id_typed(), 2)], None))
            .await
            .unwrap();

        h.ledger
            .reprice(&h.manager, x.id_typed(), Money::from_minor(9_999))
            .await
            .unwrap();

        let stored = h.orders.get(&h.manager, order.id_typed()).await.unwrap();
        assert_eq!(stored.items()[0].price_at_purchase, Money::from_minor(1_000));
        assert_eq!(stored.total(), Money::from_minor(2_000));

        let next = h
            .checkout
            .checkout(&h.staff, request(&[(x.id_typed(), 1)], None))
            .await
            .unwrap();
        assert_eq!(next.items()[0].price_at_purchase, Money::from_minor(9_999));
    }

    #[tokio::test]
    async fn cancellation_restocks_with_return_movements() {
        let h = harness();
        let x = h.item("X-1", 1_000, 5, 0).await;
        let order = h
            .checkout
            .checkout(&h.staff, request(&[(x.id_typed(), 3)], None))
            .await
            .unwrap();

        let cancelled = h
            .orders
            .update_status(&h.staff, order.id_typed(), OrderStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(cancelled.status(), OrderStatus::Cancelled);
        assert_eq!(h.quantity(x.id_typed()).await, 5);

        let returns: Vec<_> = h
            .movements(x.id_typed())
            .await
            .into_iter()
            .filter(|m| m.kind == MovementKind::Return)
            .collect();
        assert_eq!(returns.len(), 1);
        assert_eq!(returns[0].delta, 3);
        assert_eq!(returns[0].related_order_id, Some(order.id_typed().0));

        let err = h
            .orders
            .update_status(&h.manager, order.id_typed(), OrderStatus::Refunded)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::IllegalTransition { .. }));
        h.assert_reconciles(x.id_typed()).await;
    }

    #[tokio::test]
    async fn cancellation_can_leave_stock_alone() {
        let config = CheckoutConfig {
            restock_on_cancel: false,
            ..fast_config()
        };
        let h = harness_with(Arc::new(InMemoryStore::new()), config);
        let x = h.item("X-1", 1_000, 5, 0).await;
        let order = h
            .checkout
            .checkout(&h.staff, request(&[(x.id_typed(), 3)], None))
            .await
            .unwrap();

        h.orders
            .update_status(&h.staff, order.id_typed(), OrderStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(h.quantity(x.id_typed()).await, 2);
    }

    #[tokio::test]
    async fn refunds_need_a_manager_and_never_restock() {
        let h = harness();
        let x = h.item("X-1", 1_000, 5, 0).await;
        let order = h
            .checkout
            .checkout(&h.staff, request(&[(x.id_typed(), 2)], None))
            .await
            .unwrap();

        let err = h
            .orders
            .update_status(&h.staff, order.id_typed(), OrderStatus::Refunded)
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::Unauthorized(AuthzError::Forbidden("orders.refund".to_string())));

        let refunded = h
            .orders
            .update_status(&h.manager, order.id_typed(), OrderStatus::Refunded)
            .await
            .unwrap();
        assert_eq!(refunded.status(), OrderStatus::Refunded);
        assert_eq!(h.quantity(x.id_typed()).await, 3);
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let h = harness();
        let err = h
            .orders
            .update_status(&h.staff, OrderId::new(), OrderStatus::Shipped)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { entity: "order", .. }));
    }

    #[tokio::test]
    async fn tenants_cannot_check_out_each_others_stock() {
        let h = harness();
        let x = h.item("X-1", 1_000, 5, 0).await;
        let outsider = Actor::new(UserId::new(), TenantId::new(), vec![Role::STAFF]);

        let err = h
            .checkout
            .checkout(&outsider, request(&[(x.id_typed(), 1)], None))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { entity: "inventory item", .. }));
        assert_eq!(h.quantity(x.id_typed()).await, 5);
    }

    #[tokio::test]
    async fn ledger_history_reconciles_after_mixed_activity() {
        let h = harness();
        let x = h.item("X-1", 1_000, 10, 0).await;

        let order = h
            .checkout
            .checkout(&h.staff, request(&[(x.id_typed(), 4)], None))
            .await
            .unwrap();
        h.ledger
            .increase_stock(
                &h.manager,
                StockChange {
                    item_id: x.id_typed(),
                    quantity: 5,
                    kind: MovementKind::StockIn,
                    reason: Some("delivery".to_string()),
                    related_order_id: None,
                },
            )
            .await
            .unwrap();
        h.ledger
            .adjust(&h.manager, x.id_typed(), -2, MovementKind::Damage, Some("crushed".to_string()))
            .await
            .unwrap();
        h.ledger
            .decrement_stock(
                &h.manager,
                StockChange {
                    item_id: x.id_typed(),
                    quantity: 1,
                    kind: MovementKind::StockOut,
                    reason: Some("sample".to_string()),
                    related_order_id: None,
                },
            )
            .await
            .unwrap();
        h.orders
            .update_status(&h.staff, order.id_typed(), OrderStatus::Cancelled)
            .await
            .unwrap();

        assert_eq!(h.quantity(x.id_typed()).await, 12);
        assert_eq!(h.movements(x.id_typed()).await.len(), 6);
        h.assert_reconciles(x.id_typed()).await;
    }

    #[tokio::test]
    async fn adjustments_cannot_drive_stock_negative() {
        let h = harness();
        let x = h.item("X-1", 1_000, 3, 0).await;

        let err = h
            .ledger
            .adjust(&h.manager, x.id_typed(), -4, MovementKind::Adjustment, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientStock { available: 3, requested: 4, .. }));

        let err = h
            .ledger
            .adjust(&h.manager, x.id_typed(), 2, MovementKind::Damage, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation { ref field, .. } if field == "delta"));
        assert_eq!(h.quantity(x.id_typed()).await, 3);
    }

    #[tokio::test]
    async fn stock_moves_reject_kinds_pointing_the_other_way() {
        let h = harness();
        let x = h.item("X-1", 1_000, 3, 0).await;
        let change = |kind| StockChange {
            item_id: x.id_typed(),
            quantity: 1,
            kind,
            reason: None,
            related_order_id: None,
        };

        for kind in [MovementKind::StockIn, MovementKind::Return, MovementKind::Adjustment] {
            let err = h.ledger.decrement_stock(&h.manager, change(kind)).await.unwrap_err();
            assert!(matches!(err, ServiceError::Validation { ref field, .. } if field == "kind"));
        }
        for kind in [MovementKind::StockOut, MovementKind::Damage, MovementKind::Adjustment] {
            let err = h.ledger.increase_stock(&h.manager, change(kind)).await.unwrap_err();
            assert!(matches!(err, ServiceError::Validation { ref field, .. } if field == "kind"));
        }

        h.ledger
            .decrement_stock(&h.manager, change(MovementKind::Damage))
            .await
            .unwrap();
        h.ledger
            .increase_stock(&h.manager, change(MovementKind::Return))
            .await
            .unwrap();

        assert_eq!(h.quantity(x.id_typed()).await, 3);
        assert_eq!(h.movements(x.id_typed()).await.len(), 3);
        h.assert_reconciles(x.id_typed()).await;
    }

    #[tokio::test]
    async fn low_stock_uses_item_or_fixed_thresholds() {
        let h = harness();
        let low = h.item("LOW-1", 100, 2, 2).await;
        let ok = h.item("OK-1", 100, 10, 2).await;

        let by_item: Vec<_> = h
            .ledger
            .low_stock(&h.staff, LowStockPolicy::ItemThreshold)
            .await
            .unwrap()
            .map(|item| item.id_typed())
            .collect();
        assert_eq!(by_item, vec![low.id_typed()]);

        let fixed: Vec<_> = h
            .ledger
            .low_stock(&h.staff, LowStockPolicy::Fixed(10))
            .await
            .unwrap()
            .map(|item| item.id_typed())
            .collect();
        assert_eq!(fixed, vec![low.id_typed(), ok.id_typed()]);
    }

    #[tokio::test]
    async fn catalog_rules_hold() {
        let h = harness();
        h.item("X-1", 1_000, 0, 0).await;

        let err = h
            .ledger
            .create_item(
                &h.manager,
                CreateItem {
                    sku: "x-1".to_string(),
                    name: "Again".to_string(),
                    category: "general".to_string(),
                    unit_price: Money::from_minor(1),
                    opening_quantity: 0,
                    low_stock_threshold: 0,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Duplicate(_)));

        let err = h
            .ledger
            .create_item(
                &h.staff,
                CreateItem {
                    sku: "Y-1".to_string(),
                    name: "Staff item".to_string(),
                    category: "general".to_string(),
                    unit_price: Money::from_minor(1),
                    opening_quantity: 0,
                    low_stock_threshold: 0,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn validate_previews_without_spending_a_use() {
        let h = harness();
        let (rule, conditions) = summer10();
        h.code("SUMMER10", rule, conditions).await;

        for _ in 0..3 {
            let quote = h
                .discounts
                .validate(&h.staff, "summer10", Money::from_minor(15_000), 3)
                .await
                .unwrap();
            assert_eq!(quote.discount_amount, Money::from_minor(1_500));
        }
        assert_eq!(h.used_count("SUMMER10").await, 0);

        let err = h
            .discounts
            .validate(&h.staff, "SUMMER10", Money::from_minor(5_000), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Discount(DiscountError::MinSpendNotMet { .. })));
    }

    #[tokio::test]
    async fn reserve_use_stops_at_the_limit() {
        let h = harness();
        let (rule, conditions) = summer10();
        let discount = h.code("SUMMER10", rule, conditions).await;

        assert!(h.discounts.reserve_use(&h.manager, discount.id_typed()).await.unwrap());
        assert!(!h.discounts.reserve_use(&h.manager, discount.id_typed()).await.unwrap());
        assert_eq!(h.used_count("SUMMER10").await, 1);

        let err = h.discounts.reserve_use(&h.manager, DiscountId::new()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { entity: "discount", .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_checkouts_for_the_last_unit_have_one_winner() {
        let h = harness();
        let x = h.item("LAST-1", 1_000, 1, 0).await;

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let checkout = h.checkout.clone();
            let staff = h.staff.clone();
            let item_id = x.id_typed();
            tasks.push(tokio::spawn(async move {
                checkout.checkout(&staff, request(&[(item_id, 1)], None)).await
            }));
        }

        let mut placed = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => placed += 1,
                Err(ServiceError::InsufficientStock { available: 0, requested: 1, .. }) => {}
                Err(other) => panic!("unexpected checkout error: {other}"),
            }
        }

        assert_eq!(placed, 1);
        assert_eq!(h.quantity(x.id_typed()).await, 0);
        assert_eq!(h.order_count().await, 1);
        h.assert_reconciles(x.id_typed()).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_checkouts_for_a_single_use_code_have_one_winner() {
        let h = harness();
        let x = h.item("X-1", 20_000, 50, 0).await;
        let (rule, conditions) = summer10();
        h.code("SUMMER10", rule, conditions).await;

        let mut tasks = Vec::new();
        for _ in 0..12 {
            let checkout = h.checkout.clone();
            let staff = h.staff.clone();
            let item_id = x.id_typed();
            tasks.push(tokio::spawn(async move {
                checkout
                    .checkout(&staff, request(&[(item_id, 1)], Some("SUMMER10")))
                    .await
            }));
        }

        let mut placed = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(order) => {
                    placed += 1;
                    assert_eq!(order.discount_amount(), Money::from_minor(2_000));
                }
                Err(ServiceError::Discount(DiscountError::UsageLimitReached { max_usage: 1 })) => {}
                Err(other) => panic!("unexpected checkout error: {other}"),
            }
        }

        assert_eq!(placed, 1);
        assert_eq!(h.used_count("SUMMER10").await, 1);
        assert_eq!(h.quantity(x.id_typed()).await, 49);
        assert_eq!(h.order_count().await, 1);
    }

    /// Injected misbehaviour for [`FaultyStore`].
    #[derive(Debug, Clone, Copy, Default)]
    struct Faults {
        /// Commits that fail with a serialization conflict before succeeding.
        conflicts: u32,
        /// Delay before a commit is applied.
        commit_delay: Duration,
        /// Delay after a commit is applied, before the caller hears back.
        ack_delay: Duration,
        /// Delay on every item row lock.
        lock_delay: Duration,
    }

    /// Wraps the in-memory store to inject contention and latency.
    struct FaultyStore {
        inner: InMemoryStore,
        conflicts_left: Arc<AtomicU32>,
        commits: Arc<AtomicU32>,
        faults: Faults,
    }

    impl FaultyStore {
        fn over(inner: InMemoryStore, faults: Faults) -> Self {
            Self {
                inner,
                conflicts_left: Arc::new(AtomicU32::new(faults.conflicts)),
                commits: Arc::new(AtomicU32::new(0)),
                faults,
            }
        }
    }

    #[async_trait]
    impl Store for FaultyStore {
        async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
            Ok(Box::new(FaultyUnitOfWork {
                inner: self.inner.begin().await?,
                conflicts_left: self.conflicts_left.clone(),
                commits: self.commits.clone(),
                faults: self.faults,
            }))
        }
    }

    struct FaultyUnitOfWork {
        inner: Box<dyn UnitOfWork>,
        conflicts_left: Arc<AtomicU32>,
        commits: Arc<AtomicU32>,
        faults: Faults,
    }

    #[async_trait]
    impl ItemRepository for FaultyUnitOfWork {
        async fn insert_item(&mut self, item: &InventoryItem) -> Result<(), StoreError> {
            self.inner.insert_item(item).await
        }
        async fn get_item(&mut self, t: TenantId, id: InventoryItemId) -> Result<Option<InventoryItem>, StoreError> {
            self.inner.get_item(t, id).await
        }
        async fn lock_item(&mut self, t: TenantId, id: InventoryItemId) -> Result<Option<InventoryItem>, StoreError> {
            tokio::time::sleep(self.faults.lock_delay).await;
            self.inner.lock_item(t, id).await
        }
        async fn list_items(&mut self, t: TenantId) -> Result<Vec<InventoryItem>, StoreError> {
            self.inner.list_items(t).await
        }
        async fn update_item(&mut self, item: &InventoryItem) -> Result<(), StoreError> {
            self.inner.update_item(item).await
        }
        async fn append_movement(&mut self, movement: &InventoryMovement) -> Result<(), StoreError> {
            self.inner.append_movement(movement).await
        }
        async fn movements_for(&mut self, t: TenantId, id: InventoryItemId) -> Result<Vec<InventoryMovement>, StoreError> {
            self.inner.movements_for(t, id).await
        }
    }

    #[async_trait]
    impl DiscountRepository for FaultyUnitOfWork {
        async fn insert_discount(&mut self, discount: &Discount) -> Result<(), StoreError> {
            self.inner.insert_discount(discount).await
        }
        async fn find_discount_by_code(&mut self, t: TenantId, code: &DiscountCode) -> Result<Option<Discount>, StoreError> {
            self.inner.find_discount_by_code(t, code).await
        }
        async fn lock_discount(&mut self, t: TenantId, id: DiscountId) -> Result<Option<Discount>, StoreError> {
            self.inner.lock_discount(t, id).await
        }
        async fn list_discounts(&mut self, t: TenantId) -> Result<Vec<Discount>, StoreError> {
            self.inner.list_discounts(t).await
        }
        async fn update_discount(&mut self, discount: &Discount) -> Result<(), StoreError> {
            self.inner.update_discount(discount).await
        }
    }

    #[async_trait]
    impl OrderRepository for FaultyUnitOfWork {
        async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
            self.inner.insert_order(order).await
        }
        async fn get_order(&mut self, t: TenantId, id: OrderId) -> Result<Option<Order>, StoreError> {
            self.inner.get_order(t, id).await
        }
        async fn lock_order(&mut self, t: TenantId, id: OrderId) -> Result<Option<Order>, StoreError> {
            self.inner.lock_order(t, id).await
        }
        async fn list_orders(&mut self, t: TenantId) -> Result<Vec<Order>, StoreError> {
            self.inner.list_orders(t).await
        }
        async fn update_order_status(&mut self, order: &Order) -> Result<(), StoreError> {
            self.inner.update_order_status(order).await
        }
    }

    #[async_trait]
    impl UnitOfWork for FaultyUnitOfWork {
        async fn commit(&mut self) -> Result<(), StoreError> {
            tokio::time::sleep(self.faults.commit_delay).await;
            let injected = self
                .conflicts_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if injected {
                self.inner.rollback().await?;
                return Err(StoreError::Conflict("injected serialization failure".to_string()));
            }
            self.inner.commit().await?;
            self.commits.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.faults.ack_delay).await;
            Ok(())
        }

        async fn rollback(&mut self) -> Result<(), StoreError> {
            self.inner.rollback().await
        }
    }

    async fn seeded_faulty_store(faults: Faults, config: CheckoutConfig) -> (Arc<FaultyStore>, Harness, InventoryItem) {
        let inner = InMemoryStore::new();
        let seeding = harness_with(Arc::new(inner.clone()), fast_config());
        let x = seeding.item("X-1", 1_000, 5, 0).await;
        // Faults apply only after seeding.
        let faulty = Arc::new(FaultyStore::over(inner, faults));
        let h = Harness {
            manager: seeding.manager.clone(),
            staff: seeding.staff.clone(),
            ..harness_with(faulty.clone(), config)
        };
        (faulty, h, x)
    }

    #[tokio::test]
    async fn contention_is_retried_transparently() {
        let (store, h, x) = seeded_faulty_store(
            Faults {
                conflicts: 2,
                ..Faults::default()
            },
            fast_config(),
        )
        .await;

        let order = h
            .checkout
            .checkout(&h.staff, request(&[(x.id_typed(), 2)], None))
            .await
            .unwrap();

        assert_eq!(order.total(), Money::from_minor(2_000));
        assert_eq!(store.conflicts_left.load(Ordering::SeqCst), 0);
        assert_eq!(h.quantity(x.id_typed()).await, 3);
        assert_eq!(h.order_count().await, 1);
        h.assert_reconciles(x.id_typed()).await;
    }

    #[tokio::test]
    async fn exhausted_retries_surface_a_conflict_and_change_nothing() {
        let (_store, h, x) = seeded_faulty_store(
            Faults {
                conflicts: 3,
                ..Faults::default()
            },
            fast_config(),
        )
        .await;

        let err = h
            .checkout
            .checkout(&h.staff, request(&[(x.id_typed(), 2)], None))
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Conflict(_)));
        assert_eq!(h.quantity(x.id_typed()).await, 5);
        assert_eq!(h.order_count().await, 0);
    }

    #[tokio::test]
    async fn abandoned_checkout_leaves_no_trace() {
        let (store, h, x) = seeded_faulty_store(
            Faults {
                commit_delay: Duration::from_millis(200),
                ..Faults::default()
            },
            fast_config(),
        )
        .await;

        let outcome = tokio::time::timeout(
            Duration::from_millis(20),
            h.checkout.checkout(&h.staff, request(&[(x.id_typed(), 2)], None)),
        )
        .await;
        assert!(outcome.is_err());
        assert_eq!(store.commits.load(Ordering::SeqCst), 0);

        let inner = Harness {
            manager: h.manager.clone(),
            staff: h.staff.clone(),
            ..harness_with(Arc::new(store.inner.clone()), fast_config())
        };
        assert_eq!(inner.quantity(x.id_typed()).await, 5);
        assert_eq!(inner.order_count().await, 0);
    }

    #[tokio::test]
    async fn slow_commit_ack_still_reports_the_placed_order() {
        let config = CheckoutConfig {
            timeout: Duration::from_millis(20),
            ..fast_config()
        };
        let (store, h, x) = seeded_faulty_store(
            Faults {
                ack_delay: Duration::from_millis(200),
                ..Faults::default()
            },
            config,
        )
        .await;

        let order = h
            .checkout
            .checkout(&h.staff, request(&[(x.id_typed(), 3)], None))
            .await
            .unwrap();

        assert_eq!(store.commits.load(Ordering::SeqCst), 1);
        let stored = h.orders.get(&h.staff, order.id_typed()).await.unwrap();
        assert_eq!(stored.total(), Money::from_minor(3_000));
        assert_eq!(h.quantity(x.id_typed()).await, 2);
        assert_eq!(h.order_count().await, 1);
    }

    #[tokio::test]
    async fn deadline_before_commit_times_out_and_writes_nothing() {
        let config = CheckoutConfig {
            timeout: Duration::from_millis(20),
            ..fast_config()
        };
        let (store, h, x) = seeded_faulty_store(
            Faults {
                lock_delay: Duration::from_millis(200),
                ..Faults::default()
            },
            config,
        )
        .await;

        let err = h
            .checkout
            .checkout(&h.staff, request(&[(x.id_typed(), 3)], None))
            .await
            .unwrap_err();

        assert_eq!(err, ServiceError::Timeout(Duration::from_millis(20)));
        assert_eq!(store.commits.load(Ordering::SeqCst), 0);
        assert_eq!(h.quantity(x.id_typed()).await, 5);
        assert_eq!(h.order_count().await, 0);
    }
}
