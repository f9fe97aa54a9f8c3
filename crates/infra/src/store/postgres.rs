//! Postgres-backed store.
//!
//! Each unit of work is one database transaction at the default READ
//! COMMITTED isolation. Rows that a unit of work is about to change are read
//! with `SELECT ... FOR UPDATE`, which serializes competing checkouts on the
//! same item or discount row without lost updates.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (serialization failure) | `40001` | `Conflict` |
//! | Database (deadlock detected) | `40P01` | `Conflict` |
//! | Database (lock not available) | `55P03` | `Conflict` |
//! | Database (unique violation) | `23505` | `Duplicate` |
//! | Database (other, including `23514` check violations) | Any other | `Backend` |
//! | PoolClosed / other | N/A | `Backend` |
//!
//! Row decode failures surface as `Corrupt`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use stockroom_core::{Entity, EntityId, Money, TenantId, UserId};
use stockroom_discounts::{Discount, DiscountCode, DiscountConditions, DiscountId, DiscountRule, DiscountSnapshot};
use stockroom_inventory::{InventoryItem, InventoryItemId, InventoryMovement, ItemSnapshot, MovementId, MovementKind, Sku};
use stockroom_orders::{CustomerDetails, Order, OrderId, OrderItem, OrderSnapshot, OrderStatus};

use super::{DiscountRepository, ItemRepository, OrderRepository, Store, StoreError, UnitOfWork};

/// Idempotent schema bootstrap, applied in order by [`PostgresStore::migrate`].
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS inventory_items (
        tenant_id           UUID        NOT NULL,
        id                  UUID        NOT NULL,
        sku                 TEXT        NOT NULL,
        name                TEXT        NOT NULL,
        category            TEXT        NOT NULL,
        unit_price          BIGINT      NOT NULL CHECK (unit_price >= 0),
        quantity            BIGINT      NOT NULL CHECK (quantity >= 0),
        low_stock_threshold BIGINT      NOT NULL CHECK (low_stock_threshold >= 0),
        created_at          TIMESTAMPTZ NOT NULL,
        updated_at          TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (tenant_id, id),
        UNIQUE (tenant_id, sku)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS inventory_movements (
        seq              BIGSERIAL   PRIMARY KEY,
        id               UUID        NOT NULL UNIQUE,
        tenant_id        UUID        NOT NULL,
        item_id          UUID        NOT NULL,
        delta            BIGINT      NOT NULL CHECK (delta <> 0),
        kind             TEXT        NOT NULL,
        related_order_id UUID        NULL,
        actor_id         UUID        NOT NULL,
        reason           TEXT        NULL,
        occurred_at      TIMESTAMPTZ NOT NULL,
        FOREIGN KEY (tenant_id, item_id) REFERENCES inventory_items (tenant_id, id)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS inventory_movements_item_idx
        ON inventory_movements (tenant_id, item_id, seq)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS discounts (
        tenant_id   UUID        NOT NULL,
        id          UUID        NOT NULL,
        code        TEXT        NOT NULL,
        description TEXT        NOT NULL,
        rule_type   TEXT        NOT NULL CHECK (rule_type IN ('percentage', 'fixed_amount')),
        rule_value  BIGINT      NOT NULL CHECK (rule_value > 0),
        min_spend   BIGINT      NULL,
        min_items   BIGINT      NULL,
        max_usage   BIGINT      NULL CHECK (max_usage IS NULL OR max_usage > 0),
        valid_until TIMESTAMPTZ NULL,
        active      BOOLEAN     NOT NULL,
        used_count  BIGINT      NOT NULL CHECK (used_count >= 0),
        created_at  TIMESTAMPTZ NOT NULL,
        updated_at  TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (tenant_id, id),
        UNIQUE (tenant_id, code),
        CHECK (max_usage IS NULL OR used_count <= max_usage)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS orders (
        tenant_id        UUID        NOT NULL,
        id               UUID        NOT NULL,
        customer_name    TEXT        NOT NULL,
        customer_contact TEXT        NOT NULL,
        customer_address TEXT        NOT NULL,
        customer_email   TEXT        NOT NULL,
        subtotal         BIGINT      NOT NULL CHECK (subtotal >= 0),
        discount_id      UUID        NULL,
        discount_amount  BIGINT      NOT NULL CHECK (discount_amount >= 0 AND discount_amount <= subtotal),
        total            BIGINT      NOT NULL CHECK (total = subtotal - discount_amount),
        status           TEXT        NOT NULL
            CHECK (status IN ('Processing', 'Shipped', 'Delivered', 'Cancelled', 'Refunded')),
        created_by       UUID        NOT NULL,
        created_at       TIMESTAMPTZ NOT NULL,
        updated_at       TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (tenant_id, id)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS orders_tenant_created_idx
        ON orders (tenant_id, created_at DESC)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS order_items (
        tenant_id         UUID    NOT NULL,
        order_id          UUID    NOT NULL,
        line_no           INTEGER NOT NULL,
        inventory_item_id UUID    NOT NULL,
        name              TEXT    NOT NULL,
        sku               TEXT    NOT NULL,
        quantity          BIGINT  NOT NULL CHECK (quantity > 0),
        price_at_purchase BIGINT  NOT NULL CHECK (price_at_purchase >= 0),
        PRIMARY KEY (tenant_id, order_id, line_no),
        FOREIGN KEY (tenant_id, order_id) REFERENCES orders (tenant_id, id)
    )
    "#,
];

const ITEM_COLUMNS: &str =
    "id, tenant_id, sku, name, category, unit_price, quantity, low_stock_threshold, created_at, updated_at";

const DISCOUNT_COLUMNS: &str = "id, tenant_id, code, description, rule_type, rule_value, min_spend, min_items, \
     max_usage, valid_until, active, used_count, created_at, updated_at";

const ORDER_COLUMNS: &str = "id, tenant_id, customer_name, customer_contact, customer_address, customer_email, \
     subtotal, discount_id, discount_amount, total, status, created_by, created_at, updated_at";

/// Postgres-backed store. Cheap to clone; shares the connection pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("migrate", e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin", e))?;
        Ok(Box::new(PostgresUnitOfWork { tx: Some(tx) }))
    }
}

/// One open transaction. Dropping it without commit rolls back.
pub struct PostgresUnitOfWork {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PostgresUnitOfWork {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, StoreError> {
        self.tx.as_mut().ok_or(StoreError::Closed)
    }

    async fn fetch_item(
        &mut self,
        operation: &'static str,
        tenant_id: TenantId,
        item_id: InventoryItemId,
        for_update: bool,
    ) -> Result<Option<InventoryItem>, StoreError> {
        let lock = if for_update { " FOR UPDATE" } else { "" };
        let sql = format!("SELECT {ITEM_COLUMNS} FROM inventory_items WHERE tenant_id = $1 AND id = $2{lock}");
        let tx = self.tx()?;
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(item_id.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        row.as_ref().map(item_from_row).transpose()
    }

    async fn fetch_discount(
        &mut self,
        operation: &'static str,
        tenant_id: TenantId,
        discount_id: DiscountId,
        for_update: bool,
    ) -> Result<Option<Discount>, StoreError> {
        let lock = if for_update { " FOR UPDATE" } else { "" };
        let sql = format!("SELECT {DISCOUNT_COLUMNS} FROM discounts WHERE tenant_id = $1 AND id = $2{lock}");
        let tx = self.tx()?;
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(discount_id.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        row.as_ref().map(discount_from_row).transpose()
    }

    async fn fetch_order(
        &mut self,
        operation: &'static str,
        tenant_id: TenantId,
        order_id: OrderId,
        for_update: bool,
    ) -> Result<Option<Order>, StoreError> {
        let lock = if for_update { " FOR UPDATE" } else { "" };
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE tenant_id = $1 AND id = $2{lock}");
        let tx = self.tx()?;
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(order_id.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut lines = self.fetch_order_items(tenant_id, &[*order_id.as_uuid()]).await?;
        let items = lines.remove(order_id.as_uuid()).unwrap_or_default();
        order_from_row(&row, items).map(Some)
    }

    /// Line items for a batch of orders, keyed by order id, in line order.
    async fn fetch_order_items(
        &mut self,
        tenant_id: TenantId,
        order_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<OrderItem>>, StoreError> {
        let tx = self.tx()?;
        let rows = sqlx::query(
            r#"
            SELECT order_id, inventory_item_id, name, sku, quantity, price_at_purchase
            FROM order_items
            WHERE tenant_id = $1 AND order_id = ANY($2)
            ORDER BY order_id, line_no ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(order_ids)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("fetch_order_items", e))?;

        let mut by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in &rows {
            let order_id: Uuid = row.try_get("order_id").map_err(corrupt)?;
            by_order.entry(order_id).or_default().push(order_item_from_row(row)?);
        }
        Ok(by_order)
    }
}

#[async_trait]
impl ItemRepository for PostgresUnitOfWork {
    #[instrument(skip(self, item), fields(operation = "insert_item", item_id = %item.id_typed()), err)]
    async fn insert_item(&mut self, item: &InventoryItem) -> Result<(), StoreError> {
        let tx = self.tx()?;
        sqlx::query(
            r#"
            INSERT INTO inventory_items
                (id, tenant_id, sku, name, category, unit_price, quantity, low_stock_threshold, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(item.id_typed().as_uuid())
        .bind(item.tenant_id().as_uuid())
        .bind(item.sku().as_str())
        .bind(item.name())
        .bind(item.category())
        .bind(money_to_sql(item.unit_price())?)
        .bind(item.quantity())
        .bind(item.low_stock_threshold())
        .bind(item.created_at())
        .bind(item.updated_at())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_item", e))?;
        Ok(())
    }

    async fn get_item(
        &mut self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
    ) -> Result<Option<InventoryItem>, StoreError> {
        self.fetch_item("get_item", tenant_id, item_id, false).await
    }

    #[instrument(skip(self), fields(operation = "lock_item", tenant_id = %tenant_id, item_id = %item_id), err)]
    async fn lock_item(
        &mut self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
    ) -> Result<Option<InventoryItem>, StoreError> {
        self.fetch_item("lock_item", tenant_id, item_id, true).await
    }

    async fn list_items(&mut self, tenant_id: TenantId) -> Result<Vec<InventoryItem>, StoreError> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM inventory_items WHERE tenant_id = $1 ORDER BY sku ASC");
        let tx = self.tx()?;
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .fetch_all(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("list_items", e))?;
        rows.iter().map(item_from_row).collect()
    }

    async fn update_item(&mut self, item: &InventoryItem) -> Result<(), StoreError> {
        let tx = self.tx()?;
        let result = sqlx::query(
            r#"
            UPDATE inventory_items
            SET quantity = $3, unit_price = $4, updated_at = $5
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(item.tenant_id().as_uuid())
        .bind(item.id_typed().as_uuid())
        .bind(item.quantity())
        .bind(money_to_sql(item.unit_price())?)
        .bind(item.updated_at())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("update_item", e))?;
        expect_one_row("update_item", result.rows_affected())
    }

    async fn append_movement(&mut self, movement: &InventoryMovement) -> Result<(), StoreError> {
        let tx = self.tx()?;
        sqlx::query(
            r#"
            INSERT INTO inventory_movements
                (id, tenant_id, item_id, delta, kind, related_order_id, actor_id, reason, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(movement.id.as_uuid())
        .bind(movement.tenant_id.as_uuid())
        .bind(movement.item_id.as_uuid())
        .bind(movement.delta)
        .bind(movement.kind.as_str())
        .bind(optional_uuid(movement.related_order_id))
        .bind(movement.actor.as_uuid())
        .bind(movement.reason.as_deref())
        .bind(movement.occurred_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("append_movement", e))?;
        Ok(())
    }

    async fn movements_for(
        &mut self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
    ) -> Result<Vec<InventoryMovement>, StoreError> {
        let tx = self.tx()?;
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, item_id, delta, kind, related_order_id, actor_id, reason, occurred_at
            FROM inventory_movements
            WHERE tenant_id = $1 AND item_id = $2
            ORDER BY seq ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(item_id.as_uuid())
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("movements_for", e))?;
        rows.iter().map(movement_from_row).collect()
    }
}

#[async_trait]
impl DiscountRepository for PostgresUnitOfWork {
    #[instrument(skip(self, discount), fields(operation = "insert_discount", code = %discount.code()), err)]
    async fn insert_discount(&mut self, discount: &Discount) -> Result<(), StoreError> {
        let (rule_type, rule_value) = rule_to_sql(discount.rule())?;
        let conditions = discount.conditions();
        let min_spend = conditions.min_spend.map(money_to_sql).transpose()?;
        let tx = self.tx()?;
        sqlx::query(
            r#"
            INSERT INTO discounts
                (id, tenant_id, code, description, rule_type, rule_value, min_spend, min_items,
                 max_usage, valid_until, active, used_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(discount.id_typed().as_uuid())
        .bind(discount.tenant_id().as_uuid())
        .bind(discount.code().as_str())
        .bind(discount.description())
        .bind(rule_type)
        .bind(rule_value)
        .bind(min_spend)
        .bind(conditions.min_items.map(i64::from))
        .bind(conditions.max_usage.map(i64::from))
        .bind(conditions.valid_until)
        .bind(discount.is_active())
        .bind(i64::from(discount.used_count()))
        .bind(discount.created_at())
        .bind(discount.updated_at())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_discount", e))?;
        Ok(())
    }

    async fn find_discount_by_code(
        &mut self,
        tenant_id: TenantId,
        code: &DiscountCode,
    ) -> Result<Option<Discount>, StoreError> {
        let sql = format!("SELECT {DISCOUNT_COLUMNS} FROM discounts WHERE tenant_id = $1 AND code = $2");
        let tx = self.tx()?;
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(code.as_str())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("find_discount_by_code", e))?;
        row.as_ref().map(discount_from_row).transpose()
    }

    #[instrument(skip(self), fields(operation = "lock_discount", tenant_id = %tenant_id, discount_id = %discount_id), err)]
    async fn lock_discount(
        &mut self,
        tenant_id: TenantId,
        discount_id: DiscountId,
    ) -> Result<Option<Discount>, StoreError> {
        self.fetch_discount("lock_discount", tenant_id, discount_id, true).await
    }

    async fn list_discounts(&mut self, tenant_id: TenantId) -> Result<Vec<Discount>, StoreError> {
        let sql = format!("SELECT {DISCOUNT_COLUMNS} FROM discounts WHERE tenant_id = $1 ORDER BY code ASC");
        let tx = self.tx()?;
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .fetch_all(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("list_discounts", e))?;
        rows.iter().map(discount_from_row).collect()
    }

    async fn update_discount(&mut self, discount: &Discount) -> Result<(), StoreError> {
        let tx = self.tx()?;
        let result = sqlx::query(
            r#"
            UPDATE discounts
            SET active = $3, used_count = $4, updated_at = $5
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(discount.tenant_id().as_uuid())
        .bind(discount.id_typed().as_uuid())
        .bind(discount.is_active())
        .bind(i64::from(discount.used_count()))
        .bind(discount.updated_at())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("update_discount", e))?;
        expect_one_row("update_discount", result.rows_affected())
    }
}

#[async_trait]
impl OrderRepository for PostgresUnitOfWork {
    #[instrument(skip(self, order), fields(operation = "insert_order", order_id = %order.id_typed()), err)]
    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        let subtotal = money_to_sql(order.subtotal())?;
        let discount_amount = money_to_sql(order.discount_amount())?;
        let total = money_to_sql(order.total())?;
        let customer = order.customer();
        let tx = self.tx()?;
        sqlx::query(
            r#"
            INSERT INTO orders
                (id, tenant_id, customer_name, customer_contact, customer_address, customer_email,
                 subtotal, discount_id, discount_amount, total, status, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(order.id_typed().as_uuid())
        .bind(order.tenant_id().as_uuid())
        .bind(&customer.name)
        .bind(&customer.contact)
        .bind(&customer.address)
        .bind(&customer.email)
        .bind(subtotal)
        .bind(optional_uuid(order.discount_id().map(|id| id.0)))
        .bind(discount_amount)
        .bind(total)
        .bind(order.status().as_str())
        .bind(order.created_by().as_uuid())
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;

        for (line_no, line) in order.items().iter().enumerate() {
            let line_no = i32::try_from(line_no).map_err(|_| StoreError::Backend("too many order lines".into()))?;
            sqlx::query(
                r#"
                INSERT INTO order_items
                    (tenant_id, order_id, line_no, inventory_item_id, name, sku, quantity, price_at_purchase)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(order.tenant_id().as_uuid())
            .bind(order.id_typed().as_uuid())
            .bind(line_no)
            .bind(line.inventory_item_id.as_uuid())
            .bind(&line.name)
            .bind(line.sku.as_str())
            .bind(line.quantity)
            .bind(money_to_sql(line.price_at_purchase)?)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("insert_order_item", e))?;
        }
        Ok(())
    }

    async fn get_order(&mut self, tenant_id: TenantId, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        self.fetch_order("get_order", tenant_id, order_id, false).await
    }

    #[instrument(skip(self), fields(operation = "lock_order", tenant_id = %tenant_id, order_id = %order_id), err)]
    async fn lock_order(&mut self, tenant_id: TenantId, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        self.fetch_order("lock_order", tenant_id, order_id, true).await
    }

    async fn list_orders(&mut self, tenant_id: TenantId) -> Result<Vec<Order>, StoreError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE tenant_id = $1 ORDER BY created_at DESC, id DESC");
        let tx = self.tx()?;
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .fetch_all(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("list_orders", e))?;

        let ids = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id").map_err(corrupt))
            .collect::<Result<Vec<_>, _>>()?;
        let mut lines = self.fetch_order_items(tenant_id, &ids).await?;

        rows.iter()
            .zip(ids)
            .map(|(row, id)| order_from_row(row, lines.remove(&id).unwrap_or_default()))
            .collect()
    }

    async fn update_order_status(&mut self, order: &Order) -> Result<(), StoreError> {
        let tx = self.tx()?;
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $3, updated_at = $4
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(order.tenant_id().as_uuid())
        .bind(order.id_typed().as_uuid())
        .bind(order.status().as_str())
        .bind(order.updated_at())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("update_order_status", e))?;
        expect_one_row("update_order_status", result.rows_affected())
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    #[instrument(skip(self), fields(operation = "commit"), err)]
    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::Closed)?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::Closed)?;
        tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("40001") | Some("40P01") | Some("55P03") => StoreError::Conflict(msg),
                Some("23505") => StoreError::Duplicate(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {}", operation)),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::ColumnNotFound(_) | sqlx::Error::Decode(_) => {
            StoreError::Corrupt(format!("{} in {}", err, operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn corrupt(err: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(err.to_string())
}

fn expect_one_row(operation: &str, affected: u64) -> Result<(), StoreError> {
    if affected == 1 {
        Ok(())
    } else {
        Err(StoreError::Backend(format!("{operation} touched {affected} rows, expected 1")))
    }
}

/// Nullable uuid column for an optional reference.
fn optional_uuid(id: Option<EntityId>) -> Option<Uuid> {
    id.map(|id| *id.as_uuid())
}

fn money_to_sql(money: Money) -> Result<i64, StoreError> {
    i64::try_from(money.minor_units()).map_err(|_| StoreError::Backend(format!("amount {money} out of range")))
}

fn money_from_sql(value: i64) -> Result<Money, StoreError> {
    u64::try_from(value)
        .map(Money::from_minor)
        .map_err(|_| StoreError::Corrupt(format!("negative amount {value}")))
}

fn count_from_sql(value: i64) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("count {value} out of range")))
}

fn rule_to_sql(rule: DiscountRule) -> Result<(&'static str, i64), StoreError> {
    match rule {
        DiscountRule::Percentage { percent } => Ok(("percentage", i64::from(percent))),
        DiscountRule::FixedAmount { amount } => Ok(("fixed_amount", money_to_sql(amount)?)),
    }
}

fn rule_from_sql(rule_type: &str, value: i64) -> Result<DiscountRule, StoreError> {
    match rule_type {
        "percentage" => Ok(DiscountRule::Percentage {
            percent: count_from_sql(value)?,
        }),
        "fixed_amount" => Ok(DiscountRule::FixedAmount {
            amount: money_from_sql(value)?,
        }),
        other => Err(StoreError::Corrupt(format!("unknown discount rule '{other}'"))),
    }
}

fn item_from_row(row: &PgRow) -> Result<InventoryItem, StoreError> {
    let sku: String = row.try_get("sku").map_err(corrupt)?;
    Ok(InventoryItem::restore(ItemSnapshot {
        id: InventoryItemId::from_uuid(row.try_get("id").map_err(corrupt)?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id").map_err(corrupt)?),
        sku: Sku::parse(&sku).map_err(corrupt)?,
        name: row.try_get("name").map_err(corrupt)?,
        category: row.try_get("category").map_err(corrupt)?,
        unit_price: money_from_sql(row.try_get("unit_price").map_err(corrupt)?)?,
        quantity: row.try_get("quantity").map_err(corrupt)?,
        low_stock_threshold: row.try_get("low_stock_threshold").map_err(corrupt)?,
        created_at: row.try_get("created_at").map_err(corrupt)?,
        updated_at: row.try_get("updated_at").map_err(corrupt)?,
    }))
}

fn movement_from_row(row: &PgRow) -> Result<InventoryMovement, StoreError> {
    let kind: String = row.try_get("kind").map_err(corrupt)?;
    let related_order_id: Option<Uuid> = row.try_get("related_order_id").map_err(corrupt)?;
    Ok(InventoryMovement {
        id: MovementId::from_uuid(row.try_get("id").map_err(corrupt)?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id").map_err(corrupt)?),
        item_id: InventoryItemId::from_uuid(row.try_get("item_id").map_err(corrupt)?),
        delta: row.try_get("delta").map_err(corrupt)?,
        kind: kind.parse::<MovementKind>().map_err(corrupt)?,
        related_order_id: related_order_id.map(EntityId::from_uuid),
        actor: UserId::from_uuid(row.try_get("actor_id").map_err(corrupt)?),
        reason: row.try_get("reason").map_err(corrupt)?,
        occurred_at: row.try_get("occurred_at").map_err(corrupt)?,
    })
}

fn discount_from_row(row: &PgRow) -> Result<Discount, StoreError> {
    let code: String = row.try_get("code").map_err(corrupt)?;
    let rule_type: String = row.try_get("rule_type").map_err(corrupt)?;
    let min_spend: Option<i64> = row.try_get("min_spend").map_err(corrupt)?;
    let min_items: Option<i64> = row.try_get("min_items").map_err(corrupt)?;
    let max_usage: Option<i64> = row.try_get("max_usage").map_err(corrupt)?;
    let valid_until: Option<DateTime<Utc>> = row.try_get("valid_until").map_err(corrupt)?;

    Ok(Discount::restore(DiscountSnapshot {
        id: DiscountId::from_uuid(row.try_get("id").map_err(corrupt)?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id").map_err(corrupt)?),
        code: DiscountCode::parse(&code).map_err(corrupt)?,
        description: row.try_get("description").map_err(corrupt)?,
        rule: rule_from_sql(&rule_type, row.try_get("rule_value").map_err(corrupt)?)?,
        conditions: DiscountConditions {
            min_spend: min_spend.map(money_from_sql).transpose()?,
            min_items: min_items.map(count_from_sql).transpose()?,
            max_usage: max_usage.map(count_from_sql).transpose()?,
            valid_until,
        },
        active: row.try_get("active").map_err(corrupt)?,
        used_count: count_from_sql(row.try_get("used_count").map_err(corrupt)?)?,
        created_at: row.try_get("created_at").map_err(corrupt)?,
        updated_at: row.try_get("updated_at").map_err(corrupt)?,
    }))
}

fn order_item_from_row(row: &PgRow) -> Result<OrderItem, StoreError> {
    let sku: String = row.try_get("sku").map_err(corrupt)?;
    Ok(OrderItem {
        inventory_item_id: InventoryItemId::from_uuid(row.try_get("inventory_item_id").map_err(corrupt)?),
        name: row.try_get("name").map_err(corrupt)?,
        sku: Sku::parse(&sku).map_err(corrupt)?,
        quantity: row.try_get("quantity").map_err(corrupt)?,
        price_at_purchase: money_from_sql(row.try_get("price_at_purchase").map_err(corrupt)?)?,
    })
}

fn order_from_row(row: &PgRow, items: Vec<OrderItem>) -> Result<Order, StoreError> {
    let status: String = row.try_get("status").map_err(corrupt)?;
    let discount_id: Option<Uuid> = row.try_get("discount_id").map_err(corrupt)?;
    Ok(Order::restore(OrderSnapshot {
        id: OrderId::from_uuid(row.try_get("id").map_err(corrupt)?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id").map_err(corrupt)?),
        customer: CustomerDetails {
            name: row.try_get("customer_name").map_err(corrupt)?,
            contact: row.try_get("customer_contact").map_err(corrupt)?,
            address: row.try_get("customer_address").map_err(corrupt)?,
            email: row.try_get("customer_email").map_err(corrupt)?,
        },
        items,
        subtotal: money_from_sql(row.try_get("subtotal").map_err(corrupt)?)?,
        discount_id: discount_id.map(DiscountId::from_uuid),
        discount_amount: money_from_sql(row.try_get("discount_amount").map_err(corrupt)?)?,
        total: money_from_sql(row.try_get("total").map_err(corrupt)?)?,
        status: status.parse::<OrderStatus>().map_err(corrupt)?,
        created_by: UserId::from_uuid(row.try_get("created_by").map_err(corrupt)?),
        created_at: row.try_get("created_at").map_err(corrupt)?,
        updated_at: row.try_get("updated_at").map_err(corrupt)?,
    }))
}
