//! Discount engine: code lookup, eligibility and usage accounting.
//!
//! `validate` never mutates. A checkout spends a use with [`redeem_in`],
//! which re-checks the discount under its row lock and bumps `used_count`
//! in the checkout's unit of work, so the counter moves if and only if the
//! order is persisted.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use stockroom_auth::{Actor, Permission, authorize};
use stockroom_core::{Money, TenantId};
use stockroom_discounts::{
    Discount, DiscountCode, DiscountConditions, DiscountError, DiscountId, DiscountRule, NewDiscount,
};

use crate::error::{ServiceError, ServiceResult};
use crate::store::{DiscountRepository, Store, UnitOfWork, finish};

/// A discount that applies to a cart and what it takes off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscountQuote {
    pub discount: Discount,
    pub discount_amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDiscount {
    pub code: String,
    pub description: String,
    pub rule: DiscountRule,
    pub conditions: DiscountConditions,
}

#[derive(Clone)]
pub struct DiscountEngine {
    store: Arc<dyn Store>,
}

async fn find_by_code(uow: &mut dyn UnitOfWork, tenant_id: TenantId, raw_code: &str) -> ServiceResult<Discount> {
    let not_found = || DiscountError::CodeNotFound(raw_code.trim().to_string());
    // A code that does not normalize cannot have been stored.
    let code = DiscountCode::parse(raw_code).map_err(|_| not_found())?;
    let discount = uow
        .find_discount_by_code(tenant_id, &code)
        .await?
        .ok_or_else(not_found)?;
    Ok(discount)
}

/// Check a code against a cart without touching the usage counter.
pub async fn validate_in(
    uow: &mut dyn UnitOfWork,
    tenant_id: TenantId,
    code: &str,
    subtotal: Money,
    item_count: u32,
    now: DateTime<Utc>,
) -> ServiceResult<DiscountQuote> {
    let discount = find_by_code(uow, tenant_id, code).await?;
    let discount_amount = discount.evaluate(subtotal, item_count, now)?;
    Ok(DiscountQuote {
        discount,
        discount_amount,
    })
}

/// Spend one use of a discount inside `uow`, holding its row lock.
///
/// Returns `false` without writing when the use would pass `max_usage`.
pub async fn reserve_use_in(
    uow: &mut dyn UnitOfWork,
    tenant_id: TenantId,
    discount_id: DiscountId,
    at: DateTime<Utc>,
) -> ServiceResult<bool> {
    let mut discount = uow
        .lock_discount(tenant_id, discount_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("discount", discount_id))?;
    if !discount.reserve_use(at) {
        return Ok(false);
    }
    uow.update_discount(&discount).await?;
    Ok(true)
}

/// Validate a code for a cart and spend one use of it, inside `uow`.
///
/// The eligibility check runs again on the locked row so a concurrent
/// checkout that took the last use, or a deactivation, is seen.
pub async fn redeem_in(
    uow: &mut dyn UnitOfWork,
    tenant_id: TenantId,
    code: &str,
    subtotal: Money,
    item_count: u32,
    now: DateTime<Utc>,
) -> ServiceResult<DiscountQuote> {
    let found = find_by_code(uow, tenant_id, code).await?;
    let mut discount = uow
        .lock_discount(tenant_id, found.id_typed())
        .await?
        .ok_or_else(|| DiscountError::CodeNotFound(code.trim().to_string()))?;

    let discount_amount = discount.evaluate(subtotal, item_count, now)?;
    if !discount.reserve_use(now) {
        let max_usage = discount.conditions().max_usage.unwrap_or(u32::MAX);
        return Err(DiscountError::UsageLimitReached { max_usage }.into());
    }
    uow.update_discount(&discount).await?;

    Ok(DiscountQuote {
        discount,
        discount_amount,
    })
}

impl DiscountEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Preview a code against a cart. Never changes the usage counter.
    #[instrument(skip(self, actor), fields(tenant_id = %actor.tenant_id), err)]
    pub async fn validate(
        &self,
        actor: &Actor,
        code: &str,
        subtotal: Money,
        item_count: u32,
    ) -> ServiceResult<DiscountQuote> {
        authorize(actor, &Permission::DISCOUNTS_VALIDATE)?;
        let mut uow = self.store.begin().await?;
        let outcome = validate_in(uow.as_mut(), actor.tenant_id, code, subtotal, item_count, Utc::now()).await;
        finish(uow, outcome).await
    }

    /// Spend one use outside of a checkout. `false` when the limit is reached.
    pub async fn reserve_use(&self, actor: &Actor, discount_id: DiscountId) -> ServiceResult<bool> {
        authorize(actor, &Permission::DISCOUNTS_MANAGE)?;
        let mut uow = self.store.begin().await?;
        let outcome = reserve_use_in(uow.as_mut(), actor.tenant_id, discount_id, Utc::now()).await;
        finish(uow, outcome).await
    }

    #[instrument(skip(self, actor, request), fields(tenant_id = %actor.tenant_id, code = %request.code), err)]
    pub async fn create(&self, actor: &Actor, request: CreateDiscount) -> ServiceResult<Discount> {
        authorize(actor, &Permission::DISCOUNTS_MANAGE)?;
        let discount = Discount::create(&NewDiscount {
            tenant_id: actor.tenant_id,
            discount_id: DiscountId::new(),
            code: request.code,
            description: request.description,
            rule: request.rule,
            conditions: request.conditions,
            occurred_at: Utc::now(),
        })?;

        let mut uow = self.store.begin().await?;
        let outcome = uow.insert_discount(&discount).await.map_err(ServiceError::from);
        finish(uow, outcome).await?;

        info!(discount_id = %discount.id_typed(), "discount created");
        Ok(discount)
    }

    pub async fn deactivate(&self, actor: &Actor, discount_id: DiscountId) -> ServiceResult<Discount> {
        authorize(actor, &Permission::DISCOUNTS_MANAGE)?;
        let mut uow = self.store.begin().await?;
        let outcome = async {
            let mut discount = uow
                .lock_discount(actor.tenant_id, discount_id)
                .await?
                .ok_or_else(|| ServiceError::not_found("discount", discount_id))?;
            discount.deactivate(Utc::now());
            uow.update_discount(&discount).await?;
            Ok::<_, ServiceError>(discount)
        }
        .await;
        let discount = finish(uow, outcome).await?;
        info!(%discount_id, "discount deactivated");
        Ok(discount)
    }

    pub async fn list(&self, actor: &Actor) -> ServiceResult<Vec<Discount>> {
        authorize(actor, &Permission::DISCOUNTS_READ)?;
        let mut uow = self.store.begin().await?;
        let outcome = uow.list_discounts(actor.tenant_id).await.map_err(ServiceError::from);
        finish(uow, outcome).await
    }
}
