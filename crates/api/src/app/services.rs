use std::sync::Arc;

use anyhow::Context;

use stockroom_infra::{
    AppConfig, CheckoutConfig, CheckoutOrchestrator, DiscountEngine, InMemoryStore,
    InventoryLedger, OrderService, PostgresStore, Store,
};

/// Services shared by every handler. All of them sit on the same store.
#[derive(Clone)]
pub struct AppServices {
    pub ledger: InventoryLedger,
    pub discounts: DiscountEngine,
    pub checkout: CheckoutOrchestrator,
    pub orders: OrderService,
}

impl AppServices {
    pub fn new(store: Arc<dyn Store>, checkout: &CheckoutConfig) -> Self {
        Self {
            ledger: InventoryLedger::new(store.clone()),
            discounts: DiscountEngine::new(store.clone()),
            checkout: CheckoutOrchestrator::new(store.clone(), checkout.clone()),
            orders: OrderService::new(store, checkout),
        }
    }
}

/// Postgres when `DATABASE_URL` is set, otherwise a process-local store.
pub async fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn Store>> {
    match &config.database_url {
        Some(url) => {
            let store = PostgresStore::connect(url)
                .await
                .context("failed to connect to postgres")?;
            store.migrate().await.context("failed to apply schema")?;
            tracing::info!("using postgres store");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; state is kept in memory and lost on exit");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}
