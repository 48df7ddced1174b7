//! Infrastructure layer: stores, ledgers, checkout orchestration, caches, config.

pub mod cache;
pub mod checkout;
pub mod config;
pub mod ledger;
pub mod order_number;
pub mod retry;
pub mod side_effects;
pub mod store;


pub use checkout::{
    CheckoutError, CheckoutLine, CheckoutOrchestrator, CheckoutPreview, CheckoutRequest,
    CheckoutStage, PlacedOrder, PreviewLine, PricingModel,
};
pub use config::{CheckoutConfig, ConfigError};
pub use retry::RetryPolicy;
pub use side_effects::{
    BusNotificationDispatcher, CacheInvalidator, NotificationDispatcher, Noop, PostCommitEffects,
};
pub use store::{
    AccountStore, CatalogStore, CommerceStore, CommerceTx, InMemoryCommerceStore,
    OrderStore, PostgresCommerceStore, StoreError,
};
