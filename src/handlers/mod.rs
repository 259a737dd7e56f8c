pub mod orders;
pub mod payments;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::gateway::{HttpPaymentGateway, PaymentGateway};
use crate::notifications::{HttpMailer, Mailer, NotificationDispatcher};
use crate::services::orders::OrderService;
use crate::services::payments::PaymentService;
use crate::store::{OrderStore, SeaOrmOrderStore};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
}

impl AppServices {
    /// Wires up the store, gateway client, and notification dispatcher
    /// once at startup; every request borrows these shared instances.
    pub fn new(db_pool: Arc<DbPool>, config: &AppConfig, event_sender: Arc<EventSender>) -> Self {
        let store: Arc<dyn OrderStore> = Arc::new(SeaOrmOrderStore::new(db_pool));

        let mailer: Option<Arc<dyn Mailer>> = HttpMailer::from_config(config)
            .map(|mailer| Arc::new(mailer) as Arc<dyn Mailer>);
        let dispatcher = Arc::new(NotificationDispatcher::new(mailer, config));

        let gateway: Option<Arc<dyn PaymentGateway>> = HttpPaymentGateway::from_config(config)
            .map(|gateway| Arc::new(gateway) as Arc<dyn PaymentGateway>);

        let orders = Arc::new(OrderService::new(
            store.clone(),
            dispatcher.clone(),
            Some(event_sender.clone()),
        ));
        let payments = Arc::new(PaymentService::new(
            store,
            gateway,
            dispatcher,
            config.gateway_key_secret.clone(),
            config.default_currency.clone(),
            Some(event_sender),
        ));

        Self { orders, payments }
    }
}
