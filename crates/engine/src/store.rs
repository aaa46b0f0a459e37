//! Collaborators the till writes to and listens on.
//!
//! Stores publish their whole collection on a `tokio::sync::watch` channel
//! after every committed change. Holding a receiver is the subscription;
//! dropping it unsubscribes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::{
    ChangeEvent, LedgerState, Money, MovementDoc, NewMovement, NewProduct, PaymentMethod, Product,
    ResultEngine,
};

#[async_trait]
pub trait MovementStore: Send + Sync {
    /// Persists a movement and returns the id assigned to it.
    async fn create(&self, movement: NewMovement) -> ResultEngine<String>;

    async fn delete(&self, id: &str) -> ResultEngine<()>;

    fn subscribe(&self) -> watch::Receiver<Vec<MovementDoc>>;
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn create(&self, product: NewProduct) -> ResultEngine<String>;

    fn subscribe(&self) -> watch::Receiver<Vec<Product>>;
}

/// Everything needed to record a sale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaleRequest {
    pub product_id: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub payment_method: PaymentMethod,
    pub occurred_at: DateTime<Utc>,
    pub location: String,
    pub notes: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaleOutcome {
    Registered { movement_id: String },
    /// Nothing was written; `reason` is ready to be shown to the operator.
    Rejected { reason: String },
}

/// Records a sale and takes its units out of stock.
///
/// Implementations must do both atomically, or neither. The sale movement
/// total is `unit_price × quantity`.
#[async_trait]
pub trait SaleRegistrar: Send + Sync {
    async fn register(&self, sale: SaleRequest) -> ResultEngine<SaleOutcome>;
}

/// Folds both subscriptions into a [`LedgerState`].
///
/// The feed does not spawn anything: [`LedgerFeed::latest`] pulls whatever
/// the channels delivered since the previous call.
#[derive(Debug)]
pub struct LedgerFeed {
    movements: watch::Receiver<Vec<MovementDoc>>,
    products: watch::Receiver<Vec<Product>>,
    state: LedgerState,
}

impl LedgerFeed {
    pub fn new(
        mut movements: watch::Receiver<Vec<MovementDoc>>,
        mut products: watch::Receiver<Vec<Product>>,
    ) -> Self {
        let state = LedgerState::default()
            .apply(ChangeEvent::Movements(movements.borrow_and_update().clone()))
            .apply(ChangeEvent::Products(products.borrow_and_update().clone()));
        Self {
            movements,
            products,
            state,
        }
    }

    /// Subscribes to both stores of `store`.
    pub fn subscribe<S>(store: &S) -> Self
    where
        S: MovementStore + ProductStore,
    {
        Self::new(
            MovementStore::subscribe(store),
            ProductStore::subscribe(store),
        )
    }

    /// The newest snapshot known to the subscriptions.
    pub fn latest(&mut self) -> LedgerState {
        let movements = self.movements.has_changed().unwrap_or(false);
        let products = self.products.has_changed().unwrap_or(false);
        self.refresh(movements, products)
    }

    fn refresh(&mut self, movements: bool, products: bool) -> LedgerState {
        if movements {
            let movements = self.movements.borrow_and_update().clone();
            self.state = std::mem::take(&mut self.state).apply(ChangeEvent::Movements(movements));
        }
        if products {
            let products = self.products.borrow_and_update().clone();
            self.state = std::mem::take(&mut self.state).apply(ChangeEvent::Products(products));
        }
        self.state.clone()
    }

    /// Waits for the next change on either subscription and returns the new
    /// snapshot. Returns `None` once both stores are gone.
    pub async fn changed(&mut self) -> Option<LedgerState> {
        let mut movements_open = true;
        let mut products_open = true;
        // `changed()` marks the value as seen, so the side that fired is
        // refreshed unconditionally.
        let (movements, products) = loop {
            if !movements_open && !products_open {
                return None;
            }
            tokio::select! {
                res = self.movements.changed(), if movements_open => match res {
                    Ok(()) => break (true, self.products.has_changed().unwrap_or(false)),
                    Err(_) => movements_open = false,
                },
                res = self.products.changed(), if products_open => match res {
                    Ok(()) => break (self.movements.has_changed().unwrap_or(false), true),
                    Err(_) => products_open = false,
                },
            }
        };
        Some(self.refresh(movements, products))
    }
}
