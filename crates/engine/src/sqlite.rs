//! SQLite implementation of the store collaborators.
//!
//! Movements are rows holding a flat JSON document, products are typed rows.
//! After every committed write the affected collection is reloaded and pushed
//! to subscribers. A failed reload is logged; the write still reports success.

use async_trait::async_trait;
use sea_orm::{ActiveValue, DatabaseConnection, QueryOrder, TransactionTrait, prelude::*};
use tokio::sync::watch;
use uuid::Uuid;

use crate::{
    EngineError, Money, MovementDoc, MovementKind, NewMovement, NewProduct, Product,
    ResultEngine, movements, products,
    store::{MovementStore, ProductStore, SaleOutcome, SaleRegistrar, SaleRequest},
};

#[derive(Debug)]
pub struct SqliteStore {
    database: DatabaseConnection,
    movements_tx: watch::Sender<Vec<MovementDoc>>,
    products_tx: watch::Sender<Vec<Product>>,
}

impl SqliteStore {
    /// Return a builder for `SqliteStore`.
    pub fn builder() -> SqliteStoreBuilder {
        SqliteStoreBuilder::default()
    }

    async fn load_movements(&self) -> ResultEngine<Vec<MovementDoc>> {
        load_movements(&self.database).await
    }

    async fn load_products(&self) -> ResultEngine<Vec<Product>> {
        load_products(&self.database).await
    }

    async fn publish_movements(&self) {
        publish(&self.movements_tx, self.load_movements().await, "movements");
    }

    async fn publish_products(&self) {
        publish(&self.products_tx, self.load_products().await, "products");
    }
}

/// Pushes a reloaded collection to subscribers. The write before it is
/// already committed, so a failed reload only leaves them one change behind.
fn publish<T>(tx: &watch::Sender<Vec<T>>, loaded: ResultEngine<Vec<T>>, collection: &str) {
    match loaded {
        Ok(rows) => {
            tx.send_replace(rows);
        }
        Err(err) => tracing::warn!("{collection} written but reloading them failed: {err}"),
    }
}

async fn load_movements<C: ConnectionTrait>(db: &C) -> ResultEngine<Vec<MovementDoc>> {
    let rows = movements::Entity::find()
        .order_by_asc(movements::Column::Id)
        .all(db)
        .await?;
    Ok(rows.into_iter().map(MovementDoc::from).collect())
}

async fn load_products<C: ConnectionTrait>(db: &C) -> ResultEngine<Vec<Product>> {
    let rows = products::Entity::find()
        .order_by_asc(products::Column::Name)
        .all(db)
        .await?;
    Ok(rows.into_iter().map(Product::from).collect())
}

#[async_trait]
impl MovementStore for SqliteStore {
    async fn create(&self, movement: NewMovement) -> ResultEngine<String> {
        let id = Uuid::new_v4().to_string();
        movements::ActiveModel::from_document(id.clone(), &movement.to_document())?
            .insert(&self.database)
            .await?;
        self.publish_movements().await;
        Ok(id)
    }

    async fn delete(&self, id: &str) -> ResultEngine<()> {
        let result = movements::Entity::delete_by_id(id.to_string())
            .exec(&self.database)
            .await?;
        if result.rows_affected == 0 {
            return Err(EngineError::KeyNotFound(id.to_string()));
        }
        self.publish_movements().await;
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Vec<MovementDoc>> {
        self.movements_tx.subscribe()
    }
}

#[async_trait]
impl ProductStore for SqliteStore {
    async fn create(&self, product: NewProduct) -> ResultEngine<String> {
        product.validate()?;
        let id = Uuid::new_v4().to_string();
        products::ActiveModel::from_new(id.clone(), &product)
            .insert(&self.database)
            .await?;
        self.publish_products().await;
        Ok(id)
    }

    fn subscribe(&self) -> watch::Receiver<Vec<Product>> {
        self.products_tx.subscribe()
    }
}

#[async_trait]
impl SaleRegistrar for SqliteStore {
    async fn register(&self, sale: SaleRequest) -> ResultEngine<SaleOutcome> {
        if sale.quantity == 0 {
            return Ok(SaleOutcome::Rejected {
                reason: "quantity must be at least 1".to_string(),
            });
        }
        let Some(total) = sale.unit_price.checked_mul(sale.quantity) else {
            return Err(EngineError::InvalidAmount("sale total too large".to_string()));
        };

        let db_tx = self.database.begin().await?;

        let Some(product) = products::Entity::find_by_id(sale.product_id.clone())
            .one(&db_tx)
            .await?
        else {
            db_tx.rollback().await?;
            return Ok(SaleOutcome::Rejected {
                reason: "the selected product no longer exists".to_string(),
            });
        };
        let quantity = i64::from(sale.quantity);
        if product.stock < quantity {
            db_tx.rollback().await?;
            return Ok(SaleOutcome::Rejected {
                reason: format!(
                    "insufficient stock for {}: {} available",
                    product.name, product.stock
                ),
            });
        }

        let movement_id = Uuid::new_v4().to_string();
        let movement = sale_document(&sale, total);
        movements::ActiveModel::from_document(movement_id.clone(), &movement)?
            .insert(&db_tx)
            .await?;

        let stock = product.stock - quantity;
        products::ActiveModel {
            id: ActiveValue::Set(product.id),
            stock: ActiveValue::Set(stock),
            ..Default::default()
        }
        .update(&db_tx)
        .await?;

        db_tx.commit().await?;

        self.publish_movements().await;
        self.publish_products().await;
        Ok(SaleOutcome::Registered { movement_id })
    }
}

fn sale_document(sale: &SaleRequest, total: Money) -> serde_json::Map<String, serde_json::Value> {
    NewMovement {
        kind: MovementKind::Sale,
        detail: String::new(),
        product_id: Some(sale.product_id.clone()),
        quantity: Some(sale.quantity),
        price: Some(sale.unit_price),
        total,
        payment_method: sale.payment_method,
        occurred_at: sale.occurred_at,
        location: sale.location.clone(),
        notes: sale.notes.clone(),
    }
    .to_document()
}

/// The builder for `SqliteStore`
#[derive(Default)]
pub struct SqliteStoreBuilder {
    database: DatabaseConnection,
}

impl SqliteStoreBuilder {
    /// Pass the required database (already migrated).
    pub fn database(mut self, db: DatabaseConnection) -> SqliteStoreBuilder {
        self.database = db;
        self
    }

    /// Construct `SqliteStore` and load the initial snapshots.
    pub async fn build(self) -> ResultEngine<SqliteStore> {
        let movements = load_movements(&self.database).await?;
        let products = load_products(&self.database).await?;
        let (movements_tx, _) = watch::channel(movements);
        let (products_tx, _) = watch::channel(products);
        Ok(SqliteStore {
            database: self.database,
            movements_tx,
            products_tx,
        })
    }
}
