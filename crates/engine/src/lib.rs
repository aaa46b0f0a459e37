//! Cash ledger of a plant nursery till.
//!
//! The engine keeps an in-memory [`LedgerState`] fed by store subscriptions,
//! derives balances and period totals from it, validates operator input and
//! records movements through the store collaborators. Sales go through a
//! [`SaleRegistrar`] so that the movement and the stock decrement commit
//! together.
//!
//! ```no_run
//! # async fn run(db: sea_orm::DatabaseConnection) -> engine::ResultEngine<()> {
//! use std::sync::Arc;
//!
//! let store = Arc::new(engine::SqliteStore::builder().database(db).build().await?);
//! let feed = engine::LedgerFeed::subscribe(store.as_ref());
//! let till = engine::Till::new(store.clone(), store, feed);
//! let summary = till.snapshot().summary(chrono::Utc::now());
//! println!("{}", summary.running.total());
//! # Ok(())
//! # }
//! ```

pub use error::{EngineError, SubmitError};
pub use form::{FormUi, MovementForm, MovementInput, SUCCESS_MESSAGE, Toast, ToastKind, Viewport};
pub use ledger::{Balances, DayTotals, LedgerSummary, MethodTotals, Period};
pub use money::Money;
pub use movements::{MovementDoc, MovementKind, NewMovement, PaymentMethod};
pub use products::{DEFAULT_PRODUCT_KIND, NewProduct, Product};
pub use sqlite::{SqliteStore, SqliteStoreBuilder};
pub use state::{ChangeEvent, LedgerState};
pub use store::{LedgerFeed, MovementStore, ProductStore, SaleOutcome, SaleRegistrar, SaleRequest};
pub use submit::{Amounts, Dispatch};
pub use till::{Receipt, SubmissionState, Till};

pub mod clock;
mod error;
mod form;
pub mod ledger;
pub mod money;
mod movements;
mod products;
mod sqlite;
mod state;
mod store;
pub mod submit;
mod till;

pub type ResultEngine<T> = Result<T, EngineError>;
