use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};
use serde_json::json;
use tokio::sync::{Notify, watch};

use engine::{
    EngineError, LedgerFeed, Money, MovementDoc, MovementForm, MovementInput, MovementKind,
    MovementStore, NewMovement, NewProduct, PaymentMethod, Product, ProductStore, ResultEngine,
    SaleOutcome, SaleRegistrar, SaleRequest, SqliteStore, SubmissionState, SubmitError, Till,
    ToastKind, Viewport,
};
use migration::MigratorTrait;

async fn database() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    db
}

async fn store_on(db: DatabaseConnection) -> Arc<SqliteStore> {
    Arc::new(SqliteStore::builder().database(db).build().await.unwrap())
}

fn till_on(store: &Arc<SqliteStore>) -> Till<SqliteStore, SqliteStore> {
    Till::new(
        store.clone(),
        store.clone(),
        LedgerFeed::subscribe(store.as_ref()),
    )
}

async fn add_product(store: &SqliteStore, name: &str, price_cents: i64, stock: u32) -> String {
    ProductStore::create(
        store,
        NewProduct {
            name: name.to_string(),
            base_price: Money::new(price_cents),
            purchase_price: Money::new(price_cents / 2),
            stock,
            kind: "interior".to_string(),
        },
    )
    .await
    .unwrap()
}

async fn cash_in_at(store: &SqliteStore, cents: i64, method: PaymentMethod, at: DateTime<Utc>) {
    let movement = NewMovement::cash(
        MovementKind::CashIn,
        "opening float".to_string(),
        None,
        Money::new(cents),
        method,
        at,
        String::new(),
        String::new(),
    )
    .unwrap();
    MovementStore::create(store, movement).await.unwrap();
}

async fn insert_raw(db: &DatabaseConnection, id: &str, document: serde_json::Value) {
    db.execute(Statement::from_sql_and_values(
        db.get_database_backend(),
        "INSERT INTO movements (id, document) VALUES (?, ?)",
        vec![id.into(), document.to_string().into()],
    ))
    .await
    .unwrap();
}

fn sale(product_id: &str, quantity: u32, price: &str) -> MovementInput {
    MovementInput {
        kind: MovementKind::Sale,
        product_id: Some(product_id.to_string()),
        quantity,
        price: price.to_string(),
        ..MovementInput::default()
    }
}

fn cash_movement(kind: MovementKind, price: &str, method: PaymentMethod) -> MovementInput {
    MovementInput {
        kind,
        detail: "till".to_string(),
        price: price.to_string(),
        payment_method: method,
        ..MovementInput::default()
    }
}

fn stock_of(till: &Till<SqliteStore, SqliteStore>, id: &str) -> u32 {
    till.snapshot().product(id).map(|p| p.stock).unwrap()
}

#[tokio::test]
async fn sale_records_movement_and_takes_units_out_of_stock() {
    let store = store_on(database().await).await;
    let monstera = add_product(&store, "Monstera", 1500, 5).await;
    let till = till_on(&store);

    let receipt = till
        .submit(&sale(&monstera, 2, "15"), Viewport::Wide, Utc::now())
        .await
        .unwrap();
    assert_eq!(receipt.kind, MovementKind::Sale);

    let state = till.snapshot();
    assert_eq!(state.movements().len(), 1);
    let movement = &state.movements()[0];
    assert_eq!(movement.id, receipt.movement_id);
    assert_eq!(movement.total(), Money::new(3000));
    assert_eq!(movement.quantity(), 2);
    assert_eq!(movement.product_id(), Some(monstera.as_str()));
    assert_eq!(stock_of(&till, &monstera), 3);
    assert_eq!(state.summary(Utc::now()).running.cash, Money::new(3000));
    assert_eq!(till.submission_state(), SubmissionState::Succeeded);
}

#[tokio::test]
async fn sale_beyond_stock_is_rejected_without_writes() {
    let store = store_on(database().await).await;
    let ficus = add_product(&store, "Ficus", 900, 1).await;
    let till = till_on(&store);

    let err = till
        .submit(&sale(&ficus, 3, "9"), Viewport::Wide, Utc::now())
        .await
        .unwrap_err();
    match &err {
        SubmitError::SaleRegistrationFailed { reason } => {
            assert_eq!(reason, "insufficient stock for Ficus: 1 available");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(till.snapshot().movements().is_empty());
    assert_eq!(stock_of(&till, &ficus), 1);
    assert_eq!(till.submission_state(), SubmissionState::Failed(err));
}

#[tokio::test]
async fn sale_without_positive_price_never_writes() {
    let store = store_on(database().await).await;
    let fern = add_product(&store, "Fern", 700, 4).await;
    let till = till_on(&store);

    for price in ["", "0", "0.004", "-3", "abc"] {
        let err = till
            .submit(&sale(&fern, 1, price), Viewport::Wide, Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err, SubmitError::MissingPrice, "price {price:?}");
    }
    assert!(till.snapshot().movements().is_empty());
    assert_eq!(stock_of(&till, &fern), 4);
}

#[tokio::test]
async fn sale_of_unknown_product_is_refused() {
    let store = store_on(database().await).await;
    let till = till_on(&store);

    let err = till
        .submit(&sale("ghost", 1, "10"), Viewport::Wide, Utc::now())
        .await
        .unwrap_err();
    assert_eq!(err, SubmitError::MissingProduct);

    let outcome = store
        .register(SaleRequest {
            product_id: "ghost".to_string(),
            quantity: 1,
            unit_price: Money::new(1000),
            payment_method: PaymentMethod::Cash,
            occurred_at: Utc::now(),
            location: String::new(),
            notes: String::new(),
        })
        .await
        .unwrap();
    assert_eq!(
        outcome,
        SaleOutcome::Rejected {
            reason: "the selected product no longer exists".to_string()
        }
    );
    assert!(till.snapshot().movements().is_empty());
}

#[tokio::test]
async fn sale_then_purchase_leaves_sixty_in_cash() {
    let store = store_on(database().await).await;
    let cactus = add_product(&store, "Cactus", 10000, 3).await;
    let till = till_on(&store);

    till.submit(&sale(&cactus, 1, "100"), Viewport::Wide, Utc::now())
        .await
        .unwrap();
    let purchase = MovementInput {
        kind: MovementKind::Purchase,
        price: "40".to_string(),
        ..MovementInput::default()
    };
    till.submit(&purchase, Viewport::Wide, Utc::now())
        .await
        .unwrap();

    let summary = till.snapshot().summary(Utc::now());
    assert_eq!(summary.running.cash, Money::new(6000));
    assert_eq!(summary.running.mobile_wallet, Money::ZERO);
    assert_eq!(summary.running.total(), Money::new(6000));
    assert_eq!(summary.today_totals.units_sold, 1);
}

#[tokio::test]
async fn debit_equal_to_balance_is_accepted_and_beyond_is_refused() {
    let store = store_on(database().await).await;
    cash_in_at(&store, 10000, PaymentMethod::Cash, Utc::now()).await;
    let till = till_on(&store);

    let purchase = |price: &str| MovementInput {
        kind: MovementKind::Purchase,
        price: price.to_string(),
        ..MovementInput::default()
    };
    till.submit(&purchase("40"), Viewport::Wide, Utc::now())
        .await
        .unwrap();
    till.submit(&purchase("60"), Viewport::Wide, Utc::now())
        .await
        .unwrap();
    let err = till
        .submit(&purchase("0.01"), Viewport::Wide, Utc::now())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SubmitError::InsufficientFunds {
            method: PaymentMethod::Cash
        }
    );
    assert_eq!(till.snapshot().movements().len(), 3);
}

#[tokio::test]
async fn cash_out_checks_the_balance_of_its_own_method() {
    let store = store_on(database().await).await;
    cash_in_at(&store, 3000, PaymentMethod::MobileWallet, Utc::now()).await;
    cash_in_at(&store, 50000, PaymentMethod::Cash, Utc::now()).await;
    let till = till_on(&store);

    let cash_out = cash_movement(MovementKind::CashOut, "50", PaymentMethod::MobileWallet);
    let err = till
        .submit(&cash_out, Viewport::Wide, Utc::now())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SubmitError::InsufficientFunds {
            method: PaymentMethod::MobileWallet
        }
    );
    assert_eq!(
        err.to_string(),
        "not enough balance in mobile wallet for this operation"
    );
    assert_eq!(till.snapshot().movements().len(), 2);
}

#[tokio::test]
async fn cash_out_is_checked_against_its_total() {
    let store = store_on(database().await).await;
    cash_in_at(&store, 5000, PaymentMethod::Cash, Utc::now()).await;
    let till = till_on(&store);

    let mut cash_out = cash_movement(MovementKind::CashOut, "10", PaymentMethod::Cash);
    cash_out.total = "100".to_string();
    let err = till
        .submit(&cash_out, Viewport::Wide, Utc::now())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SubmitError::InsufficientFunds {
            method: PaymentMethod::Cash
        }
    );
    assert_eq!(till.snapshot().movements().len(), 1);

    cash_out.total = "50".to_string();
    till.submit(&cash_out, Viewport::Wide, Utc::now())
        .await
        .unwrap();
    assert_eq!(till.snapshot().summary(Utc::now()).running.cash, Money::ZERO);
}

#[tokio::test]
async fn typed_dates_resolve_in_civil_time_except_narrow_sales() {
    let store = store_on(database().await).await;
    let palm = add_product(&store, "Palm", 2000, 2).await;
    let till = till_on(&store);

    let mut deposit = cash_movement(MovementKind::CashIn, "10", PaymentMethod::Cash);
    deposit.date = Some("2024-03-15".to_string());
    let receipt = till
        .submit(&deposit, Viewport::Narrow, Utc::now())
        .await
        .unwrap();
    let state = till.snapshot();
    let stored = state
        .movements()
        .iter()
        .find(|m| m.id == receipt.movement_id)
        .unwrap();
    assert_eq!(
        stored.occurred_at().unwrap().to_rfc3339(),
        "2024-03-15T03:00:00+00:00"
    );

    let before = Utc::now() - Duration::seconds(1);
    let mut counter_sale = sale(&palm, 1, "20");
    counter_sale.date = Some("2020-01-01".to_string());
    let receipt = till
        .submit(&counter_sale, Viewport::Narrow, Utc::now())
        .await
        .unwrap();
    let state = till.snapshot();
    let stored = state
        .movements()
        .iter()
        .find(|m| m.id == receipt.movement_id)
        .unwrap();
    assert!(stored.occurred_at().unwrap() >= before);
}

#[tokio::test]
async fn purge_month_deletes_only_the_current_month() {
    let db = database().await;
    insert_raw(
        &db,
        "undated",
        json!({"type": "cash_in", "total": 5, "paymentMethod": "cash"}),
    )
    .await;
    let store = store_on(db).await;
    let now = Utc::now();
    cash_in_at(&store, 1000, PaymentMethod::Cash, now).await;
    cash_in_at(&store, 2000, PaymentMethod::MobileWallet, now).await;
    cash_in_at(&store, 3000, PaymentMethod::Cash, now - Duration::days(40)).await;
    let till = till_on(&store);
    assert_eq!(till.snapshot().movements().len(), 4);

    let deleted = till.purge_month(now).await.unwrap();
    assert_eq!(deleted, 2);

    let state = till.snapshot();
    let left: Vec<&str> = state.movements().iter().map(|m| m.id.as_str()).collect();
    assert_eq!(left.len(), 2);
    assert!(left.contains(&"undated"));
    assert!(state.summary(now).this_month.is_empty());
}

#[tokio::test]
async fn deleting_a_missing_movement_is_an_error() {
    let store = store_on(database().await).await;
    let err = store.delete("nope").await.unwrap_err();
    assert_eq!(err, EngineError::KeyNotFound("nope".to_string()));
}

#[tokio::test]
async fn legacy_documents_count_towards_balances() {
    let db = database().await;
    insert_raw(
        &db,
        "legacy-sale",
        json!({
            "type": "venta",
            "plantId": "p-old",
            "quantity": 1,
            "price": "120,5",
            "total": "120.5",
            "paymentMethod": "mercadoPago",
            "date": Utc::now().to_rfc3339(),
        }),
    )
    .await;
    insert_raw(
        &db,
        "broken",
        json!({"type": "refund", "total": "lots", "paymentMethod": "cheque"}),
    )
    .await;
    let store = store_on(db).await;
    let till = till_on(&store);

    let state = till.snapshot();
    assert_eq!(state.movements().last().map(|m| m.id.as_str()), Some("broken"));
    let summary = state.summary(Utc::now());
    assert_eq!(summary.running.mobile_wallet, Money::new(12050));
    assert_eq!(summary.running.cash, Money::ZERO);
    assert_eq!(summary.today.len(), 1);
}

#[tokio::test]
async fn form_resets_on_success_and_keeps_input_on_failure() {
    let store = store_on(database().await).await;
    let till = till_on(&store);

    let mut form = MovementForm::default();
    form.input = cash_movement(MovementKind::CashIn, "25", PaymentMethod::Cash);
    till.submit_form(&mut form, Viewport::Wide, Utc::now())
        .await
        .unwrap();
    assert_eq!(form.input, MovementInput::default());
    assert_eq!(form.ui.error, None);
    assert_eq!(form.ui.toast.as_ref().map(|t| t.kind), Some(ToastKind::Success));

    let attempt = cash_movement(MovementKind::CashOut, "30", PaymentMethod::Cash);
    form.input = attempt.clone();
    till.submit_form(&mut form, Viewport::Wide, Utc::now())
        .await
        .unwrap_err();
    assert_eq!(form.input, attempt);
    assert_eq!(
        form.ui.error.as_deref(),
        Some("not enough balance in cash for this operation")
    );
    assert_eq!(form.ui.toast.as_ref().map(|t| t.kind), Some(ToastKind::Error));
}

#[tokio::test]
async fn suggested_product_can_be_added_from_the_form() {
    let store = store_on(database().await).await;
    let till = till_on(&store);

    let mut form = MovementForm::default();
    assert!(!form.choose_product(&till.snapshot(), "Begonia"));
    let name = form.ui.suggested_product.clone().unwrap();
    let id = ProductStore::create(store.as_ref(), NewProduct::suggested(&name))
        .await
        .unwrap();

    assert!(form.choose_product(&till.snapshot(), "begonia"));
    assert_eq!(form.input.product_id.as_deref(), Some(id.as_str()));
    let state = till.snapshot();
    let product = state.product(&id).unwrap();
    assert_eq!(product.stock, 0);
    assert_eq!(product.kind, "interior");

    let err = ProductStore::create(store.as_ref(), NewProduct::suggested("  "))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidProduct(_)));
}

#[tokio::test]
async fn feed_follows_store_changes_until_the_store_is_gone() {
    let store = store_on(database().await).await;
    let mut feed = LedgerFeed::subscribe(store.as_ref());
    assert!(feed.latest().movements().is_empty());

    cash_in_at(&store, 500, PaymentMethod::Cash, Utc::now()).await;
    let state = feed.changed().await.unwrap();
    assert_eq!(state.movements().len(), 1);
    assert_eq!(feed.latest(), state);

    add_product(&store, "Aloe", 800, 1).await;
    let state = feed.changed().await.unwrap();
    assert_eq!(state.products().len(), 1);
    assert_eq!(state.movements().len(), 1);

    drop(store);
    assert!(feed.changed().await.is_none());
}

/// Store that parks every write until released.
#[derive(Default)]
struct GatedStore {
    entered: Notify,
    release: Notify,
    channels: Channels,
}

struct Channels {
    movements: watch::Sender<Vec<MovementDoc>>,
    products: watch::Sender<Vec<Product>>,
}

impl Default for Channels {
    fn default() -> Self {
        Self {
            movements: watch::channel(Vec::new()).0,
            products: watch::channel(Vec::new()).0,
        }
    }
}

impl Channels {
    fn feed(&self) -> LedgerFeed {
        LedgerFeed::new(self.movements.subscribe(), self.products.subscribe())
    }
}

#[async_trait]
impl MovementStore for GatedStore {
    async fn create(&self, _movement: NewMovement) -> ResultEngine<String> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok("gated-1".to_string())
    }

    async fn delete(&self, _id: &str) -> ResultEngine<()> {
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Vec<MovementDoc>> {
        self.channels.movements.subscribe()
    }
}

#[async_trait]
impl SaleRegistrar for GatedStore {
    async fn register(&self, _sale: SaleRequest) -> ResultEngine<SaleOutcome> {
        Ok(SaleOutcome::Rejected {
            reason: "sales are closed".to_string(),
        })
    }
}

#[tokio::test]
async fn second_submission_while_one_is_in_flight_is_busy() {
    let store = Arc::new(GatedStore::default());
    let till = Arc::new(Till::new(
        store.clone(),
        store.clone(),
        store.channels.feed(),
    ));
    let input = cash_movement(MovementKind::CashIn, "10", PaymentMethod::Cash);

    let first = tokio::spawn({
        let till = till.clone();
        let input = input.clone();
        async move { till.submit(&input, Viewport::Wide, Utc::now()).await }
    });
    store.entered.notified().await;
    assert_eq!(till.submission_state(), SubmissionState::Submitting);

    let err = till
        .submit(&input, Viewport::Wide, Utc::now())
        .await
        .unwrap_err();
    assert_eq!(err, SubmitError::Busy);
    assert_eq!(till.submission_state(), SubmissionState::Submitting);

    store.release.notify_one();
    let receipt = first.await.unwrap().unwrap();
    assert_eq!(receipt.movement_id, "gated-1");
    assert_eq!(till.submission_state(), SubmissionState::Succeeded);
}

#[tokio::test]
async fn abandoned_submission_returns_the_till_to_idle() {
    let store = Arc::new(GatedStore::default());
    let till = Arc::new(Till::new(
        store.clone(),
        store.clone(),
        store.channels.feed(),
    ));
    let input = cash_movement(MovementKind::CashIn, "10", PaymentMethod::Cash);

    let first = tokio::spawn({
        let till = till.clone();
        async move { till.submit(&input, Viewport::Wide, Utc::now()).await }
    });
    store.entered.notified().await;
    first.abort();
    assert!(first.await.unwrap_err().is_cancelled());
    assert_eq!(till.submission_state(), SubmissionState::Idle);
}

/// Store whose backend is unreachable.
#[derive(Default)]
struct OfflineStore {
    channels: Channels,
}

#[async_trait]
impl MovementStore for OfflineStore {
    async fn create(&self, _movement: NewMovement) -> ResultEngine<String> {
        Err(EngineError::Database(DbErr::Custom("store offline".to_string())))
    }

    async fn delete(&self, _id: &str) -> ResultEngine<()> {
        Err(EngineError::Database(DbErr::Custom("store offline".to_string())))
    }

    fn subscribe(&self) -> watch::Receiver<Vec<MovementDoc>> {
        self.channels.movements.subscribe()
    }
}

#[async_trait]
impl SaleRegistrar for OfflineStore {
    async fn register(&self, _sale: SaleRequest) -> ResultEngine<SaleOutcome> {
        Err(EngineError::Database(DbErr::Custom("store offline".to_string())))
    }
}

#[tokio::test]
async fn store_failures_surface_as_unknown_failure() {
    let store = Arc::new(OfflineStore::default());
    let till = Till::new(store.clone(), store.clone(), store.channels.feed());

    let mut form = MovementForm::default();
    form.input = cash_movement(MovementKind::CashIn, "10", PaymentMethod::Cash);
    let kept = form.input.clone();
    let err = till
        .submit_form(&mut form, Viewport::Wide, Utc::now())
        .await
        .unwrap_err();
    assert_eq!(err, SubmitError::UnknownFailure);
    assert_eq!(form.input, kept);
    assert_eq!(form.ui.error.as_deref(), Some("could not record the movement"));
    assert_eq!(
        till.submission_state(),
        SubmissionState::Failed(SubmitError::UnknownFailure)
    );
}

/// Store that loses its connection after the first deletion.
#[derive(Default)]
struct FlakyStore {
    deletes: AtomicUsize,
    channels: Channels,
}

#[async_trait]
impl MovementStore for FlakyStore {
    async fn create(&self, _movement: NewMovement) -> ResultEngine<String> {
        Ok("flaky-1".to_string())
    }

    async fn delete(&self, _id: &str) -> ResultEngine<()> {
        match self.deletes.fetch_add(1, Ordering::SeqCst) {
            0 => Ok(()),
            _ => Err(EngineError::Database(DbErr::Custom("connection lost".to_string()))),
        }
    }

    fn subscribe(&self) -> watch::Receiver<Vec<MovementDoc>> {
        self.channels.movements.subscribe()
    }
}

#[async_trait]
impl SaleRegistrar for FlakyStore {
    async fn register(&self, _sale: SaleRequest) -> ResultEngine<SaleOutcome> {
        Ok(SaleOutcome::Registered {
            movement_id: "flaky-1".to_string(),
        })
    }
}

#[tokio::test]
async fn purge_month_stops_at_the_first_failed_deletion() {
    let store = Arc::new(FlakyStore::default());
    let now = Utc::now();
    let dated = |id: &str| match json!({
        "type": "cash_in",
        "total": 5,
        "paymentMethod": "cash",
        "date": now.to_rfc3339(),
    }) {
        serde_json::Value::Object(fields) => MovementDoc::new(id, fields),
        _ => unreachable!(),
    };
    store
        .channels
        .movements
        .send_replace(vec![dated("a"), dated("b"), dated("c")]);
    let till = Till::new(store.clone(), store.clone(), store.channels.feed());

    let err = till.purge_month(now).await.unwrap_err();
    assert_eq!(
        err,
        EngineError::Database(DbErr::Custom("connection lost".to_string()))
    );
    assert_eq!(store.deletes.load(Ordering::SeqCst), 2);
}
