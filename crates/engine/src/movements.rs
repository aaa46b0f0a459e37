//! Movement primitives.
//!
//! A movement is a single cash event of the till: a sale, a purchase, money
//! put into the till (cash-in) or taken out of it (cash-out).
//!
//! Stored movements are flat JSON documents ([`MovementDoc`]). The store does
//! not enforce a schema, and documents written by older front ends use other
//! spellings and numeric strings, so every accessor is lenient and total.
//! New movements are built as a typed [`NewMovement`] and serialized into the
//! same flat shape.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{EngineError, Money, ResultEngine, money::parse_amount};

pub(crate) const FIELD_KIND: &str = "type";
pub(crate) const FIELD_DETAIL: &str = "detail";
pub(crate) const FIELD_PRODUCT: &str = "productId";
const FIELD_PRODUCT_LEGACY: &str = "plantId";
pub(crate) const FIELD_QUANTITY: &str = "quantity";
pub(crate) const FIELD_PRICE: &str = "price";
pub(crate) const FIELD_TOTAL: &str = "total";
pub(crate) const FIELD_METHOD: &str = "paymentMethod";
pub(crate) const FIELD_DATE: &str = "date";
pub(crate) const FIELD_LOCATION: &str = "location";
pub(crate) const FIELD_NOTES: &str = "notes";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Sale,
    Purchase,
    CashIn,
    CashOut,
}

impl MovementKind {
    pub const ALL: [MovementKind; 4] = [Self::Sale, Self::Purchase, Self::CashIn, Self::CashOut];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sale => "sale",
            Self::Purchase => "purchase",
            Self::CashIn => "cash_in",
            Self::CashOut => "cash_out",
        }
    }

    /// Sales and cash-ins add to the balance of their payment method.
    pub fn is_inflow(self) -> bool {
        match self {
            Self::Sale | Self::CashIn => true,
            Self::Purchase | Self::CashOut => false,
        }
    }

    /// Sales and purchases are tied to products and carry a quantity.
    pub fn is_trade(self) -> bool {
        match self {
            Self::Sale | Self::Purchase => true,
            Self::CashIn | Self::CashOut => false,
        }
    }
}

impl std::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for MovementKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "sale" | "venta" => Ok(Self::Sale),
            "purchase" | "compra" => Ok(Self::Purchase),
            "cash_in" | "ingreso" => Ok(Self::CashIn),
            "cash_out" | "egreso" => Ok(Self::CashOut),
            other => Err(EngineError::InvalidMovement(format!(
                "invalid movement type: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    MobileWallet,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 2] = [Self::Cash, Self::MobileWallet];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::MobileWallet => "mobile_wallet",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cash => f.write_str("cash"),
            Self::MobileWallet => f.write_str("mobile wallet"),
        }
    }
}

impl TryFrom<&str> for PaymentMethod {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "cash" | "efectivo" => Ok(Self::Cash),
            "mobile_wallet" | "mercadoPago" => Ok(Self::MobileWallet),
            other => Err(EngineError::InvalidMovement(format!(
                "invalid payment method: {other}"
            ))),
        }
    }
}

/// A movement as stored: an id plus a flat, untyped JSON object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MovementDoc {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl MovementDoc {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn kind(&self) -> Option<MovementKind> {
        self.str_field(FIELD_KIND)
            .and_then(|raw| MovementKind::try_from(raw).ok())
    }

    pub fn payment_method(&self) -> Option<PaymentMethod> {
        self.str_field(FIELD_METHOD)
            .and_then(|raw| PaymentMethod::try_from(raw).ok())
    }

    /// Total of the movement; `0` when absent or not a number.
    pub fn total(&self) -> Money {
        lenient_money(self.fields.get(FIELD_TOTAL))
    }

    /// Unit price; `0` when absent or not a number.
    pub fn price(&self) -> Money {
        lenient_money(self.fields.get(FIELD_PRICE))
    }

    /// Units moved; `0` when absent, negative or not a number.
    pub fn quantity(&self) -> u64 {
        lenient_decimal(self.fields.get(FIELD_QUANTITY))
            .filter(|d| d.is_sign_positive())
            .and_then(|d| d.trunc().to_u64())
            .unwrap_or(0)
    }

    pub fn occurred_at(&self) -> Option<DateTime<Utc>> {
        self.str_field(FIELD_DATE)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw.trim()).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn product_id(&self) -> Option<&str> {
        self.str_field(FIELD_PRODUCT)
            .or_else(|| self.str_field(FIELD_PRODUCT_LEGACY))
            .filter(|s| !s.is_empty())
    }

    pub fn detail(&self) -> &str {
        self.str_field(FIELD_DETAIL).unwrap_or_default()
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

fn lenient_decimal(value: Option<&Value>) -> Option<Decimal> {
    match value? {
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                Some(Decimal::from(int))
            } else {
                number.as_f64().and_then(|f| Decimal::try_from(f).ok())
            }
        }
        Value::String(raw) => parse_amount(raw),
        _ => None,
    }
}

fn lenient_money(value: Option<&Value>) -> Money {
    lenient_decimal(value)
        .and_then(Money::from_decimal)
        .unwrap_or(Money::ZERO)
}

fn money_value(amount: Money) -> Value {
    serde_json::Number::from_f64(amount.cents() as f64 / 100.0)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// A movement about to be written by the submitter.
///
/// Build it with [`NewMovement::purchase`] or [`NewMovement::cash`]; sales go
/// through the sale registrar instead, see [`crate::SaleRequest`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewMovement {
    pub kind: MovementKind,
    pub detail: String,
    pub product_id: Option<String>,
    pub quantity: Option<u32>,
    pub price: Option<Money>,
    pub total: Money,
    pub payment_method: PaymentMethod,
    pub occurred_at: DateTime<Utc>,
    pub location: String,
    pub notes: String,
}

impl NewMovement {
    /// A purchase. The detail is always empty; the quantity is only kept when
    /// a product is attached.
    #[allow(clippy::too_many_arguments)]
    pub fn purchase(
        product_id: Option<String>,
        quantity: u32,
        price: Money,
        total: Money,
        payment_method: PaymentMethod,
        occurred_at: DateTime<Utc>,
        location: String,
        notes: String,
    ) -> ResultEngine<Self> {
        let movement = Self {
            kind: MovementKind::Purchase,
            detail: String::new(),
            quantity: product_id.as_ref().map(|_| quantity),
            product_id,
            price: Some(price),
            total,
            payment_method,
            occurred_at,
            location,
            notes,
        };
        movement.validate()?;
        Ok(movement)
    }

    /// A cash-in or cash-out: no product, no quantity.
    #[allow(clippy::too_many_arguments)]
    pub fn cash(
        kind: MovementKind,
        detail: String,
        price: Option<Money>,
        total: Money,
        payment_method: PaymentMethod,
        occurred_at: DateTime<Utc>,
        location: String,
        notes: String,
    ) -> ResultEngine<Self> {
        if kind.is_trade() {
            return Err(EngineError::InvalidMovement(format!(
                "{kind} is not a cash movement"
            )));
        }
        let movement = Self {
            kind,
            detail,
            product_id: None,
            quantity: None,
            price,
            total,
            payment_method,
            occurred_at,
            location,
            notes,
        };
        movement.validate()?;
        Ok(movement)
    }

    fn validate(&self) -> ResultEngine<()> {
        if self.total.is_negative() {
            return Err(EngineError::InvalidAmount("total must be >= 0".to_string()));
        }
        if self.price.is_some_and(Money::is_negative) {
            return Err(EngineError::InvalidAmount("price must be >= 0".to_string()));
        }
        if self.quantity == Some(0) {
            return Err(EngineError::InvalidAmount("quantity must be >= 1".to_string()));
        }
        Ok(())
    }

    /// Flat document written to the store.
    pub fn to_document(&self) -> Map<String, Value> {
        let mut doc = Map::new();
        doc.insert(FIELD_KIND.into(), self.kind.as_str().into());
        doc.insert(FIELD_DETAIL.into(), self.detail.clone().into());
        if let Some(product_id) = &self.product_id {
            doc.insert(FIELD_PRODUCT.into(), product_id.clone().into());
        }
        if let Some(quantity) = self.quantity {
            doc.insert(FIELD_QUANTITY.into(), quantity.into());
        }
        if let Some(price) = self.price {
            doc.insert(FIELD_PRICE.into(), money_value(price));
        }
        doc.insert(FIELD_TOTAL.into(), money_value(self.total));
        doc.insert(FIELD_METHOD.into(), self.payment_method.as_str().into());
        doc.insert(
            FIELD_DATE.into(),
            self.occurred_at
                .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
                .into(),
        );
        doc.insert(FIELD_LOCATION.into(), self.location.clone().into());
        doc.insert(FIELD_NOTES.into(), self.notes.clone().into());
        doc
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "movements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(column_type = "Text")]
    pub document: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    pub(crate) fn from_document(id: String, document: &Map<String, Value>) -> ResultEngine<Self> {
        Ok(Self {
            id: ActiveValue::Set(id),
            document: ActiveValue::Set(serde_json::to_string(document)?),
        })
    }
}

impl From<Model> for MovementDoc {
    /// A row whose document is not a JSON object becomes an empty movement,
    /// which the ledger ignores.
    fn from(model: Model) -> Self {
        let fields = match serde_json::from_str::<Value>(&model.document) {
            Ok(Value::Object(fields)) => fields,
            _ => Map::new(),
        };
        Self {
            id: model.id,
            fields,
        }
    }
}
