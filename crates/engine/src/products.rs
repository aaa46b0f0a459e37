//! The module contains `Product`, an entry of the nursery catalogue.

use sea_orm::entity::{ActiveValue, prelude::*};
use serde::{Deserialize, Serialize};

use crate::{EngineError, Money, ResultEngine};

/// Category given to products created on the fly from the movement form.
pub const DEFAULT_PRODUCT_KIND: &str = "interior";

/// A sellable item: a plant, a pot or anything else on the shelves.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    /// Sale price.
    pub base_price: Money,
    pub purchase_price: Money,
    pub stock: u32,
    /// Free category tag (`interior`, `exterior`, `maceta`, ...).
    pub kind: String,
}

/// Data needed to add a product to the catalogue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewProduct {
    pub name: String,
    pub base_price: Money,
    pub purchase_price: Money,
    pub stock: u32,
    pub kind: String,
}

impl NewProduct {
    /// Prefills a product from a name the operator typed in the movement form
    /// that did not match the catalogue.
    pub fn suggested(name: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            base_price: Money::ZERO,
            purchase_price: Money::ZERO,
            stock: 0,
            kind: DEFAULT_PRODUCT_KIND.to_string(),
        }
    }

    pub(crate) fn validate(&self) -> ResultEngine<()> {
        if self.name.trim().is_empty() {
            return Err(EngineError::InvalidProduct(
                "product name must not be empty".to_string(),
            ));
        }
        if self.base_price.is_negative() || self.purchase_price.is_negative() {
            return Err(EngineError::InvalidProduct(
                "product prices must be >= 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Finds a product by name, ignoring case and surrounding whitespace.
pub fn find_by_name<'a>(products: &'a [Product], name: &str) -> Option<&'a Product> {
    let wanted = name.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }
    products
        .iter()
        .find(|product| product.name.trim().to_lowercase() == wanted)
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    pub base_price: i64,
    pub purchase_price: i64,
    pub stock: i64,
    pub kind: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    pub(crate) fn from_new(id: String, product: &NewProduct) -> Self {
        Self {
            id: ActiveValue::Set(id),
            name: ActiveValue::Set(product.name.trim().to_string()),
            base_price: ActiveValue::Set(product.base_price.cents()),
            purchase_price: ActiveValue::Set(product.purchase_price.cents()),
            stock: ActiveValue::Set(i64::from(product.stock)),
            kind: ActiveValue::Set(product.kind.clone()),
        }
    }
}

impl From<Model> for Product {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            base_price: Money::new(model.base_price),
            purchase_price: Money::new(model.purchase_price),
            stock: u32::try_from(model.stock.max(0)).unwrap_or(u32::MAX),
            kind: model.kind,
        }
    }
}
