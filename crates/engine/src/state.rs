//! Immutable snapshot of what the till knows, rebuilt from store change
//! events.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::{LedgerSummary, MovementDoc, Product, products::find_by_name};

/// A full collection pushed by one of the store subscriptions.
#[derive(Clone, Debug, PartialEq)]
pub enum ChangeEvent {
    Movements(Vec<MovementDoc>),
    Products(Vec<Product>),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LedgerState {
    movements: Vec<MovementDoc>,
    products: Vec<Product>,
}

impl LedgerState {
    /// Applies a change event.
    ///
    /// Collections are replaced wholesale. Movements are kept newest first;
    /// those without a readable timestamp go last in their original order.
    #[must_use]
    pub fn apply(mut self, event: ChangeEvent) -> Self {
        match event {
            ChangeEvent::Movements(mut movements) => {
                movements.sort_by(newest_first);
                self.movements = movements;
            }
            ChangeEvent::Products(products) => {
                self.products = products;
            }
        }
        self
    }

    pub fn movements(&self) -> &[MovementDoc] {
        &self.movements
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn product(&self, id: &str) -> Option<&Product> {
        self.products.iter().find(|product| product.id == id)
    }

    pub fn product_by_name(&self, name: &str) -> Option<&Product> {
        find_by_name(&self.products, name)
    }

    pub fn summary(&self, now: DateTime<Utc>) -> LedgerSummary {
        LedgerSummary::compute(&self.movements, now)
    }
}

fn newest_first(a: &MovementDoc, b: &MovementDoc) -> Ordering {
    match (a.occurred_at(), b.occurred_at()) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
