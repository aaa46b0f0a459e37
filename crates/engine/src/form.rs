//! Movement form: the operator's typed input, kept apart from the UI state
//! derived from submitting it.

use serde::Deserialize;

use crate::{LedgerState, MovementKind, PaymentMethod, SubmitError};

/// What the operator typed.
///
/// `price` and `total` are kept as raw text; they are parsed and rounded
/// when the form is submitted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MovementInput {
    pub kind: MovementKind,
    /// Free-text label, ignored for sales and purchases.
    pub detail: String,
    pub product_id: Option<String>,
    pub quantity: u32,
    pub price: String,
    /// Explicit total; empty means "compute it".
    pub total: String,
    pub payment_method: PaymentMethod,
    /// `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM` or empty for "now".
    pub date: Option<String>,
    pub location: String,
    pub notes: String,
}

impl Default for MovementInput {
    fn default() -> Self {
        Self {
            kind: MovementKind::Sale,
            detail: String::new(),
            product_id: None,
            quantity: 1,
            price: String::new(),
            total: String::new(),
            payment_method: PaymentMethod::Cash,
            date: None,
            location: String::new(),
            notes: String::new(),
        }
    }
}

impl MovementInput {
    /// Switches the movement type; the product reference only survives on
    /// sales and purchases.
    pub fn set_kind(&mut self, kind: MovementKind) {
        self.kind = kind;
        if !kind.is_trade() {
            self.product_id = None;
        }
    }
}

/// Width class of the client; sales on narrow (mobile) screens are always
/// stamped with the current time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Viewport {
    Narrow,
    #[default]
    Wide,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToastKind {
    Success,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Toast {
    pub kind: ToastKind,
    pub text: String,
}

pub const SUCCESS_MESSAGE: &str = "movement recorded";

/// Presentation state of the form.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormUi {
    /// Inline error under the form.
    pub error: Option<String>,
    pub toast: Option<Toast>,
    /// Product name typed by the operator that is not in the catalogue yet.
    pub suggested_product: Option<String>,
}

impl FormUi {
    pub(crate) fn succeeded(&mut self) {
        self.error = None;
        self.suggested_product = None;
        self.toast = Some(Toast {
            kind: ToastKind::Success,
            text: SUCCESS_MESSAGE.to_string(),
        });
    }

    pub(crate) fn failed(&mut self, err: &SubmitError) {
        let text = err.to_string();
        self.error = Some(text.clone());
        self.toast = Some(Toast {
            kind: ToastKind::Error,
            text,
        });
    }
}

/// The form as a whole: input plus UI state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MovementForm {
    pub input: MovementInput,
    pub ui: FormUi,
}

impl MovementForm {
    /// Resolves what the operator typed in the product field, by id or by
    /// name. An unknown name is kept as a suggestion to add it to the
    /// catalogue. Returns whether a product was selected.
    pub fn choose_product(&mut self, state: &LedgerState, typed: &str) -> bool {
        let typed = typed.trim();
        let found = state
            .product(typed)
            .or_else(|| state.product_by_name(typed))
            .map(|product| product.id.clone());
        self.ui.suggested_product = match &found {
            Some(_) => None,
            None => Some(typed.to_string()).filter(|name| !name.is_empty()),
        };
        let selected = found.is_some();
        self.input.product_id = found;
        selected
    }
}
