//! The module contains the errors the engine can throw.
//!
//! Two families live here:
//!
//! - [`EngineError`] for infrastructure and data failures (database, malformed
//!   documents, missing keys). Callers of the store traits see these.
//! - [`SubmitError`] for the outcome of a movement submission. These are the
//!   only errors the till surfaces to an operator; every variant is
//!   recoverable by fixing the form and submitting again.
use sea_orm::DbErr;
use thiserror::Error;

use crate::PaymentMethod;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("\"{0}\" key not found!")]
    KeyNotFound(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid movement: {0}")]
    InvalidMovement(String),
    #[error("Invalid product: {0}")]
    InvalidProduct(String),
    #[error("Malformed document: {0}")]
    Document(#[from] serde_json::Error),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::KeyNotFound(a), Self::KeyNotFound(b)) => a == b,
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::InvalidMovement(a), Self::InvalidMovement(b)) => a == b,
            (Self::InvalidProduct(a), Self::InvalidProduct(b)) => a == b,
            (Self::Document(a), Self::Document(b)) => a.to_string() == b.to_string(),
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}

/// Why a movement submission was refused.
///
/// The `Display` text is what the operator sees, both inline in the form and
/// in the transient notification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("a valid price is required for a sale")]
    MissingPrice,
    #[error("a product must be selected for a sale")]
    MissingProduct,
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("not enough balance in {method} for this operation")]
    InsufficientFunds { method: PaymentMethod },
    #[error("{reason}")]
    SaleRegistrationFailed { reason: String },
    #[error("another movement is still being submitted")]
    Busy,
    #[error("could not record the movement")]
    UnknownFailure,
}
