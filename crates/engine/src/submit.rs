//! Validation of a movement form against the current ledger.
//!
//! [`prepare`] is pure: it turns the operator's input and the latest ledger
//! snapshot into the write that should happen, or the reason it must not.
//! The [`crate::Till`] runs it and performs the write.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::{
    Balances, LedgerState, Money, MovementInput, MovementKind, NewMovement, SubmitError, Viewport,
    clock::resolve_timestamp,
    ledger::balances,
    money::{parse_amount, round2},
    store::SaleRequest,
};

/// Monetary fields after rounding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Amounts {
    /// Unit price; absent on cash movements typed without one.
    pub price: Option<Money>,
    pub total: Money,
}

/// The write a valid form turns into.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dispatch {
    Sale(SaleRequest),
    Create(NewMovement),
}

/// Parses and rounds price and total.
///
/// Sales and purchases default their total to `round2(price × quantity)`,
/// cash movements to `round2(price)`. An explicit total always wins.
pub fn normalize(input: &MovementInput) -> Result<Amounts, SubmitError> {
    let price = parse_field(&input.price, "price")?;
    let explicit_total = parse_field(&input.total, "total")?;

    let total = match (explicit_total, input.kind.is_trade()) {
        (Some(total), _) => total,
        (None, true) => price
            .unwrap_or_default()
            .checked_mul(Decimal::from(input.quantity))
            .ok_or_else(too_large)?,
        (None, false) => price.unwrap_or_default(),
    };
    let price = if input.kind.is_trade() {
        Some(price.unwrap_or_default())
    } else {
        price
    };

    Ok(Amounts {
        price: price.map(to_money).transpose()?,
        total: to_money(total)?,
    })
}

fn parse_field(raw: &str, label: &str) -> Result<Option<Decimal>, SubmitError> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    let value = parse_amount(raw)
        .ok_or_else(|| SubmitError::InvalidAmount(format!("{label} is not a number")))?;
    if value.is_sign_negative() && !value.is_zero() {
        return Err(SubmitError::InvalidAmount(format!("{label} must not be negative")));
    }
    Ok(Some(value))
}

fn too_large() -> SubmitError {
    SubmitError::InvalidAmount("amount too large".to_string())
}

fn to_money(value: Decimal) -> Result<Money, SubmitError> {
    Money::from_decimal(round2(value)).ok_or_else(too_large)
}

/// Amount a movement takes out of its payment method, if any.
///
/// This is the total the ledger will subtract, for cash-outs too: checking
/// the price instead would let a cash-out with a larger explicit total drive
/// the balance negative. Typed without a total, a cash-out's total is its
/// price.
pub fn debit_amount(kind: MovementKind, amounts: &Amounts) -> Option<Money> {
    match kind {
        MovementKind::Purchase | MovementKind::CashOut => Some(amounts.total),
        MovementKind::Sale | MovementKind::CashIn => None,
    }
}

/// Refuses a debit larger than what its payment method holds. Spending the
/// whole balance is allowed.
pub fn check_funds(
    input: &MovementInput,
    amounts: &Amounts,
    running: &Balances,
) -> Result<(), SubmitError> {
    let Some(debit) = debit_amount(input.kind, amounts) else {
        return Ok(());
    };
    if debit > running.of(input.payment_method) {
        return Err(SubmitError::InsufficientFunds {
            method: input.payment_method,
        });
    }
    Ok(())
}

fn validate_sale(input: &MovementInput, state: &LedgerState) -> Result<String, SubmitError> {
    let price_ok = parse_amount(&input.price).is_some_and(|price| price > Decimal::ZERO);
    if !price_ok {
        return Err(SubmitError::MissingPrice);
    }
    let product_id = input
        .product_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(SubmitError::MissingProduct)?;
    if state.product(product_id).is_none() {
        return Err(SubmitError::MissingProduct);
    }
    Ok(product_id.to_string())
}

/// Runs every check of a submission and builds the resulting write.
///
/// Balances are computed over the whole movement history of `state`.
pub fn prepare(
    input: &MovementInput,
    viewport: Viewport,
    state: &LedgerState,
    now: DateTime<Utc>,
) -> Result<Dispatch, SubmitError> {
    let sale_product = match input.kind {
        MovementKind::Sale => Some(validate_sale(input, state)?),
        MovementKind::Purchase | MovementKind::CashIn | MovementKind::CashOut => None,
    };
    if input.kind.is_trade() && input.quantity == 0 {
        return Err(SubmitError::InvalidAmount(
            "quantity must be at least 1".to_string(),
        ));
    }

    let amounts = normalize(input)?;
    // A price that rounds to zero cents is no price at all.
    if input.kind == MovementKind::Sale
        && !amounts.price.is_some_and(|price| price > Money::ZERO)
    {
        return Err(SubmitError::MissingPrice);
    }
    check_funds(input, &amounts, &balances(state.movements()))?;

    let occurred_at = match (input.kind, viewport) {
        (MovementKind::Sale, Viewport::Narrow) => now,
        _ => resolve_timestamp(input.date.as_deref(), now),
    };

    let invalid = |err: crate::EngineError| SubmitError::InvalidAmount(err.to_string());
    let dispatch = match input.kind {
        MovementKind::Sale => Dispatch::Sale(SaleRequest {
            product_id: sale_product.unwrap_or_default(),
            quantity: input.quantity,
            unit_price: amounts.price.unwrap_or_default(),
            payment_method: input.payment_method,
            occurred_at,
            location: input.location.clone(),
            notes: input.notes.clone(),
        }),
        MovementKind::Purchase => Dispatch::Create(
            NewMovement::purchase(
                input
                    .product_id
                    .clone()
                    .filter(|id| !id.trim().is_empty()),
                input.quantity,
                amounts.price.unwrap_or_default(),
                amounts.total,
                input.payment_method,
                occurred_at,
                input.location.clone(),
                input.notes.clone(),
            )
            .map_err(invalid)?,
        ),
        MovementKind::CashIn | MovementKind::CashOut => Dispatch::Create(
            NewMovement::cash(
                input.kind,
                input.detail.clone(),
                amounts.price,
                amounts.total,
                input.payment_method,
                occurred_at,
                input.location.clone(),
                input.notes.clone(),
            )
            .map_err(invalid)?,
        ),
    };
    Ok(dispatch)
}
